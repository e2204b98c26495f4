use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use zmk_heatmap_core::{ActionKind, EventParser, Heatmap, Keymap, ParserConfig, PressSink};

const KEYMAP: &str = r#"
layers:
  Base: [Q, W, E, R, T, Y, U, I, O, P, A, S, D, F, G, H, J, K, L, ";"]
  Num: ["1", "2", "3", "4", "5", "6", "7", "8", "9", "0", a, b, c, d, e, f, g, h, i, j]
combos:
  - p: [1, 2]
  - p: [11, 12]
"#;

fn session_lines() -> Vec<String> {
    let mut lines = Vec::new();
    for i in 0..1000u64 {
        let pos = (i * 7 % 20) as u16;
        let t = i * 120;
        let stamp = |ms: u64| format!("[00:{:02}:{:02}.{:03},000]", ms / 60_000 % 60, ms / 1000 % 60, ms % 1000);
        lines.push(format!(
            "{} <dbg> zmk: position_state_changed: position: {}, pressed, layer: {}, mods: 0x00",
            stamp(t),
            pos,
            i % 2
        ));
        lines.push(format!("{} <dbg> zmk: kscan_matrix_read: Sending event", stamp(t + 1)));
        lines.push(format!(
            "{} <dbg> zmk: position_state_changed: position: {}, released, layer: {}, mods: 0x00",
            stamp(t + 60),
            pos,
            i % 2
        ));
    }
    lines
}

fn bench_parser(c: &mut Criterion) {
    let keymap = Keymap::from_yaml_str(KEYMAP, 0).unwrap();
    let lines = session_lines();

    c.bench_function("parse_3000_lines", |b| {
        b.iter(|| {
            let mut parser = EventParser::new(keymap.clone(), ParserConfig::default());
            let mut heatmap = Heatmap::new();
            for line in &lines {
                let _ = parser.parse(black_box(line), &mut heatmap);
            }
            black_box(heatmap.press_count())
        })
    });
}

fn bench_merge(c: &mut Criterion) {
    let mut source = Heatmap::new();
    for layer in 0..4u8 {
        for pos in 0..42u16 {
            for _ in 0..25 {
                source.register_key_press(layer, pos, ActionKind::Tap);
            }
        }
    }

    c.bench_function("merge_4200_presses", |b| {
        b.iter(|| {
            let mut target = Heatmap::new();
            target.merge(black_box(&source));
            black_box(target.press_count())
        })
    });
}

criterion_group!(benches, bench_parser, bench_merge);
criterion_main!(benches);
