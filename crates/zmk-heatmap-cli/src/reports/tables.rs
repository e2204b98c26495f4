use super::layer_label;
use comfy_table::presets::ASCII_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use std::cmp::Reverse;
use zmk_heatmap_core::keymap::KeymapIndex;
use zmk_heatmap_core::{ActionKind, Heatmap, Keymap, PressCounts};

fn new_table(header: Vec<Cell>, numeric_from: usize) -> Table {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let width = header.len();
    table.set_header(header);
    for i in numeric_from..width {
        if let Some(col) = table.column_mut(i) {
            col.set_cell_alignment(CellAlignment::Right);
        }
    }
    table
}

fn count_cells(c: &PressCounts) -> Vec<Cell> {
    vec![
        Cell::new(c.taps),
        Cell::new(c.holds),
        Cell::new(c.shifts).fg(Color::Yellow),
        Cell::new(c.total()).add_attribute(Attribute::Bold),
    ]
}

fn count_header() -> Vec<Cell> {
    vec![
        Cell::new("Taps"),
        Cell::new("Holds"),
        Cell::new("Shifts").fg(Color::Yellow),
        Cell::new("Total").add_attribute(Attribute::Bold),
    ]
}

pub fn summary(heatmap: &Heatmap) {
    let mut table = new_table(
        vec![
            Cell::new("Kind").add_attribute(Attribute::Bold),
            Cell::new("Keys"),
            Cell::new("Combos"),
            Cell::new("Total").add_attribute(Attribute::Bold),
        ],
        1,
    );

    for kind in [ActionKind::Tap, ActionKind::Hold, ActionKind::Shifted] {
        let keys: u64 = heatmap.key_presses().map(|(_, _, c)| c.get(kind)).sum();
        let combos: u64 = heatmap.combo_presses().map(|(_, _, c)| c.get(kind)).sum();
        table.add_row(vec![
            Cell::new(kind),
            Cell::new(keys),
            Cell::new(combos),
            Cell::new(keys + combos).add_attribute(Attribute::Bold),
        ]);
    }

    table.add_row(vec![
        Cell::new("all").add_attribute(Attribute::Bold),
        Cell::new(heatmap.key_presses().count()).fg(Color::DarkGrey),
        Cell::new(heatmap.combo_presses().count()).fg(Color::DarkGrey),
        Cell::new(heatmap.press_count())
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
    ]);
    println!("\n{}", table);
}

pub fn top_keys(heatmap: &Heatmap, limit: usize, keymap: Option<&Keymap>) {
    let mut rows: Vec<_> = heatmap.key_presses().collect();
    rows.sort_by_key(|(l, p, c)| (Reverse(c.total()), *l, *p));

    let mut header = vec![
        Cell::new("Layer").add_attribute(Attribute::Bold),
        Cell::new("Position"),
    ];
    header.extend(count_header());
    let mut table = new_table(header, 1);

    for (layer, position, counts) in rows.into_iter().take(limit) {
        let mut pos_cell = Cell::new(position);
        if keymap.is_some_and(|k| k.is_layer_key(layer, position)) {
            pos_cell = Cell::new(format!("{} (layer)", position)).fg(Color::Magenta);
        }

        let mut row = vec![Cell::new(layer_label(layer, keymap)), pos_cell];
        row.extend(count_cells(&counts));
        table.add_row(row);
    }

    println!("\n⌨️  Top {} keys", limit);
    println!("{}", table);
}

pub fn top_combos(heatmap: &Heatmap, limit: usize, keymap: Option<&Keymap>) {
    if heatmap.combo_presses().next().is_none() {
        return;
    }

    let mut rows: Vec<_> = heatmap.combo_presses().collect();
    rows.sort_by(|a, b| {
        b.2.total()
            .cmp(&a.2.total())
            .then(a.0.cmp(&b.0))
            .then(a.1.cmp(b.1))
    });

    let mut header = vec![
        Cell::new("Layer").add_attribute(Attribute::Bold),
        Cell::new("Keys"),
        Cell::new("Combo"),
    ];
    header.extend(count_header());
    let mut table = new_table(header, 3);

    for (layer, keys, counts) in rows.into_iter().take(limit) {
        let name = keymap
            .and_then(|k| k.resolve_combo(layer, keys).and_then(|id| k.combo(id)))
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "?".to_string());

        let keys = keys
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join("+");

        let mut row = vec![
            Cell::new(layer_label(layer, keymap)),
            Cell::new(keys),
            Cell::new(name).fg(Color::Green),
        ];
        row.extend(count_cells(&counts));
        table.add_row(row);
    }

    println!("\n🎹 Top {} combos", limit);
    println!("{}", table);
}
