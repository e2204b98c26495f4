use std::fs;
use tempfile::tempdir;
use zmk_heatmap_core::error::HeatmapError;
use zmk_heatmap_core::{ActionKind, Heatmap, PressCounts, PressSink};

fn sample_a() -> Heatmap {
    let mut h = Heatmap::new();
    for _ in 0..3 {
        h.register_key_press(0, 5, ActionKind::Tap);
    }
    h.register_key_press(1, 5, ActionKind::Hold);
    h.register_combo_press(0, &[2, 1], ActionKind::Shifted);
    h
}

fn sample_b() -> Heatmap {
    let mut h = Heatmap::new();
    h.register_key_press(0, 5, ActionKind::Tap);
    h.register_key_press(0, 5, ActionKind::Shifted);
    h.register_key_press(2, 30, ActionKind::Hold);
    h.register_combo_press(0, &[1, 2], ActionKind::Tap);
    h.register_combo_press(3, &[7, 8, 9], ActionKind::Hold);
    h
}

// --- COUNTERS ---

#[test]
fn test_new_heatmap_is_empty() {
    let h = Heatmap::new();
    assert!(h.is_empty());
    assert_eq!(h.press_count(), 0);
    assert_eq!(h.key_count(0, 0), PressCounts::default());
}

#[test]
fn test_register_key_press_counts_by_kind() {
    let h = sample_a();

    assert_eq!(
        h.key_count(0, 5),
        PressCounts {
            taps: 3,
            holds: 0,
            shifts: 0
        }
    );
    assert_eq!(h.key_count(1, 5).holds, 1);
    assert_eq!(h.press_count(), 5);
}

#[test]
fn test_combo_keys_are_normalized() {
    let mut h = Heatmap::new();
    h.register_combo_press(0, &[3, 1, 2], ActionKind::Tap);
    h.register_combo_press(0, &[1, 2, 3], ActionKind::Tap);
    h.register_combo_press(0, &[2, 3, 1, 1], ActionKind::Hold);

    assert_eq!(h.combo_presses().count(), 1);
    let (layer, keys, counts) = h.combo_presses().next().unwrap();
    assert_eq!(layer, 0);
    assert_eq!(keys, &[1, 2, 3]);
    assert_eq!(counts.taps, 2);
    assert_eq!(counts.holds, 1);
    assert_eq!(h.combo_count(0, &[3, 2, 1]).total(), 3);
}

#[test]
fn test_same_combo_on_other_layer_is_separate() {
    let mut h = Heatmap::new();
    h.register_combo_press(0, &[1, 2], ActionKind::Tap);
    h.register_combo_press(1, &[1, 2], ActionKind::Tap);

    assert_eq!(h.combo_presses().count(), 2);
}

// --- MERGE ---

#[test]
fn test_merge_sums_counters() {
    let mut merged = sample_a();
    merged.merge(&sample_b());

    assert_eq!(merged.key_count(0, 5).taps, 4);
    assert_eq!(merged.key_count(0, 5).shifts, 1);
    assert_eq!(merged.key_count(2, 30).holds, 1);
    assert_eq!(merged.combo_count(0, &[1, 2]).taps, 1);
    assert_eq!(merged.combo_count(0, &[1, 2]).shifts, 1);
    assert_eq!(
        merged.press_count(),
        sample_a().press_count() + sample_b().press_count()
    );
}

#[test]
fn test_merge_with_empty_is_identity() {
    let mut left = sample_a();
    left.merge(&Heatmap::new());
    assert_eq!(left, sample_a());

    let mut right = Heatmap::new();
    right.merge(&sample_a());
    assert_eq!(right, sample_a());
}

#[test]
fn test_merge_is_commutative() {
    let mut ab = sample_a();
    ab.merge(&sample_b());
    let mut ba = sample_b();
    ba.merge(&sample_a());

    assert_eq!(ab, ba);
}

#[test]
fn test_merge_all_folds_in_order() {
    let all = Heatmap::merge_all([&sample_a(), &sample_b(), &sample_a()]);

    assert_eq!(all.key_count(0, 5).taps, 7);
    assert_eq!(all.press_count(), 2 * sample_a().press_count() + sample_b().press_count());
}

// --- PERSISTENCE ---

#[test]
fn test_save_then_load_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("heatmap.json");

    let mut original = sample_a();
    original.merge(&sample_b());
    original.save(&path).unwrap();

    let loaded = Heatmap::load(&path).unwrap();
    assert_eq!(loaded, original);
}

#[test]
fn test_save_overwrites_existing_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("heatmap.json");

    sample_b().save(&path).unwrap();
    sample_a().save(&path).unwrap();

    assert_eq!(Heatmap::load(&path).unwrap(), sample_a());
    // Only the target remains, no temp files
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_saved_document_shape() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("heatmap.json");
    sample_a().save(&path).unwrap();

    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let keys = doc["key_presses"].as_array().unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0]["layer"], 0);
    assert_eq!(keys[0]["position"], 5);
    assert_eq!(keys[0]["taps"], 3);
    assert_eq!(doc["combo_presses"][0]["keys"], serde_json::json!([1, 2]));
    assert_eq!(doc["combo_presses"][0]["shifts"], 1);
}

#[test]
fn test_load_missing_file_is_not_found() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.json");

    assert!(matches!(Heatmap::load(&path), Err(HeatmapError::NotFound(_))));
    assert!(Heatmap::load_or_new(&path).unwrap().is_empty());
}

#[test]
fn test_load_corrupt_file_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("heatmap.json");
    fs::write(&path, "{ \"key_presses\": [ {\"layer\": 0, ").unwrap();

    assert!(matches!(
        Heatmap::load(&path),
        Err(HeatmapError::Corrupt { .. })
    ));
    assert!(matches!(
        Heatmap::load_or_new(&path),
        Err(HeatmapError::Corrupt { .. })
    ));
}

#[test]
fn test_load_tolerates_unknown_fields() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("heatmap.json");
    fs::write(
        &path,
        r#"{
            "version": 2,
            "key_presses": [
                {"layer": 0, "position": 5, "taps": 2, "holds": 1, "shifts": 0, "label": "A"}
            ],
            "combo_presses": [],
            "rendered_at": "2024-01-01"
        }"#,
    )
    .unwrap();

    let h = Heatmap::load(&path).unwrap();
    assert_eq!(h.key_count(0, 5).taps, 2);
    assert_eq!(h.press_count(), 3);
}

#[test]
fn test_load_rejects_negative_counters() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("heatmap.json");
    fs::write(
        &path,
        r#"{"key_presses": [{"layer": 0, "position": 5, "taps": -1}], "combo_presses": []}"#,
    )
    .unwrap();

    assert!(matches!(
        Heatmap::load(&path),
        Err(HeatmapError::Corrupt { .. })
    ));
}

#[test]
fn test_ensure_writable() {
    let dir = tempdir().unwrap();

    assert!(Heatmap::ensure_writable(dir.path().join("heatmap.json")).is_ok());
    assert!(Heatmap::ensure_writable(dir.path()).is_err());
    assert!(Heatmap::ensure_writable(dir.path().join("missing/heatmap.json")).is_err());
    // Nothing is left behind by the check
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}
