use orbit_model::format::{self, clipboard};
use orbit_model::{BeatData, Chart, ChartError, ChartFormat, Note, NoteType};
use tempfile::TempDir;

const CHART: &str = "\
@SAT_VERSION 3

@TITLE Round Trip
@ARTIST tester
@BGM audio.ogg
@BGM_OFFSET -0.05

@GIMMICKS
   0    0    0 BPM 172
   0    0    1 TIMESIG 4 4
   8    0    2 REV_START
   9    0    3 REV_END
  10    0    4 REV_ZONE_END
  16    0    5 CHART_END

@OBJECTS
   0    0    0   15    6 TOUCH
   1    0    1   30   10 HOLD_START
   1  960    2   35   10 HOLD_POINT
   2    0    3   40   10 HOLD_END
   3    0    4    0   60 MASK_ADD.CENTER
   4    0    5   12    4 SNFW.RNOTE
";

#[test]
fn test_sat_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source.sat");
    std::fs::write(&source, CHART).unwrap();

    let mut chart = Chart::new();
    let report = format::load_file(&mut chart, &source).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.format, Some(ChartFormat::Sat));
    assert_eq!(chart.note_count(), 6);
    assert_eq!(chart.metadata.bgm_offset, -0.05);

    let saved = dir.path().join("saved.sat");
    format::write_file(&chart, &saved, ChartFormat::Sat).unwrap();

    let mut reloaded = Chart::new();
    format::load_file(&mut reloaded, &saved).unwrap();
    assert_eq!(reloaded.metadata, chart.metadata);
    let notes = |c: &Chart| c.notes().map(|n| (n.full_tick(), n.note_type, n.position, n.size)).collect::<Vec<_>>();
    assert_eq!(notes(&reloaded), notes(&chart));
    assert!(reloaded.verify_chains().is_ok());
}

#[test]
fn test_sat_to_mer_keeps_playable_content() {
    let dir = TempDir::new().unwrap();
    let mut chart = Chart::new();
    format::load_str(&mut chart, CHART).unwrap();

    let path = dir.path().join("legacy.mer");
    format::write_file(&chart, &path, ChartFormat::Mer).unwrap();

    let mut legacy = Chart::new();
    let report = format::load_file(&mut legacy, &path).unwrap();
    assert_eq!(report.format, Some(ChartFormat::Mer));
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(legacy.note_count(), chart.note_count());
    assert_eq!(legacy.gimmicks().len(), chart.gimmicks().len());
    assert!((legacy.measure_decimal_to_timestamp(8.0) - chart.measure_decimal_to_timestamp(8.0)).abs() < 1e-9);
    assert!(legacy.verify_chains().is_ok());
}

#[test]
fn test_shift_jis_file_loads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sjis.sat");
    let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode("@SAT_VERSION 3\n@TITLE 夜明け\n");
    std::fs::write(&path, &bytes).unwrap();

    let mut chart = Chart::new();
    format::load_file(&mut chart, &path).unwrap();
    assert_eq!(chart.metadata.title, "夜明け");
}

#[test]
fn test_failed_load_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.sat");
    let mut chart = Chart::new();
    match format::load_file(&mut chart, &path) {
        Err(ChartError::FileRead { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected FileRead, got {other:?}"),
    }
}

#[test]
fn test_clipboard_paste_gets_fresh_ids() {
    let mut chart = Chart::new();
    format::load_str(&mut chart, CHART).unwrap();
    let hold: Vec<Note> = chart
        .notes()
        .filter(|n| n.is_chain_member())
        .cloned()
        .collect();
    let text = clipboard::encode_notes(&hold);

    let pasted = chart.adopt_notes(clipboard::decode_notes(&text));
    assert_eq!(pasted.len(), 3);
    for note in &pasted {
        assert!(!chart.contains_note(note.id));
    }
    for note in pasted {
        chart.insert_note(note);
    }
    chart.sort();
    assert_eq!(chart.note_count(), 9);
    assert!(chart.verify_chains().is_ok());

    let extra = Note::new(chart.next_note_id(), BeatData::new(5, 0), NoteType::Touch, 0, 4);
    assert!(!chart.contains_note(extra.id));
}
