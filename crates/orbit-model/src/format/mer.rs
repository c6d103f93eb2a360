use std::collections::HashMap;

use crate::beat::{BeatData, TICKS_PER_MEASURE, TimeSig};
use crate::chart::Chart;
use crate::format::{LoadReport, fields};
use crate::gimmick::{Gimmick, GimmickKind};
use crate::ids::NoteId;
use crate::note::{BonusType, ChainFamily, ChainRole, MaskDirection, Note, NoteType, POSITION_COUNT};

const NOTE_CLASS: &str = "1";
const GIMMICK_CLASS: &str = "2";
const END_OF_CHART_ID: u32 = 14;

/// Legacy note type ids. Bonus variants share the base note type.
const NOTE_IDS: &[(u32, NoteType, BonusType)] = &[
    (1, NoteType::Touch, BonusType::None),
    (2, NoteType::Touch, BonusType::Bonus),
    (3, NoteType::SnapForward, BonusType::None),
    (4, NoteType::SnapBackward, BonusType::None),
    (5, NoteType::SlideClockwise, BonusType::None),
    (6, NoteType::SlideClockwise, BonusType::Bonus),
    (7, NoteType::SlideCounterclockwise, BonusType::None),
    (8, NoteType::SlideCounterclockwise, BonusType::Bonus),
    (9, NoteType::HoldStart, BonusType::None),
    (10, NoteType::HoldSegment, BonusType::None),
    (11, NoteType::HoldEnd, BonusType::None),
    (12, NoteType::MaskAdd, BonusType::None),
    (13, NoteType::MaskRemove, BonusType::None),
    (16, NoteType::Chain, BonusType::None),
    (20, NoteType::Touch, BonusType::RNote),
    (21, NoteType::SnapForward, BonusType::RNote),
    (22, NoteType::SnapBackward, BonusType::RNote),
    (23, NoteType::SlideClockwise, BonusType::RNote),
    (24, NoteType::SlideCounterclockwise, BonusType::RNote),
    (25, NoteType::HoldStart, BonusType::RNote),
    (26, NoteType::Chain, BonusType::RNote),
];

fn note_type_from_id(id: u32) -> Option<(NoteType, BonusType)> {
    NOTE_IDS
        .iter()
        .find(|(i, _, _)| *i == id)
        .map(|(_, t, b)| (*t, *b))
}

/// Legacy id for a note, dropping a bonus the dialect cannot express.
fn note_type_id(note: &Note) -> Option<u32> {
    let exact = NOTE_IDS
        .iter()
        .find(|(_, t, b)| *t == note.note_type && *b == note.bonus_type);
    let plain = || {
        NOTE_IDS
            .iter()
            .find(|(_, t, b)| *t == note.note_type && *b == BonusType::None)
    };
    exact.or_else(plain).map(|(i, _, _)| *i)
}

fn mask_direction_from_id(id: &str) -> Option<MaskDirection> {
    match id {
        "0" => Some(MaskDirection::Counterclockwise),
        "1" => Some(MaskDirection::Clockwise),
        "2" => Some(MaskDirection::Center),
        _ => None,
    }
}

fn mask_direction_id(direction: MaskDirection) -> u32 {
    match direction {
        MaskDirection::Counterclockwise => 0,
        MaskDirection::Clockwise => 1,
        MaskDirection::Center => 2,
    }
}

pub(crate) fn has_body(text: &str) -> bool {
    text.lines().any(|l| l.trim() == "#BODY")
}

// --- decode ---

struct PendingNote {
    note: Note,
    file_index: i64,
    next_index: Option<i64>,
}

pub(crate) fn decode(chart: &mut Chart, text: &str, report: &mut LoadReport) {
    let mut in_body = false;
    let mut pending: Vec<PendingNote> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if !in_body {
            if line == "#BODY" {
                in_body = true;
            } else {
                parse_header_line(chart, line);
            }
            continue;
        }

        let parts = fields(line);
        match parse_body_line(&parts) {
            Ok(BodyLine::Gimmick(beat, kind)) => {
                let id = chart.next_gimmick_id();
                chart.insert_gimmick(Gimmick::new(id, beat, kind));
            }
            Ok(BodyLine::Note { mut note, file_index, next_index }) => {
                if pending.iter().any(|p| p.file_index == file_index) {
                    report.skip(line_no, "duplicate note index");
                    continue;
                }
                note.id = chart.next_note_id();
                pending.push(PendingNote {
                    note,
                    file_index,
                    next_index,
                });
            }
            Err(reason) => report.skip(line_no, reason),
        }
    }

    link_holds(&mut pending, report);
    for p in pending {
        chart.insert_note(p.note);
    }
}

fn parse_header_line(chart: &mut Chart, line: &str) {
    let (key, value) = match line.split_once(char::is_whitespace) {
        Some((key, value)) => (key, value.trim()),
        None => (line, ""),
    };
    let m = &mut chart.metadata;
    match key {
        "#MUSIC_SCORE_ID" => m.score_id = value.to_string(),
        "#MUSIC_SCORE_VERSION" => m.score_version = value.to_string(),
        "#GAME_VERSION" => m.game_version = value.to_string(),
        "#MUSIC_FILE_PATH" => m.bgm_file_path = value.to_string(),
        "#OFFSET" => m.bgm_offset = value.parse().unwrap_or_default(),
        "#MOVIEOFFSET" => m.bga_offset = value.parse().unwrap_or_default(),
        _ => tracing::debug!(key, "ignoring unknown header line"),
    }
}

enum BodyLine {
    Gimmick(BeatData, GimmickKind),
    Note {
        note: Note,
        file_index: i64,
        next_index: Option<i64>,
    },
}

fn parse_body_line(parts: &[&str]) -> std::result::Result<BodyLine, &'static str> {
    if parts.len() < 4 {
        return Err("body line has too few fields");
    }
    let measure: i32 = parts[0].parse().map_err(|_| "measure is not an integer")?;
    if measure < 0 {
        return Err("measure before chart start");
    }
    let tick: i32 = parts[1].parse().map_err(|_| "tick is not an integer")?;
    if !(0..TICKS_PER_MEASURE).contains(&tick) {
        return Err("tick out of range");
    }
    let beat = BeatData::new(measure, tick);
    let type_id: u32 = parts[3].parse().map_err(|_| "type id is not an integer")?;

    match parts[2] {
        GIMMICK_CLASS => parse_gimmick(beat, type_id, &parts[4..]).map(|kind| BodyLine::Gimmick(beat, kind)),
        NOTE_CLASS if type_id == END_OF_CHART_ID => Ok(BodyLine::Gimmick(beat, GimmickKind::EndOfChart)),
        NOTE_CLASS => parse_note(beat, type_id, &parts[4..]),
        _ => Err("unknown line class"),
    }
}

fn parse_gimmick(beat: BeatData, type_id: u32, payload: &[&str]) -> std::result::Result<GimmickKind, &'static str> {
    let value = |i: usize| -> std::result::Result<f64, &'static str> {
        payload
            .get(i)
            .ok_or("missing gimmick value")?
            .parse::<f64>()
            .map_err(|_| "gimmick value is not a number")
    };
    let kind = match type_id {
        2 => {
            let bpm = value(0)?;
            if bpm.is_nan() || bpm <= 0.0 {
                return Err("bpm must be positive");
            }
            GimmickKind::BpmChange { bpm }
        }
        3 => {
            let sig = TimeSig::checked(value(0)? as i32, value(1)? as i32);
            GimmickKind::TimeSigChange(sig.ok_or("time signature must be positive")?)
        }
        5 => GimmickKind::HiSpeedChange { hi_speed: value(0)? },
        6 => GimmickKind::ReverseEffectStart,
        7 => GimmickKind::ReverseEffectEnd,
        8 => GimmickKind::ReverseNoteEnd,
        9 => GimmickKind::StopStart,
        10 => GimmickKind::StopEnd,
        _ => {
            tracing::debug!(type_id, full_tick = beat.full_tick(), "unknown gimmick id");
            return Err("unknown gimmick type");
        }
    };
    Ok(kind)
}

fn parse_note(beat: BeatData, type_id: u32, rest: &[&str]) -> std::result::Result<BodyLine, &'static str> {
    if rest.len() < 4 {
        return Err("note line has too few fields");
    }
    let (note_type, bonus_type) = note_type_from_id(type_id).ok_or("unknown note type")?;
    let file_index: i64 = rest[0].parse().map_err(|_| "note index is not an integer")?;
    let position: i32 = rest[1].parse().map_err(|_| "position is not an integer")?;
    let size: i32 = rest[2].parse().map_err(|_| "size is not an integer")?;
    if !(0..POSITION_COUNT).contains(&position) {
        return Err("position out of range");
    }
    if !(1..=POSITION_COUNT).contains(&size) {
        return Err("size out of range");
    }
    let render_segment = match rest[3] {
        "0" => false,
        "1" => true,
        _ => return Err("render flag must be 0 or 1"),
    };

    let mut note = Note::new(NoteId(0), beat, note_type, position, size).with_bonus(bonus_type);
    note.render_segment = render_segment;

    let mut next_index = None;
    if let Some(extra) = rest.get(4) {
        if note.is_mask() {
            note.mask_direction = Some(mask_direction_from_id(extra).ok_or("unknown mask direction")?);
        } else if note.is_chain_member() {
            next_index = Some(extra.parse().map_err(|_| "next index is not an integer")?);
        }
    }
    Ok(BodyLine::Note {
        note,
        file_index,
        next_index,
    })
}

/// Resolve next-index references into prev/next links, then retype every
/// hold note to match its place in the resulting chain.
fn link_holds(pending: &mut [PendingNote], report: &mut LoadReport) {
    let by_index: HashMap<i64, usize> = pending
        .iter()
        .enumerate()
        .map(|(i, p)| (p.file_index, i))
        .collect();

    for i in 0..pending.len() {
        let Some(next_index) = pending[i].next_index else {
            continue;
        };
        let target = by_index.get(&next_index).copied().filter(|&j| {
            let (from, to) = (&pending[i].note, &pending[j].note);
            let forward = (to.full_tick(), j) > (from.full_tick(), i);
            forward && to.is_chain_member() && to.prev.is_none() && from.next.is_none()
        });
        match target {
            Some(j) => {
                let (from_id, to_id) = (pending[i].note.id, pending[j].note.id);
                pending[i].note.next = Some(to_id);
                pending[j].note.prev = Some(from_id);
            }
            None => {
                tracing::warn!(next_index, "dropping hold link to a missing or invalid note");
                report.dropped_links += 1;
            }
        }
    }

    for p in pending.iter_mut().filter(|p| p.note.is_chain_member()) {
        let role = match (p.note.prev, p.note.next) {
            (None, _) => ChainRole::Start,
            (Some(_), Some(_)) => ChainRole::Segment,
            (Some(_), None) => ChainRole::End,
        };
        let expected = ChainFamily::Hold.note_type(role);
        if p.note.note_type != expected {
            tracing::warn!(index = p.file_index, "retyping hold note to match its chain position");
            p.note.note_type = expected;
        }
    }
}

// --- encode ---

pub(crate) fn encode(chart: &Chart) -> String {
    let m = &chart.metadata;
    let or_zero = |s: &str| if s.is_empty() { "0".to_string() } else { s.to_string() };
    let mut out = vec![
        format!("#MUSIC_SCORE_ID {}", or_zero(&m.score_id)),
        format!("#MUSIC_SCORE_VERSION {}", or_zero(&m.score_version)),
        format!("#GAME_VERSION {}", m.game_version),
        format!("#MUSIC_FILE_PATH {}", m.bgm_file_path),
        format!("#OFFSET {}", m.bgm_offset),
        format!("#MOVIEOFFSET {}", m.bga_offset),
        "#BODY".to_string(),
    ];

    let encodable: Vec<&Note> = chart
        .notes()
        .filter(|n| note_type_id(n).is_some())
        .collect();
    let dropped = chart.note_count() - encodable.len();
    if dropped > 0 {
        tracing::warn!(dropped, "notes without a legacy equivalent were not written");
    }
    let indices: HashMap<NoteId, usize> = encodable.iter().enumerate().map(|(i, n)| (n.id, i)).collect();

    // (full_tick, class order, line)
    let mut lines: Vec<(i32, u8, String)> = Vec::new();
    let mut spare_index = encodable.len();
    for gimmick in chart.gimmicks() {
        let beat = gimmick.beat;
        let line = match gimmick.kind {
            GimmickKind::EndOfChart => {
                spare_index += 1;
                format!(
                    "{:>4} {:>4} {:>4} {:>4} {:>4} {:>4} {:>4} {:>4}",
                    beat.measure(),
                    beat.tick(),
                    NOTE_CLASS,
                    END_OF_CHART_ID,
                    spare_index - 1,
                    0,
                    POSITION_COUNT,
                    1
                )
            }
            kind => gimmick_line(beat, kind),
        };
        lines.push((gimmick.full_tick(), 0, line));
    }
    for (index, note) in encodable.iter().enumerate() {
        lines.push((note.full_tick(), 1, note_line(note, index, &indices)));
    }
    lines.sort_by_key(|(tick, class, _)| (*tick, *class));

    out.extend(lines.into_iter().map(|(_, _, line)| line));
    let mut text = out.join("\n");
    text.push('\n');
    text
}

fn gimmick_line(beat: BeatData, kind: GimmickKind) -> String {
    let (id, payload) = match kind {
        GimmickKind::BpmChange { bpm } => (2, format!(" {bpm}")),
        GimmickKind::TimeSigChange(sig) => (3, format!(" {} {}", sig.upper, sig.lower)),
        GimmickKind::HiSpeedChange { hi_speed } => (5, format!(" {hi_speed}")),
        GimmickKind::ReverseEffectStart => (6, String::new()),
        GimmickKind::ReverseEffectEnd => (7, String::new()),
        GimmickKind::ReverseNoteEnd => (8, String::new()),
        GimmickKind::StopStart => (9, String::new()),
        GimmickKind::StopEnd => (10, String::new()),
        GimmickKind::EndOfChart => (END_OF_CHART_ID, String::new()),
    };
    format!(
        "{:>4} {:>4} {:>4} {:>4}{}",
        beat.measure(),
        beat.tick(),
        GIMMICK_CLASS,
        id,
        payload
    )
}

fn note_line(note: &Note, index: usize, indices: &HashMap<NoteId, usize>) -> String {
    let type_id = note_type_id(note).unwrap_or(1);
    let mut line = format!(
        "{:>4} {:>4} {:>4} {:>4} {:>4} {:>4} {:>4} {:>4}",
        note.beat.measure(),
        note.beat.tick(),
        NOTE_CLASS,
        type_id,
        index,
        note.position,
        note.size,
        u8::from(note.render_segment)
    );
    if note.is_mask() {
        let direction = note.mask_direction.unwrap_or(MaskDirection::Center);
        line.push_str(&format!(" {:>4}", mask_direction_id(direction)));
    } else if let Some(next) = note.next.and_then(|n| indices.get(&n)) {
        line.push_str(&format!(" {next:>4}"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::load_str;

    const SAMPLE: &str = "\
#MUSIC_SCORE_ID 4021
#MUSIC_SCORE_VERSION 1
#GAME_VERSION
#MUSIC_FILE_PATH song.wav
#OFFSET 0.25
#MOVIEOFFSET 0
#BODY
   0    0    2    2 120.000000
   0    0    2    3    4    4
   0    0    1    2    0   10    4    1
   1    0    1    9    1   20    6    1    2
   1  480    1   10    2   22    6    0    3
   1  960    1   11    3   24    6    1
   2    0    1   12    4    0   60    1    1
   2  960    2    5 1.500000
   4    0    1   14    5    0   60    1
";

    #[test]
    fn decodes_legacy_body() {
        let mut chart = Chart::new();
        let report = load_str(&mut chart, SAMPLE).unwrap();
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(chart.metadata.score_id, "4021");
        assert_eq!(chart.metadata.bgm_offset, 0.25);

        let types: Vec<_> = chart.notes().map(|n| n.note_type).collect();
        assert_eq!(
            types,
            vec![
                NoteType::Touch,
                NoteType::HoldStart,
                NoteType::HoldSegment,
                NoteType::HoldEnd,
                NoteType::MaskAdd
            ]
        );
        let notes: Vec<&Note> = chart.notes().collect();
        assert_eq!(notes[0].bonus_type, BonusType::Bonus);
        assert!(!notes[2].render_segment);
        assert_eq!(notes[4].mask_direction, Some(MaskDirection::Clockwise));
        assert_eq!(chart.references(notes[1].id).len(), 3);
        assert!(chart.verify_chains().is_ok());

        let end = chart.gimmicks().last().unwrap();
        assert_eq!(end.kind, GimmickKind::EndOfChart);
        assert_eq!(end.full_tick(), 4 * 1920);
        assert_eq!(chart.start_bpm(), Some(120.0));
    }

    #[test]
    fn body_lines_before_chart_start_are_skipped() {
        let text = "\
#BODY
  -1    0    2    5 2.000000
   0    0    2    2 120.000000
   0    0    2    3    4    4
  -1  480    1    1    0   10    4    1
";
        let mut chart = Chart::new();
        let report = load_str(&mut chart, text).unwrap();
        assert_eq!(report.skipped_lines, vec![2, 5]);
        assert_eq!(chart.gimmicks().len(), 2);
        assert_eq!(chart.note_count(), 0);
    }

    #[test]
    fn broken_next_index_is_dropped_and_retyped() {
        let text = "\
#BODY
   0    0    1    9    0   20    6    1    7
   0  480    1   11    1   22    6    1
";
        let mut chart = Chart::new();
        let report = load_str(&mut chart, text).unwrap();
        assert_eq!(report.dropped_links, 1);
        let types: Vec<_> = chart.notes().map(|n| n.note_type).collect();
        assert_eq!(types, vec![NoteType::HoldStart, NoteType::HoldStart]);
        assert!(chart.verify_chains().is_ok());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let text = "\
#BODY
   0    0    2    2 abc
   0    0    1   99    0   20    6    1
   0    0    1    1    1   20
   0    0    3    1
   0    0    1    1    2   20    6    1
";
        let mut chart = Chart::new();
        let report = load_str(&mut chart, text).unwrap();
        assert_eq!(report.skipped_lines, vec![2, 3, 4, 5]);
        assert_eq!(chart.note_count(), 1);
    }

    #[test]
    fn missing_body_is_an_error() {
        let mut chart = Chart::new();
        let err = load_str(&mut chart, "#MUSIC_SCORE_VERSION 1\n").unwrap_err();
        assert!(matches!(err, crate::error::ChartError::MissingSection("#BODY")));
    }

    #[test]
    fn encode_drops_traces_and_keeps_holds() {
        let mut chart = Chart::new();
        load_str(&mut chart, SAMPLE).unwrap();
        let id = chart.next_note_id();
        chart.insert_note(Note::new(id, BeatData::new(3, 0), NoteType::TraceStart, 5, 5));
        chart.sort();

        let text = encode(&chart);
        assert!(text.contains("#MOVIEOFFSET 0\n#BODY\n"));
        assert!(text.ends_with('\n') && !text.ends_with("\n\n"));
        let mut again = Chart::new();
        let report = load_str(&mut again, &text).unwrap();
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(again.note_count(), 5);
        assert_eq!(again.gimmicks().len(), chart.gimmicks().len());
        assert_eq!(again.metadata.score_id, "4021");
        let first_hold = again.notes().find(|n| n.note_type == NoteType::HoldStart).unwrap();
        assert_eq!(again.references(first_hold.id).len(), 3);
    }
}
