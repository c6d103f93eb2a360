use std::collections::HashMap;

use crate::beat::{BeatData, TimeSig};
use crate::chart::{Chart, ChartMetadata};
use crate::format::{LoadReport, fields};
use crate::gimmick::{Gimmick, GimmickKind};
use crate::ids::NoteId;
use crate::note::{BonusType, ChainFamily, ChainRole, MaskDirection, Note, NoteType, POSITION_COUNT};
use crate::time_scale::SCROLL_LAYER_COUNT;

pub(crate) const VERSION: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Gimmicks,
    Objects,
}

const NOTE_TOKENS: &[(NoteType, &str)] = &[
    (NoteType::Touch, "TOUCH"),
    (NoteType::SnapForward, "SNFW"),
    (NoteType::SnapBackward, "SNBW"),
    (NoteType::SlideClockwise, "SLCW"),
    (NoteType::SlideCounterclockwise, "SLCCW"),
    (NoteType::Chain, "CHAIN"),
    (NoteType::Damage, "DAMAGE"),
    (NoteType::HoldStart, "HOLD_START"),
    (NoteType::HoldSegment, "HOLD_POINT"),
    (NoteType::HoldEnd, "HOLD_END"),
    (NoteType::TraceStart, "TRACE_START"),
    (NoteType::TraceSegment, "TRACE_POINT"),
    (NoteType::TraceEnd, "TRACE_END"),
    (NoteType::MaskAdd, "MASK_ADD"),
    (NoteType::MaskRemove, "MASK_SUB"),
];

fn note_token(note_type: NoteType) -> &'static str {
    NOTE_TOKENS
        .iter()
        .find(|(t, _)| *t == note_type)
        .map(|(_, s)| *s)
        .unwrap_or("TOUCH")
}

fn parse_note_token(token: &str) -> Option<NoteType> {
    NOTE_TOKENS.iter().find(|(_, s)| *s == token).map(|(t, _)| *t)
}

// --- decode ---

pub(crate) fn decode(chart: &mut Chart, text: &str, report: &mut LoadReport) {
    let mut section = Section::Header;
    let mut linker = ChainLinker::new(false);

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        match line {
            "@GIMMICKS" => {
                section = Section::Gimmicks;
                continue;
            }
            "@OBJECTS" => {
                section = Section::Objects;
                continue;
            }
            _ => {}
        }

        match section {
            Section::Header => {
                if let Err(reason) = parse_header_line(&mut chart.metadata, line) {
                    report.skip(line_no, reason);
                }
            }
            Section::Gimmicks => match parse_gimmick_line(line) {
                Ok((beat, kind, layer)) => {
                    let id = chart.next_gimmick_id();
                    chart.insert_gimmick(Gimmick::new(id, beat, kind).with_layer(layer));
                }
                Err(reason) => report.skip(line_no, reason),
            },
            Section::Objects => match parse_object_line(line) {
                Ok(mut note) => {
                    note.id = chart.next_note_id();
                    if !linker.push(note) {
                        tracing::warn!(line = line_no, "dropping chain continuation without a head");
                    }
                }
                Err(reason) => report.skip(line_no, reason),
            },
        }
    }

    let (notes, dropped) = linker.finish();
    report.dropped_links += dropped;
    for note in notes {
        chart.insert_note(note);
    }
}

fn parse_header_line(metadata: &mut ChartMetadata, line: &str) -> std::result::Result<(), &'static str> {
    let Some(rest) = line.strip_prefix('@') else {
        return Err("header line without '@'");
    };
    let (key, value) = match rest.split_once(char::is_whitespace) {
        Some((key, value)) => (key, value.trim()),
        None => (rest, ""),
    };
    let number = |v: &str| v.parse::<f64>().map_err(|_| "header value is not a number");

    match key {
        "SAT_VERSION" | "VERSION" => {}
        "TITLE" => metadata.title = value.to_string(),
        "RUBI" => metadata.rubi = value.to_string(),
        "ARTIST" => metadata.artist = value.to_string(),
        "AUTHOR" => metadata.author = value.to_string(),
        "DIFF" => {
            metadata.difficulty = value.parse().map_err(|_| "difficulty is not an integer")?;
        }
        "LEVEL" => metadata.level = number(value)?,
        "CLEAR" => metadata.clear_threshold = number(value)?,
        "BPM_TEXT" => metadata.bpm_text = value.to_string(),
        "PREVIEW_START" => metadata.preview_start = number(value)?,
        "PREVIEW_TIME" => metadata.preview_length = number(value)?,
        "BGM" => metadata.bgm_file_path = value.to_string(),
        "BGM_OFFSET" => metadata.bgm_offset = number(value)?,
        "BGA" => metadata.bga_file_path = value.to_string(),
        "BGA_OFFSET" => metadata.bga_offset = number(value)?,
        "COMMENT" => metadata.comments.push(value.to_string()),
        _ => tracing::debug!(key, "ignoring unknown header key"),
    }
    Ok(())
}

/// Split a trailing `L<n>` scroll layer token off the field list.
fn take_layer<'a>(parts: &mut Vec<&'a str>) -> std::result::Result<u8, &'static str> {
    let Some(last) = parts.last() else {
        return Ok(0);
    };
    let Some(digits) = last.strip_prefix('L') else {
        return Ok(0);
    };
    let layer: u8 = digits.parse().map_err(|_| "bad layer token")?;
    if layer as usize >= SCROLL_LAYER_COUNT {
        return Err("scroll layer out of range");
    }
    parts.pop();
    Ok(layer)
}

fn parse_beat(measure: &str, tick: &str) -> std::result::Result<BeatData, &'static str> {
    let measure: i32 = measure.parse().map_err(|_| "measure is not an integer")?;
    if measure < 0 {
        return Err("measure before chart start");
    }
    let tick: i32 = tick.parse().map_err(|_| "tick is not an integer")?;
    if !(0..crate::beat::TICKS_PER_MEASURE).contains(&tick) {
        return Err("tick out of range");
    }
    Ok(BeatData::new(measure, tick))
}

fn parse_gimmick_line(line: &str) -> std::result::Result<(BeatData, GimmickKind, u8), &'static str> {
    let mut parts = fields(line);
    let layer = take_layer(&mut parts)?;
    if parts.len() < 4 {
        return Err("gimmick line has too few fields");
    }
    let beat = parse_beat(parts[0], parts[1])?;
    let payload = &parts[4..];
    let value = |i: usize| -> std::result::Result<f64, &'static str> {
        payload
            .get(i)
            .ok_or("missing gimmick value")?
            .parse::<f64>()
            .map_err(|_| "gimmick value is not a number")
    };

    let kind = match parts[3] {
        "BPM" => {
            let bpm = value(0)?;
            if bpm.is_nan() || bpm <= 0.0 {
                return Err("bpm must be positive");
            }
            GimmickKind::BpmChange { bpm }
        }
        "TIMESIG" => {
            let upper = value(0)? as i32;
            let lower = value(1)? as i32;
            GimmickKind::TimeSigChange(TimeSig::checked(upper, lower).ok_or("time signature must be positive")?)
        }
        "HISPEED" => GimmickKind::HiSpeedChange { hi_speed: value(0)? },
        "REV_START" => GimmickKind::ReverseEffectStart,
        "REV_END" => GimmickKind::ReverseEffectEnd,
        "REV_ZONE_END" => GimmickKind::ReverseNoteEnd,
        "STOP_START" => GimmickKind::StopStart,
        "STOP_END" => GimmickKind::StopEnd,
        "CHART_END" => GimmickKind::EndOfChart,
        _ => return Err("unknown gimmick type"),
    };
    Ok((beat, kind, layer))
}

/// Parse one object line. The returned note carries a placeholder id and no links.
pub(crate) fn parse_object_line(line: &str) -> std::result::Result<Note, &'static str> {
    let mut parts = fields(line);
    let layer = take_layer(&mut parts)?;
    if parts.len() != 6 {
        return Err("object line must have six fields");
    }
    let beat = parse_beat(parts[0], parts[1])?;
    let position: i32 = parts[3].parse().map_err(|_| "position is not an integer")?;
    let size: i32 = parts[4].parse().map_err(|_| "size is not an integer")?;
    if !(0..POSITION_COUNT).contains(&position) {
        return Err("position out of range");
    }
    if !(1..=POSITION_COUNT).contains(&size) {
        return Err("size out of range");
    }

    let mut tokens = parts[5].split('.');
    let note_type = tokens
        .next()
        .and_then(parse_note_token)
        .ok_or("unknown object type")?;
    let mut note = Note::new(NoteId(0), beat, note_type, position, size).with_layer(layer);
    for modifier in tokens {
        match modifier {
            "BONUS" => note.bonus_type = BonusType::Bonus,
            "RNOTE" => note.bonus_type = BonusType::RNote,
            "NR" => note.render_segment = false,
            "CW" | "CCW" | "CENTER" if note.is_mask() => {
                note.mask_direction = Some(match modifier {
                    "CW" => MaskDirection::Clockwise,
                    "CCW" => MaskDirection::Counterclockwise,
                    _ => MaskDirection::Center,
                });
            }
            _ => return Err("unknown object modifier"),
        }
    }
    Ok(note)
}

/// Rebuilds chains from notes listed head-first and contiguously.
///
/// A continuation with no open chain of its family (or one that would step
/// back in time) is either dropped or, with `promote_orphans`, turned into
/// the head of a new chain. A chain left open without an end has its tail
/// retyped to the end role.
pub(crate) struct ChainLinker {
    notes: Vec<Note>,
    open: HashMap<ChainFamily, usize>,
    promote_orphans: bool,
    dropped: usize,
}

impl ChainLinker {
    pub(crate) fn new(promote_orphans: bool) -> Self {
        Self {
            notes: Vec::new(),
            open: HashMap::new(),
            promote_orphans,
            dropped: 0,
        }
    }

    /// Returns false when the note was dropped.
    pub(crate) fn push(&mut self, mut note: Note) -> bool {
        let (Some(family), Some(role)) = (note.note_type.chain_family(), note.note_type.chain_role())
        else {
            self.notes.push(note);
            return true;
        };

        if role == ChainRole::Start {
            self.close(family);
            self.open.insert(family, self.notes.len());
            self.notes.push(note);
            return true;
        }

        let prev_idx = self
            .open
            .get(&family)
            .copied()
            .filter(|&i| self.notes[i].full_tick() <= note.full_tick());
        match prev_idx {
            Some(prev_idx) => {
                let idx = self.notes.len();
                self.notes[prev_idx].next = Some(note.id);
                note.prev = Some(self.notes[prev_idx].id);
                self.notes.push(note);
                if role == ChainRole::End {
                    self.open.remove(&family);
                } else {
                    self.open.insert(family, idx);
                }
                true
            }
            None if self.promote_orphans => {
                self.close(family);
                note.note_type = family.note_type(ChainRole::Start);
                self.open.insert(family, self.notes.len());
                self.notes.push(note);
                true
            }
            None => {
                self.dropped += 1;
                false
            }
        }
    }

    fn close(&mut self, family: ChainFamily) {
        let Some(idx) = self.open.remove(&family) else {
            return;
        };
        let tail = &mut self.notes[idx];
        if tail.prev.is_some() && tail.note_type.chain_role() != Some(ChainRole::End) {
            tracing::warn!(id = %tail.id, "chain has no end; closing it at its last point");
            tail.note_type = family.note_type(ChainRole::End);
        }
    }

    pub(crate) fn finish(mut self) -> (Vec<Note>, usize) {
        self.close(ChainFamily::Hold);
        self.close(ChainFamily::Trace);
        (self.notes, self.dropped)
    }
}

// --- encode ---

pub(crate) fn encode(chart: &Chart) -> String {
    let m = &chart.metadata;
    let mut out = vec![
        format!("@SAT_VERSION {VERSION}"),
        String::new(),
        format!("@TITLE {}", m.title),
        format!("@RUBI {}", m.rubi),
        format!("@ARTIST {}", m.artist),
        format!("@AUTHOR {}", m.author),
        format!("@DIFF {}", m.difficulty),
        format!("@LEVEL {}", m.level),
        format!("@CLEAR {}", m.clear_threshold),
        format!("@BPM_TEXT {}", m.bpm_text),
        format!("@PREVIEW_START {}", m.preview_start),
        format!("@PREVIEW_TIME {}", m.preview_length),
        format!("@BGM {}", m.bgm_file_path),
        format!("@BGM_OFFSET {}", m.bgm_offset),
        format!("@BGA {}", m.bga_file_path),
        format!("@BGA_OFFSET {}", m.bga_offset),
    ];
    out.extend(m.comments.iter().map(|comment| format!("@COMMENT {comment}")));

    out.push(String::new());
    out.push("@GIMMICKS".to_string());
    let mut gimmicks: Vec<&Gimmick> = chart.gimmicks().iter().collect();
    gimmicks.sort_by_key(|g| g.full_tick());
    out.extend(gimmicks.iter().enumerate().map(|(index, gimmick)| gimmick_line(gimmick, index)));

    out.push(String::new());
    out.push("@OBJECTS".to_string());
    let mut index = 0;
    for head in chart
        .notes()
        .filter(|n| n.prev.is_none_or(|p| !chart.contains_note(p)))
    {
        let chain = if head.is_chain_member() {
            chart.references(head.id)
        } else {
            vec![head]
        };
        for note in chain {
            out.push(object_line(note, index));
            index += 1;
        }
    }

    let mut text = out.join("\n");
    text.push('\n');
    text
}

fn layer_suffix(layer: u8) -> String {
    if layer == 0 {
        String::new()
    } else {
        format!(" L{layer}")
    }
}

fn gimmick_line(gimmick: &Gimmick, index: usize) -> String {
    let payload = match gimmick.kind {
        GimmickKind::BpmChange { bpm } => format!("BPM {bpm}"),
        GimmickKind::TimeSigChange(sig) => format!("TIMESIG {} {}", sig.upper, sig.lower),
        GimmickKind::HiSpeedChange { hi_speed } => format!("HISPEED {hi_speed}"),
        GimmickKind::ReverseEffectStart => "REV_START".to_string(),
        GimmickKind::ReverseEffectEnd => "REV_END".to_string(),
        GimmickKind::ReverseNoteEnd => "REV_ZONE_END".to_string(),
        GimmickKind::StopStart => "STOP_START".to_string(),
        GimmickKind::StopEnd => "STOP_END".to_string(),
        GimmickKind::EndOfChart => "CHART_END".to_string(),
    };
    format!(
        "{:>4} {:>4} {:>4} {}{}",
        gimmick.beat.measure(),
        gimmick.beat.tick(),
        index,
        payload,
        layer_suffix(gimmick.scroll_layer)
    )
}

pub(crate) fn object_line(note: &Note, index: usize) -> String {
    let mut token = note_token(note.note_type).to_string();
    match note.bonus_type {
        BonusType::None => {}
        BonusType::Bonus => token.push_str(".BONUS"),
        BonusType::RNote => token.push_str(".RNOTE"),
    }
    if !note.render_segment {
        token.push_str(".NR");
    }
    if note.is_mask() {
        token.push_str(match note.mask_direction.unwrap_or(MaskDirection::Center) {
            MaskDirection::Clockwise => ".CW",
            MaskDirection::Counterclockwise => ".CCW",
            MaskDirection::Center => ".CENTER",
        });
    }
    format!(
        "{:>4} {:>4} {:>4} {:>4} {:>4} {}{}",
        note.beat.measure(),
        note.beat.tick(),
        index,
        note.position,
        note.size,
        token,
        layer_suffix(note.scroll_layer)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::load_str;

    const SAMPLE: &str = "\
@SAT_VERSION 3

@TITLE Orbit Test
@ARTIST someone
@DIFF 2
@LEVEL 12.7
@COMMENT first
@COMMENT second

@GIMMICKS
   0    0    0 BPM 150
   0    0    1 TIMESIG 4 4
   2    0    2 HISPEED 2 L3
   3  960    3 STOP_START
   4    0    4 STOP_END

@OBJECTS
   0    0    0   10    4 TOUCH.BONUS
   1    0    1   20    6 HOLD_START
   1  480    2   22    6 HOLD_POINT.NR
   1  960    3   24    6 HOLD_END
   2    0    4    0   60 MASK_ADD.CW
   2  100    5   30    8 TRACE_START L2
   2  200    6   31    8 TRACE_END L2
";

    #[test]
    fn decodes_header_gimmicks_and_objects() {
        let mut chart = Chart::new();
        let report = load_str(&mut chart, SAMPLE).unwrap();
        assert!(report.is_clean(), "{report:?}");

        assert_eq!(chart.metadata.title, "Orbit Test");
        assert_eq!(chart.metadata.difficulty, 2);
        assert_eq!(chart.metadata.level, 12.7);
        assert_eq!(chart.metadata.comments, vec!["first", "second"]);

        assert_eq!(chart.gimmicks().len(), 5);
        assert_eq!(chart.gimmicks()[2].scroll_layer, 3);
        assert_eq!(chart.start_bpm(), Some(150.0));

        let notes: Vec<&Note> = chart.notes().collect();
        assert_eq!(notes.len(), 7);
        assert_eq!(notes[0].bonus_type, BonusType::Bonus);
        assert!(!notes[2].render_segment);
        assert_eq!(notes[4].mask_direction, Some(MaskDirection::Clockwise));
        assert_eq!(notes[5].scroll_layer, 2);

        let hold = chart.references(notes[2].id);
        assert_eq!(hold.len(), 3);
        assert_eq!(hold[0].note_type, NoteType::HoldStart);
        assert_eq!(hold[2].note_type, NoteType::HoldEnd);
        assert!(chart.verify_chains().is_ok());
    }

    #[test]
    fn skips_malformed_lines_and_continues() {
        let text = "\
@SAT_VERSION 3
@GIMMICKS
0 0 0 BPM 120
0 0 1 TIMESIG 4 0
0 0 2 WARP 3
@OBJECTS
0 0 0 10 4 TOUCH
0 0 1 70 4 TOUCH
0 0 2 10 0 TOUCH
0 0 3 10 4 TOUCH.SPARKLY
0 0 4 10 4 TOUCH L12
1 0 5 10 4 CHAIN
";
        let mut chart = Chart::new();
        let report = load_str(&mut chart, text).unwrap();
        assert_eq!(report.skipped_lines, vec![4, 5, 8, 9, 10, 11]);
        assert_eq!(chart.note_count(), 2);
        assert_eq!(chart.gimmicks().len(), 1);
    }

    #[test]
    fn lines_before_chart_start_are_skipped() {
        let text = "\
@SAT_VERSION 3
@GIMMICKS
-1 0 0 HISPEED 2
0 0 1 BPM 120
0 0 2 TIMESIG 4 4
@OBJECTS
-1 960 0 10 4 TOUCH
0 0 1 10 4 TOUCH
";
        let mut chart = Chart::new();
        let report = load_str(&mut chart, text).unwrap();
        assert_eq!(report.skipped_lines, vec![3, 7]);
        assert_eq!(chart.gimmicks().len(), 2);
        assert_eq!(chart.note_count(), 1);

        let raw: Vec<i32> = chart.scroll_scale().layer(0).iter().map(|e| e.raw_beat.full_tick()).collect();
        assert_eq!(raw, vec![0]);
        assert!((chart.scaled_measure_decimal(1.5, true, 0) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn drops_continuation_without_head() {
        let text = "\
@SAT_VERSION 3
@OBJECTS
0 0 0 10 4 HOLD_POINT
0 480 1 10 4 HOLD_END
1 0 2 10 4 TOUCH
";
        let mut chart = Chart::new();
        let report = load_str(&mut chart, text).unwrap();
        assert_eq!(report.dropped_links, 2);
        assert_eq!(chart.note_count(), 1);
    }

    #[test]
    fn unterminated_chain_is_closed() {
        let text = "\
@SAT_VERSION 3
@OBJECTS
0 0 0 10 4 HOLD_START
0 480 1 10 4 HOLD_POINT
";
        let mut chart = Chart::new();
        load_str(&mut chart, text).unwrap();
        let notes: Vec<&Note> = chart.notes().collect();
        assert_eq!(notes[1].note_type, NoteType::HoldEnd);
        assert!(chart.verify_chains().is_ok());
    }

    #[test]
    fn encode_then_load_preserves_chart() {
        let mut chart = Chart::new();
        load_str(&mut chart, SAMPLE).unwrap();
        let text = encode(&chart);

        let mut again = Chart::new();
        let report = load_str(&mut again, &text).unwrap();
        assert!(report.is_clean());
        assert_eq!(again.metadata, chart.metadata);

        let strip = |c: &Chart| {
            c.notes()
                .map(|n| (n.full_tick(), n.note_type, n.position, n.size, n.bonus_type, n.render_segment, n.scroll_layer))
                .collect::<Vec<_>>()
        };
        assert_eq!(strip(&again), strip(&chart));
        let kinds = |c: &Chart| c.gimmicks().iter().map(|g| (g.full_tick(), g.kind, g.scroll_layer)).collect::<Vec<_>>();
        assert_eq!(kinds(&again), kinds(&chart));
        assert!(again.verify_chains().is_ok());
    }

    #[test]
    fn encode_layout_is_line_per_entry() {
        let mut chart = Chart::new();
        load_str(&mut chart, SAMPLE).unwrap();
        let text = encode(&chart);
        assert!(text.starts_with("@SAT_VERSION 3\n\n@TITLE Orbit Test\n"));
        assert!(text.ends_with("TRACE_END L2\n"));
        assert!(text.contains("@COMMENT second\n\n@GIMMICKS\n"));
        assert_eq!(text.lines().filter(|l| l.ends_with(" L3")).count(), 1);
    }

    #[test]
    fn interleaved_chains_are_written_contiguously() {
        let text = "\
@SAT_VERSION 3
@OBJECTS
0 0 0 10 4 HOLD_START
0 960 1 10 4 HOLD_END
0 480 2 40 4 TRACE_START
1 0 3 40 4 TRACE_END
";
        let mut chart = Chart::new();
        load_str(&mut chart, text).unwrap();
        let encoded = encode(&chart);
        let objects: Vec<&str> = encoded
            .lines()
            .skip_while(|l| *l != "@OBJECTS")
            .skip(1)
            .collect();
        assert!(objects[0].ends_with("HOLD_START"));
        assert!(objects[1].ends_with("HOLD_END"));
        assert!(objects[2].ends_with("TRACE_START"));
    }
}
