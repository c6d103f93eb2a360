//! Copy/paste text for a set of notes, using the object line grammar of the
//! `sat` dialect without any header or gimmicks.

use std::collections::HashMap;

use crate::format::sat::{ChainLinker, object_line, parse_object_line};
use crate::ids::NoteId;
use crate::note::Note;

/// Encode notes; links to notes outside the set are cut.
pub fn encode_notes(notes: &[Note]) -> String {
    let by_id: HashMap<NoteId, &Note> = notes.iter().map(|n| (n.id, n)).collect();
    let mut heads: Vec<&Note> = notes
        .iter()
        .filter(|n| n.prev.is_none_or(|p| !by_id.contains_key(&p)))
        .collect();
    heads.sort_by_key(|n| n.full_tick());

    let mut out = String::new();
    let mut index = 0;
    for head in heads {
        let mut current = Some(head);
        while let Some(note) = current {
            out.push_str(&object_line(note, index));
            out.push('\n');
            index += 1;
            current = note
                .next
                .and_then(|n| by_id.get(&n).copied())
                .filter(|_| index <= notes.len());
        }
    }
    out
}

/// Decode clipboard text into notes with placeholder ids and internal links.
/// Pass the result through `Chart::adopt_notes` before inserting.
pub fn decode_notes(text: &str) -> Vec<Note> {
    let mut linker = ChainLinker::new(true);
    let mut next_id = 1;
    for (idx, line) in text.lines().map(str::trim).enumerate() {
        if line.is_empty() {
            continue;
        }
        match parse_object_line(line) {
            Ok(mut note) => {
                note.id = NoteId(next_id);
                next_id += 1;
                linker.push(note);
            }
            Err(reason) => tracing::warn!(line = idx + 1, reason, "ignoring clipboard line"),
        }
    }
    linker.finish().0
}
