//! Address assignment for the string area and the dictionary.
//!
//! Strings are packed from the base address with no gaps; the dictionary
//! starts at the next 4-byte boundary. Each entry links back to the one laid
//! out before it, and entries without an index annotation take the next
//! sequential call-table slot.

use serde::Serialize;
use wafo_types::pack::align4;
use wafo_types::{DictionaryEntry, StringElement};

/// The three global cells the core reads at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Markers {
    /// First free byte after the dictionary.
    pub here: u32,
    /// Address of the newest entry, 0 for an empty dictionary.
    pub latest: u32,
    /// First unassigned call-table slot.
    pub next_table_index: u32,
}

/// Running layout cursor, threaded through strings, then entries.
#[derive(Debug, Clone)]
pub struct LayoutState {
    cursor: u32,
    latest: u32,
    next_table_index: u32,
}

impl LayoutState {
    pub fn new(base: u32, first_table_index: u32) -> Self {
        Self {
            cursor: base,
            latest: 0,
            next_table_index: first_table_index,
        }
    }

    pub fn place_string(&mut self, string: &mut StringElement) {
        string.offset = self.cursor;
        self.cursor += string.size();
    }

    /// Move to the next cell boundary.
    pub fn align(&mut self) {
        self.cursor = align4(self.cursor);
    }

    pub fn place_entry(&mut self, entry: &mut DictionaryEntry) {
        entry.prev = self.latest;
        entry.offset = self.cursor;
        self.latest = self.cursor;
        self.cursor += entry.size();
        if entry.index_expr.is_none() {
            entry.index = self.next_table_index;
            self.next_table_index += 1;
        }
        tracing::trace!(
            name = %entry.name_lossy(),
            offset = entry.offset,
            index = entry.index,
            "placed entry"
        );
    }

    pub fn markers(&self) -> Markers {
        Markers {
            here: self.cursor,
            latest: self.latest,
            next_table_index: self.next_table_index,
        }
    }
}

/// Lay out all strings, then all entries, and return the resulting markers.
pub fn lay_out(
    strings: &mut [StringElement],
    entries: &mut [DictionaryEntry],
    base: u32,
    first_table_index: u32,
) -> Markers {
    let mut state = LayoutState::new(base, first_table_index);
    for string in strings.iter_mut() {
        state.place_string(string);
    }
    state.align();
    for entry in entries.iter_mut() {
        state.place_entry(entry);
    }
    let markers = state.markers();
    tracing::debug!(
        here = markers.here,
        latest = markers.latest,
        next_table_index = markers.next_table_index,
        "layout complete"
    );
    markers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strings_are_contiguous_and_dictionary_aligned() {
        let mut strings = vec![StringElement::new("abc"), StringElement::new("de")];
        let mut entries = vec![DictionaryEntry::new("DUP")];
        let markers = lay_out(&mut strings, &mut entries, 0x100, 0x10);
        assert_eq!(strings[0].offset, 0x100);
        assert_eq!(strings[1].offset, 0x104);
        // 0x104 + 3 = 0x107, aligned to 0x108
        assert_eq!(entries[0].offset, 0x108);
        assert_eq!(markers.here, 0x108 + 12);
        assert_eq!(markers.latest, 0x108);
    }

    #[test]
    fn test_prev_chain_and_indices() {
        let mut entries = vec![
            DictionaryEntry::new("A"),
            DictionaryEntry::new("BB"),
            DictionaryEntry::new("CCCC"),
        ];
        entries[1].index_expr = Some("pack(0x99)".into());
        entries[1].index = 0x99;
        let markers = lay_out(&mut [], &mut entries, 0x200, 0x10);
        assert_eq!(entries[0].prev, 0);
        assert_eq!(entries[1].prev, entries[0].offset);
        assert_eq!(entries[2].prev, entries[1].offset);
        assert_eq!(entries[0].index, 0x10);
        assert_eq!(entries[1].index, 0x99);
        assert_eq!(entries[2].index, 0x11);
        assert_eq!(markers.next_table_index, 0x12);
    }

    #[test]
    fn test_empty_dictionary() {
        let markers = lay_out(&mut [], &mut [], 0x201, 0x10);
        assert_eq!(
            markers,
            Markers {
                here: 0x204,
                latest: 0,
                next_table_index: 0x10
            }
        );
    }
}
