//! Symbol table used to evaluate annotations after layout.

use std::collections::HashMap;

use wafo_expr::Environment;
use wafo_types::{DictionaryEntry, StringElement};

/// Read-only view over the laid-out dictionary and the constants.
///
/// Word lookups resolve to the newest entry with that name, so a later
/// definition shadows an earlier one. Hidden entries still resolve.
pub struct SymbolTable<'a> {
    constants: &'a HashMap<String, i64>,
    strings: &'a [StringElement],
    entries: &'a [DictionaryEntry],
}

impl<'a> SymbolTable<'a> {
    pub fn new(
        constants: &'a HashMap<String, i64>,
        strings: &'a [StringElement],
        entries: &'a [DictionaryEntry],
    ) -> Self {
        Self {
            constants,
            strings,
            entries,
        }
    }

    fn entry(&self, word: &str) -> Option<&'a DictionaryEntry> {
        self.entries.iter().rev().find(|e| e.name == word.as_bytes())
    }
}

impl Environment for SymbolTable<'_> {
    fn constant(&self, name: &str) -> Option<i64> {
        self.constants.get(name).copied()
    }

    fn body(&self, word: &str) -> Option<i64> {
        self.entry(word).map(|e| i64::from(e.body()))
    }

    fn index(&self, word: &str) -> Option<i64> {
        self.entry(word).map(|e| i64::from(e.index))
    }

    fn string_address(&self, text: &str) -> Option<i64> {
        self.strings
            .iter()
            .find(|s| s.string == text.as_bytes())
            .map(|s| i64::from(s.offset))
    }
}
