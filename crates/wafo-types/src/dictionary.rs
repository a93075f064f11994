//! Dictionary record layout.
//!
//! A dictionary entry occupies, starting at a 4-byte aligned address:
//!
//! ```text
//! +0            prev      u32 LE   address of the previous entry, 0 for the first
//! +4            flags|len u8       high 3 bits flags, low 5 bits name length
//! +5            name      len bytes, space-padded so length byte + name fill whole cells
//! +4+N          index     u32 LE   call-table slot
//! +8+N          data      u32 LE   only when the entry carries inline data
//! ```
//!
//! where `N = align4(1 + len(name))`. String constants precede the
//! dictionary as unaligned `[len][bytes]` records.

use std::borrow::Cow;

use crate::pack::align4;

/// Longest name the 5-bit length field can describe.
pub const MAX_NAME_LEN: usize = 0x1f;

/// Mask of the length bits in the flags/length byte.
pub const LENGTH_MASK: u8 = 0x1f;

/// Entry flags, stored in the high bits of the flags/length byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags(u8);

impl Flags {
    /// Invisible to name lookup.
    pub const HIDDEN: Self = Self(0x20);
    /// Entry carries an extra inline data cell.
    pub const DATA: Self = Self(0x40);
    /// Executed instead of compiled during compilation.
    pub const IMMEDIATE: Self = Self(0x80);

    const MASK: u8 = 0xe0;

    /// Extract the flag bits from a flags/length byte.
    pub fn from_byte(byte: u8) -> Self {
        Self(byte & Self::MASK)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Source-level names of the set flags, lowest bit first.
    pub fn labels(self) -> Vec<&'static str> {
        [
            (Self::HIDDEN, "F_HIDDEN"),
            (Self::DATA, "F_DATA"),
            (Self::IMMEDIATE, "F_IMMEDIATE"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, label)| label)
        .collect()
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// A counted string constant in the string area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringElement {
    pub offset: u32,
    pub string: Vec<u8>,
}

impl StringElement {
    pub fn new(string: impl Into<Vec<u8>>) -> Self {
        Self {
            offset: 0,
            string: string.into(),
        }
    }

    /// Bytes occupied: one length byte plus the string.
    pub fn size(&self) -> u32 {
        1 + self.string.len() as u32
    }
}

/// One dictionary node as described by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryEntry {
    pub offset: u32,
    pub prev: u32,
    pub flags: Flags,
    pub name: Vec<u8>,
    pub index: u32,
    /// Annotation keeping `index` in sync with a computed value.
    pub index_expr: Option<String>,
    /// Inline data cell, as written in the source (still escaped).
    pub data: Option<String>,
    pub data_expr: Option<String>,
    /// The function that defines this word's code, e.g. `$dup`.
    pub code_ref: Option<String>,
}

impl DictionaryEntry {
    /// A fresh entry with no layout assigned yet.
    pub fn new(name: impl Into<Vec<u8>>) -> Self {
        Self {
            offset: 0,
            prev: 0,
            flags: Flags::default(),
            name: name.into(),
            index: 0,
            index_expr: None,
            data: None,
            data_expr: None,
            code_ref: None,
        }
    }

    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    /// The flags/length byte as stored in memory.
    pub fn flags_len_byte(&self) -> u8 {
        self.flags.bits() | (self.name.len() as u8 & LENGTH_MASK)
    }

    /// Size of the `prev` cell plus the length byte and padded name.
    pub fn header_size(&self) -> u32 {
        4 + align4(1 + self.name.len() as u32)
    }

    /// Total bytes occupied by this entry.
    pub fn size(&self) -> u32 {
        self.header_size() + 4 + if self.data.is_some() { 4 } else { 0 }
    }

    /// Address just past the header, skipping the inline data cell of
    /// `F_DATA` entries.
    pub fn body(&self) -> u32 {
        self.offset
            + self.header_size()
            + if self.flags.contains(Flags::DATA) { 4 } else { 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_from_byte() {
        let f = Flags::from_byte(0xc5);
        assert!(f.contains(Flags::DATA));
        assert!(f.contains(Flags::IMMEDIATE));
        assert!(!f.contains(Flags::HIDDEN));
        assert_eq!(f.labels(), vec!["F_DATA", "F_IMMEDIATE"]);
    }

    #[test]
    fn test_entry_size() {
        let mut e = DictionaryEntry::new("DUP");
        assert_eq!(e.header_size(), 8);
        assert_eq!(e.size(), 12);
        e.name = b"OVER".to_vec();
        assert_eq!(e.size(), 16);
        e.data = Some("\\00\\00\\00\\00".into());
        assert_eq!(e.size(), 20);
    }

    #[test]
    fn test_body_accounts_for_data_flag() {
        let mut e = DictionaryEntry::new("X");
        e.offset = 0x100;
        assert_eq!(e.body(), 0x108);
        e.flags = Flags::DATA;
        assert_eq!(e.body(), 0x10c);
    }

    #[test]
    fn test_flags_len_byte() {
        let mut e = DictionaryEntry::new("ABC");
        e.flags = Flags::IMMEDIATE | Flags::HIDDEN;
        assert_eq!(e.flags_len_byte(), 0xa3);
    }
}
