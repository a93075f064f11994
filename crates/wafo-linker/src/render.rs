//! Serialization of records and annotation values back to WAT text.

use std::fmt;

use serde::Serialize;
use wafo_expr::Value;
use wafo_types::pack::{escape_wat, pack_escaped, padded_name_len, to_hex};
use wafo_types::{DictionaryEntry, Flags, StringElement, MAX_NAME_LEN};

use crate::error::{LinkError, LinkResult};
use crate::layout::{LayoutState, Markers};

/// Render a dictionary entry as its data line.
pub fn entry_line(entry: &DictionaryEntry) -> LinkResult<String> {
    check_name(&entry.name)?;

    let mut padded = entry.name.clone();
    padded.resize(padded_name_len(entry.name.len()), b' ');

    let mut line = format!(
        "  (data (i32.const 0x{:x}) \"{}\" \"\\{:02x}\"",
        entry.offset,
        pack_escaped(i64::from(entry.prev)),
        entry.flags_len_byte()
    );
    if !entry.flags.is_empty() {
        line.push_str(&format!(" (; {} ;)", entry.flags.labels().join(" & ")));
    }
    line.push_str(&format!(
        " \"{}\" \"{}\"",
        escape_wat(&padded),
        pack_escaped(i64::from(entry.index))
    ));
    if let Some(expr) = &entry.index_expr {
        line.push_str(&format!(" (; = {expr} ;)"));
    }
    if let Some(data) = &entry.data {
        line.push_str(&format!(" \"{data}\""));
        if let Some(expr) = &entry.data_expr {
            line.push_str(&format!(" (; = {expr} ;)"));
        }
    }
    line.push(')');
    Ok(line)
}

/// Render a counted string as its data line.
pub fn string_line(string: &StringElement) -> LinkResult<String> {
    let len = u8::try_from(string.string.len()).map_err(|_| {
        LinkError::format(
            None,
            format!(
                "string constant is {} bytes, longer than a length byte allows",
                string.string.len()
            ),
        )
    })?;
    Ok(format!(
        "  (data (i32.const 0x{:x}) \"\\{len:02x}\" \"{}\")",
        string.offset,
        escape_wat(&string.string)
    ))
}

/// Render an evaluated annotation the way it is written before the
/// annotation: strings quoted, numbers in hex.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Int(n) => to_hex(*n),
        Value::Str(s) => format!("\"{s}\""),
    }
}

fn check_name(name: &[u8]) -> LinkResult<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(LinkError::format(
            None,
            format!(
                "name `{}` is {} bytes, the limit is {MAX_NAME_LEN}",
                String::from_utf8_lossy(name),
                name.len()
            ),
        ));
    }
    Ok(())
}

// ── Insertion snippet ────────────────────────────────────────────────────

/// The lines that define a newly inserted word in the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertionSnippet {
    pub func_stub: String,
    pub data_line: String,
    pub elem_line: String,
}

impl InsertionSnippet {
    pub(crate) fn for_entry(entry: &DictionaryEntry) -> LinkResult<Self> {
        let func = entry
            .code_ref
            .clone()
            .unwrap_or_else(|| format!("${}", entry.name_lossy()));
        Ok(Self {
            func_stub: format!("  (func {func} (param $tos i32) (result i32))"),
            data_line: entry_line(entry)?,
            elem_line: format!("  (elem (i32.const 0x{:x}) {func})", entry.index),
        })
    }
}

impl fmt::Display for InsertionSnippet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.func_stub)?;
        writeln!(f, "{}", self.data_line)?;
        write!(f, "{}", self.elem_line)
    }
}

// ── Standalone entry generator ───────────────────────────────────────────

/// Everything needed to place one entry without a source file.
#[derive(Debug, Clone)]
pub struct EntrySpec {
    /// Defining function, e.g. `$foo`.
    pub func: String,
    pub name: String,
    pub flags: Flags,
    pub latest: u32,
    pub here: u32,
    pub index: u32,
}

/// Output of [`render_entry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedEntry {
    pub data_line: String,
    pub elem_line: String,
    /// Markers after the entry has been added.
    pub markers: Markers,
}

impl fmt::Display for GeneratedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.data_line)?;
        writeln!(f, "{}", self.elem_line)?;
        writeln!(f, "latest: 0x{:x}", self.markers.latest)?;
        writeln!(f, "here: 0x{:x}", self.markers.here)?;
        write!(f, "!nextTableIndex: 0x{:x}", self.markers.next_table_index)
    }
}

/// Render the data and elem lines for one entry appended at `here`.
pub fn render_entry(spec: &EntrySpec) -> LinkResult<GeneratedEntry> {
    let mut entry = DictionaryEntry::new(spec.name.as_bytes());
    entry.flags = spec.flags;
    entry.code_ref = Some(spec.func.clone());

    let mut state = LayoutState::new(spec.here, spec.index);
    state.align();
    state.place_entry(&mut entry);
    // Continue the chain from the given head.
    entry.prev = spec.latest;

    let markers = state.markers();
    Ok(GeneratedEntry {
        data_line: entry_line(&entry)?,
        elem_line: format!("  (elem (i32.const 0x{:x}) {})", entry.index, spec.func),
        markers,
    })
}
