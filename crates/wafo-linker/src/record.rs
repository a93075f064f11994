//! Source scanner: finds the dictionary records, the constant definitions
//! and the enclosing function of every record in the core's WAT text.
//!
//! Recognised line shapes:
//!
//! ```text
//! ;; NAME := 0x1234
//! (func $name ...
//! (data (i32.const ADDR) "\LL" "bytes")
//! (data (i32.const ADDR) "PREV" "\FL" [(; flags ;)] "NAME" "INDEX" [(; = expr ;)] ["DATA" [(; = expr ;)]])
//! ```
//!
//! A data line whose offset carries an annotation,
//! `(data (i32.const 0x1000 (; = BASE ;)) ...)`, is a fixed segment: it is
//! not a dictionary record and is never relocated.

use std::collections::HashMap;

use wafo_types::pack::{padded_name_len, parse_int, unescape_wat, unpack_escaped};
use wafo_types::{DictionaryEntry, Flags, SourceFile, StringElement};

use crate::error::{LinkError, LinkResult};

/// A dictionary record found on a data line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataRecord {
    String(StringElement),
    Entry(DictionaryEntry),
}

/// What a source line holds, as far as the linker cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRecord {
    Other,
    /// Index into [`ScannedSource::strings`].
    String(usize),
    /// Index into [`ScannedSource::entries`].
    Entry(usize),
}

/// Everything the linker needs from one pass over the source.
#[derive(Debug, Clone, Default)]
pub struct ScannedSource {
    pub strings: Vec<StringElement>,
    pub entries: Vec<DictionaryEntry>,
    pub definitions: HashMap<String, i64>,
    /// One slot per source line, in order.
    pub lines: Vec<LineRecord>,
}

/// Scan the whole source in file order.
pub fn scan(source: &SourceFile) -> LinkResult<ScannedSource> {
    let mut scanned = ScannedSource::default();
    let mut current_func: Option<String> = None;

    for (number, line) in source.lines() {
        if let Some(func) = func_name(line) {
            current_func = Some(func.to_string());
        }

        let record = match scan_data_line(line, number)? {
            Some(DataRecord::String(s)) => {
                scanned.strings.push(s);
                LineRecord::String(scanned.strings.len() - 1)
            }
            Some(DataRecord::Entry(mut entry)) => {
                entry.code_ref = current_func.clone();
                scanned.entries.push(entry);
                LineRecord::Entry(scanned.entries.len() - 1)
            }
            None => LineRecord::Other,
        };
        scanned.lines.push(record);

        if let Some((name, value)) = definition(line, number)? {
            scanned.definitions.insert(name, value);
        }
    }

    tracing::debug!(
        strings = scanned.strings.len(),
        entries = scanned.entries.len(),
        definitions = scanned.definitions.len(),
        "scanned {}",
        source.name
    );
    Ok(scanned)
}

/// The function name opened on this line, if any.
pub fn func_name(line: &str) -> Option<&str> {
    let start = line.find("(func ")? + "(func ".len();
    let rest = &line[start..];
    let end = rest.find(char::is_whitespace)?;
    let name = &rest[..end];
    (!name.is_empty()).then_some(name)
}

/// Parse a `;; NAME := value` definition.
pub fn definition(line: &str, number: u32) -> LinkResult<Option<(String, i64)>> {
    let Some((name, value)) = definition_parts(line, true) else {
        return Ok(None);
    };
    let parsed = parse_int(value)
        .ok_or_else(|| LinkError::format(number, format!("unparseable definition: {value}")))?;
    Ok(Some((name.to_string(), parsed)))
}

/// Split a definition line into name and raw value.
///
/// With `indented` set, leading whitespace before `;;` is accepted.
pub(crate) fn definition_parts(line: &str, indented: bool) -> Option<(&str, &str)> {
    let mut c = Cursor::new(line);
    if indented {
        c.skip_ws();
    }
    if !c.eat(";;") || !c.skip_ws() {
        return None;
    }
    let name = c.take_while(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '!');
    if name.is_empty() {
        return None;
    }
    c.skip_ws();
    if !c.eat(":=") {
        return None;
    }
    c.skip_ws();
    let value = c.take_while(|ch| !ch.is_whitespace());
    (!value.is_empty()).then_some((name, value))
}

/// Parse a data line into a record.
///
/// Returns `Ok(None)` for lines that are not data segments and for fixed
/// segments.
pub fn scan_data_line(line: &str, number: u32) -> LinkResult<Option<DataRecord>> {
    let mut c = Cursor::new(line);
    c.skip_ws();
    if !c.eat("(data") || !c.skip_ws() {
        return Ok(None);
    }
    let err = |message: &str| LinkError::format(number, format!("{message}: {}", line.trim()));

    if !c.eat("(i32.const") {
        return Err(err("data segment without an i32.const offset"));
    }
    c.skip_ws();
    let offset_text = c.take_while(|ch| !ch.is_whitespace() && ch != ')');
    c.skip_ws();
    if c.rest().starts_with("(;") {
        return Ok(None);
    }
    if !c.eat(")") {
        return Err(err("unterminated offset"));
    }
    let offset = parse_int(offset_text)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| err("bad data offset"))?;

    let mut items = Vec::new();
    loop {
        c.skip_ws();
        if c.eat(")") {
            break;
        }
        match c.peek() {
            Some('"') => items.push(Field::Str(c.string().ok_or_else(|| err("unterminated string"))?)),
            Some('(') if c.rest().starts_with("(;") => {
                let text = c.annotation().ok_or_else(|| err("unterminated annotation"))?;
                items.push(match text.strip_prefix('=') {
                    Some(expr) => Field::Expr(expr.trim().to_string()),
                    None => Field::Comment,
                });
            }
            _ => return Err(err("unmatched data section")),
        }
    }

    let record = classify(items, offset).map_err(|message| err(&message))?;
    Ok(Some(record))
}

// ── Record classification ────────────────────────────────────────────────

#[derive(Debug)]
enum Field<'a> {
    Str(&'a str),
    Expr(String),
    Comment,
}

fn classify(items: Vec<Field<'_>>, offset: u32) -> Result<DataRecord, String> {
    let mut it = items.into_iter().peekable();

    let first = next_str(&mut it, "previous entry")?;
    let second = next_str(&mut it, "flags/length")?;
    if it.peek().is_none() && is_length_byte(first) {
        let bytes = unescape_wat(second).map_err(|e| e.to_string())?;
        return Ok(DataRecord::String(StringElement { offset, string: bytes }));
    }

    let prev = unpack_escaped(first).map_err(|e| e.to_string())?;
    let flags_len = unpack_escaped(second).map_err(|e| e.to_string())?;
    let flags_len = u8::try_from(flags_len).map_err(|_| "flags/length field is wider than a byte")?;
    if matches!(it.peek(), Some(Field::Comment)) {
        it.next();
    }
    let padded = unescape_wat(next_str(&mut it, "name")?).map_err(|e| e.to_string())?;
    let index = unpack_escaped(next_str(&mut it, "index")?).map_err(|e| e.to_string())?;

    let len = usize::from(flags_len & wafo_types::dictionary::LENGTH_MASK);
    let width = padded_name_len(len);
    if padded.len() != width || padded[len..].iter().any(|&b| b != b' ') {
        return Err(format!(
            "name field is {} bytes, expected {len} name bytes padded with spaces to {width}",
            padded.len()
        ));
    }

    let mut entry = DictionaryEntry::new(&padded[..len]);
    entry.offset = offset;
    entry.prev = prev;
    entry.flags = Flags::from_byte(flags_len);
    entry.index = index;
    if let Some(Field::Expr(_)) = it.peek() {
        if let Some(Field::Expr(expr)) = it.next() {
            entry.index_expr = Some(expr);
        }
    }
    if let Some(Field::Str(_)) = it.peek() {
        if let Some(Field::Str(data)) = it.next() {
            entry.data = Some(data.to_string());
        }
        if let Some(Field::Expr(_)) = it.peek() {
            if let Some(Field::Expr(expr)) = it.next() {
                entry.data_expr = Some(expr);
            }
        }
    }
    if it.next().is_some() {
        return Err("unexpected trailing field".into());
    }
    Ok(DataRecord::Entry(entry))
}

fn next_str<'a>(
    it: &mut impl Iterator<Item = Field<'a>>,
    what: &str,
) -> Result<&'a str, String> {
    match it.next() {
        Some(Field::Str(s)) => Ok(s),
        _ => Err(format!("expected {what} string")),
    }
}

/// `\LL`: a single escaped byte.
fn is_length_byte(text: &str) -> bool {
    text.len() == 3 && text.starts_with('\\')
}

// ── Cursor ───────────────────────────────────────────────────────────────

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn eat(&mut self, prefix: &str) -> bool {
        if self.rest().starts_with(prefix) {
            self.pos += prefix.len();
            true
        } else {
            false
        }
    }

    /// Skip whitespace; `true` if any was skipped.
    fn skip_ws(&mut self) -> bool {
        let skipped = self.take_while(char::is_whitespace);
        !skipped.is_empty()
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let len = rest.find(|ch| !pred(ch)).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    /// Body of a `"..."` literal, escapes left in place.
    fn string(&mut self) -> Option<&'a str> {
        let rest = self.rest();
        let bytes = rest.as_bytes();
        let mut i = 1;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'"' => {
                    self.pos += i + 1;
                    return Some(&rest[1..i]);
                }
                _ => i += 1,
            }
        }
        None
    }

    /// Text between `(;` and `;)`.
    fn annotation(&mut self) -> Option<&'a str> {
        let rest = self.rest();
        let end = rest.find(";)")?;
        self.pos += end + 2;
        Some(rest[2..end].trim())
    }
}
