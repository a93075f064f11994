//! The link pass: scan, insert, lay out, evaluate, re-serialize.
//!
//! ```text
//! source → scan → [insert] → lay_out → evaluate annotations → rewrite lines → text
//! ```
//!
//! Every failure aborts before any text is produced.

use wafo_expr::{evaluate, parse_annotation, ExprError, Value};
use wafo_types::pack::{pack_escaped, parse_int, unescape_wat, unpack_escaped};
use wafo_types::{DictionaryEntry, SourceFile, StringElement, MAX_NAME_LEN};

use crate::error::{LinkError, LinkResult};
use crate::layout::{lay_out, Markers};
use crate::record::{scan, LineRecord};
use crate::render::{entry_line, render_value, string_line, InsertionSnippet};
use crate::symbols::SymbolTable;

/// Whether to rewrite the source or only verify it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkMode {
    #[default]
    Update,
    /// Verify every annotation and every relaid-out line against the
    /// source; never produces changed text.
    Check,
}

#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub mode: LinkMode,
    /// Name of a new word to insert in sorted position.
    pub add_entry: Option<String>,
    /// First call-table slot handed out to dictionary entries.
    pub first_table_index: u32,
    /// Constant holding the start address of the string area.
    pub base_symbol: String,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            mode: LinkMode::Update,
            add_entry: None,
            first_table_index: 0x10,
            base_symbol: "DATA_SPACE_BASE".to_string(),
        }
    }
}

/// Result of a successful link.
#[derive(Debug, Clone)]
pub struct LinkOutput {
    /// The relaid-out source. In check mode this equals the input.
    pub text: String,
    pub markers: Markers,
    pub strings: Vec<StringElement>,
    pub entries: Vec<DictionaryEntry>,
    /// Source lines defining the inserted word, if one was requested.
    pub inserted: Option<InsertionSnippet>,
}

/// Link the dictionary described by `source`.
pub fn link(source: &SourceFile, options: &LinkOptions) -> LinkResult<LinkOutput> {
    let scanned = scan(source)?;
    let mut strings = scanned.strings;
    let mut entries = scanned.entries;
    let definitions = scanned.definitions;
    let line_records = scanned.lines;

    let entry_lines: Vec<u32> = line_records
        .iter()
        .zip(1u32..)
        .filter(|(record, _)| matches!(record, LineRecord::Entry(_)))
        .map(|(_, number)| number)
        .collect();

    // ── Insertion ────────────────────────────────────────────────────────

    let inserted_at = match &options.add_entry {
        Some(name) => Some(insert_entry(&mut entries, name)?),
        None => None,
    };
    let slot = |file_index: usize| match inserted_at {
        Some(at) if file_index >= at => file_index + 1,
        _ => file_index,
    };

    // ── Layout ───────────────────────────────────────────────────────────

    let base = definitions
        .get(&options.base_symbol)
        .copied()
        .ok_or_else(|| {
            LinkError::format(None, format!("missing definition of {}", options.base_symbol))
        })?;
    let base = u32::try_from(base).map_err(|_| {
        LinkError::format(None, format!("{} is out of range: {base}", options.base_symbol))
    })?;
    let markers = lay_out(&mut strings, &mut entries, base, options.first_table_index);

    // ── Entry annotations ────────────────────────────────────────────────

    for (file_index, &line) in entry_lines.iter().enumerate() {
        let i = slot(file_index);
        let context = entry_context(&entries[i]);
        if let Some(expr) = entries[i].index_expr.clone() {
            let value = {
                let table = SymbolTable::new(&definitions, &strings, &entries);
                eval_annotation(&expr, &table, &context, line)?
            };
            entries[i].index = cell_value(&value).map_err(|source| LinkError::Resolution {
                context: context.clone(),
                expr: expr.clone(),
                source,
            })?;
        }
        if let Some(expr) = entries[i].data_expr.clone() {
            let value = {
                let table = SymbolTable::new(&definitions, &strings, &entries);
                eval_annotation(&expr, &table, &context, line)?
            };
            entries[i].data = Some(match value {
                Value::Str(s) => s,
                Value::Int(n) => pack_escaped(n),
            });
        }
    }

    let inserted = match inserted_at {
        Some(at) => Some(InsertionSnippet::for_entry(&entries[at])?),
        None => None,
    };

    // ── Rewrite ──────────────────────────────────────────────────────────

    let table = SymbolTable::new(&definitions, &strings, &entries);
    let mut out = String::with_capacity(source.source.len());
    for ((number, original), record) in source.lines().zip(&line_records) {
        let context = match record {
            LineRecord::Entry(i) => entry_context(&entries[slot(*i)]),
            _ => format!("line {number}"),
        };

        if options.mode == LinkMode::Check {
            check_annotations(original, &table, &context, number)?;
        }

        // Record lines come from the laid-out model, which already holds the
        // evaluated index and data fields.
        let line = match record {
            LineRecord::String(i) => string_line(&strings[*i]).map_err(|e| with_line(e, number))?,
            LineRecord::Entry(i) => {
                entry_line(&entries[slot(*i)]).map_err(|e| with_line(e, number))?
            }
            LineRecord::Other if options.mode == LinkMode::Check => original.to_string(),
            LineRecord::Other => rewrite_annotations(original, &table, &context, number)?,
        };
        let line = rewrite_markers(&line, &markers, &entries);

        if options.mode == LinkMode::Check && line != original {
            return Err(LinkError::Consistency {
                context,
                expected: line.trim().to_string(),
                found: original.trim().to_string(),
            });
        }
        out.push_str(&line);
        out.push_str(source.line_ending(number));
    }

    let text = match options.mode {
        LinkMode::Update => out,
        LinkMode::Check => source.source.clone(),
    };

    tracing::debug!(
        strings = strings.len(),
        entries = entries.len(),
        here = markers.here,
        "linked {}",
        source.name
    );

    Ok(LinkOutput {
        text,
        markers,
        strings,
        entries,
        inserted,
    })
}

fn insert_entry(entries: &mut Vec<DictionaryEntry>, name: &str) -> LinkResult<usize> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(LinkError::format(
            None,
            format!(
                "cannot add `{name}`: names must be 1 to {MAX_NAME_LEN} bytes, got {}",
                name.len()
            ),
        ));
    }
    let mut entry = DictionaryEntry::new(name.as_bytes());
    entry.code_ref = Some(format!("${name}"));
    let at = entries
        .iter()
        .position(|e| e.name.as_slice() > name.as_bytes())
        .unwrap_or(entries.len());
    tracing::debug!(name, position = at, "inserting entry");
    entries.insert(at, entry);
    Ok(at)
}

fn entry_context(entry: &DictionaryEntry) -> String {
    format!("entry `{}`", entry.name_lossy())
}

fn with_line(err: LinkError, number: u32) -> LinkError {
    match err {
        LinkError::Format { line: None, message } => LinkError::Format {
            line: Some(number),
            message,
        },
        other => other,
    }
}

fn eval_annotation(
    expr: &str,
    table: &SymbolTable<'_>,
    context: &str,
    line: u32,
) -> LinkResult<Value> {
    parse_annotation(expr)
        .and_then(|parsed| evaluate(&parsed, table))
        .map_err(|e| LinkError::from_expr(e, expr, context, line))
}

/// Interpret an annotation value as a 32-bit cell.
fn cell_value(value: &Value) -> Result<u32, ExprError> {
    match value {
        Value::Int(n) => Ok(*n as u32),
        Value::Str(s) => unpack_escaped(s)
            .map_err(|e| ExprError::TypeMismatch(format!("not a packed cell: {e}"))),
    }
}

// ── Annotation sites ─────────────────────────────────────────────────────

/// A `literal (; = expr ;)` pair inside a line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AnnotationSite<'a> {
    /// Byte range of the literal the annotation controls.
    literal: std::ops::Range<usize>,
    expr: &'a str,
}

/// Find every annotated literal, left to right.
fn annotation_sites(line: &str) -> Vec<AnnotationSite<'_>> {
    let mut sites = Vec::new();
    let mut search = 0;
    let mut last_end = 0;
    while let Some(rel) = line[search..].find("(; =") {
        let start = search + rel;
        let body = start + "(; =".len();
        let Some(semi) = line[body..].find(';') else {
            break;
        };
        let end = body + semi;
        search = end + 1;
        if !line[end..].starts_with(";)") || line[body..end].trim().is_empty() {
            continue;
        }
        search = end + 2;

        let before = &line[last_end..start];
        let trimmed = before.trim_end();
        if trimmed.len() == before.len() {
            continue;
        }
        let Some(ws) = trimmed.rfind(char::is_whitespace) else {
            continue;
        };
        let ws_len = trimmed[ws..].chars().next().map_or(1, char::len_utf8);
        let literal_start = last_end + ws + ws_len;
        let literal_end = last_end + trimmed.len();
        sites.push(AnnotationSite {
            literal: literal_start..literal_end,
            expr: line[body..end].trim(),
        });
        last_end = end + 2;
    }
    sites
}

fn rewrite_annotations(
    line: &str,
    table: &SymbolTable<'_>,
    context: &str,
    number: u32,
) -> LinkResult<String> {
    let sites = annotation_sites(line);
    if sites.is_empty() {
        return Ok(line.to_string());
    }
    let mut out = String::with_capacity(line.len());
    let mut copied = 0;
    for site in sites {
        let value = eval_annotation(site.expr, table, context, number)?;
        out.push_str(&line[copied..site.literal.start]);
        out.push_str(&render_literal(&line[site.literal.clone()], &value));
        copied = site.literal.end;
    }
    out.push_str(&line[copied..]);
    Ok(out)
}

fn check_annotations(
    line: &str,
    table: &SymbolTable<'_>,
    context: &str,
    number: u32,
) -> LinkResult<()> {
    for site in annotation_sites(line) {
        let value = eval_annotation(site.expr, table, context, number)?;
        let literal = &line[site.literal.clone()];
        if !literal_matches(literal, &value) {
            return Err(LinkError::Consistency {
                context: format!("{context}, `{}`", site.expr),
                expected: render_literal(literal, &value),
                found: literal.to_string(),
            });
        }
    }
    Ok(())
}

/// Render `value` in place of `literal`. A quoted literal is a packed cell
/// field, so integers go back in as their little-endian escapes.
fn render_literal(literal: &str, value: &Value) -> String {
    match value {
        Value::Int(n) if literal.starts_with('"') => format!("\"{}\"", pack_escaped(*n)),
        _ => render_value(value),
    }
}

/// Compare a source literal with an evaluated value, accepting any spelling
/// of the same number or bytes.
fn literal_matches(literal: &str, value: &Value) -> bool {
    if literal == render_value(value) {
        return true;
    }
    let quoted = literal
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'));
    match (quoted, value) {
        (Some(inner), Value::Str(s)) => {
            matches!((unescape_wat(inner), unescape_wat(s)), (Ok(a), Ok(b)) if a == b)
        }
        (Some(inner), Value::Int(n)) => unpack_escaped(inner).is_ok_and(|cell| cell == *n as u32),
        (None, Value::Int(n)) => parse_int(literal) == Some(*n),
        (None, Value::Str(s)) => match (parse_int(literal), unpack_escaped(s)) {
            (Some(lit), Ok(cell)) => lit as u32 == cell,
            _ => false,
        },
    }
}

// ── Markers, table size and element slots ────────────────────────────────

fn rewrite_markers(line: &str, markers: &Markers, entries: &[DictionaryEntry]) -> String {
    if let Some(updated) = rewrite_global(line, markers) {
        return updated;
    }
    if let Some(updated) = rewrite_table_size(line, markers.next_table_index) {
        return updated;
    }
    if let Some(updated) = rewrite_elem(line, entries) {
        return updated;
    }
    line.to_string()
}

/// `(global $here (mut i32) (i32.const N))`
fn rewrite_global(line: &str, markers: &Markers) -> Option<String> {
    let name_start = line.find("(global ")? + "(global ".len();
    let name_len = line[name_start..].find(char::is_whitespace)?;
    let value = match &line[name_start..name_start + name_len] {
        "$here" => markers.here,
        "$latest" => markers.latest,
        "$nextTableIndex" => markers.next_table_index,
        _ => return None,
    };
    const INIT: &str = " (mut i32) (i32.const ";
    let after_name = name_start + name_len;
    if !line[after_name..].starts_with(INIT) {
        return None;
    }
    let value_start = after_name + INIT.len();
    let value_len = line[value_start..].find(|c: char| c == ')' || c.is_whitespace())?;
    let value_end = value_start + value_len;
    if value_len == 0 || !line[value_end..].starts_with(')') {
        return None;
    }
    Some(format!(
        "{}0x{value:x}{}",
        &line[..value_start],
        &line[value_end..]
    ))
}

/// `(table ... N funcref)`
fn rewrite_table_size(line: &str, size: u32) -> Option<String> {
    let table = line.find("(table ")?;
    let funcref = line.rfind(" funcref)")?;
    let body = &line[table + "(table ".len()..funcref];
    let size_offset = body.rfind(char::is_whitespace).map_or(0, |ws| ws + 1);
    let size_start = table + "(table ".len() + size_offset;
    if size_start >= funcref {
        return None;
    }
    Some(format!("{}0x{size:x}{}", &line[..size_start], &line[funcref..]))
}

/// `(elem (i32.const N) $func)`, pointed at the slot of the entry defined by
/// `$func`. Lines naming no known function are left alone.
fn rewrite_elem(line: &str, entries: &[DictionaryEntry]) -> Option<String> {
    const HEAD: &str = "(elem (i32.const ";
    let start = line.find(HEAD)?;
    let value_start = start + HEAD.len();
    let value_len = line[value_start..].find(')')?;
    if line[value_start..value_start + value_len].contains('(') {
        return None;
    }
    let func_start = value_start + value_len + ") ".len();
    if !line[value_start + value_len..].starts_with(") ") {
        return None;
    }
    let func_len = line[func_start..].find(')')?;
    let func = line[func_start..func_start + func_len].trim();
    let entry = entries
        .iter()
        .find(|e| e.code_ref.as_deref() == Some(func))?;
    Some(format!(
        "{}(elem (i32.const 0x{:x}) {func}){}",
        &line[..start],
        entry.index,
        &line[func_start + func_len + 1..]
    ))
}
