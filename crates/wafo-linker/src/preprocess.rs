//! Source preprocessor.
//!
//! Substitutes named constants with their value, leaving the name behind as
//! an annotation the linker keeps up to date:
//!
//! ```text
//! ;; DATA_SPACE_BASE := 0x200
//! (i32.const DATA_SPACE_BASE)   →   (i32.const 0x200 (; = DATA_SPACE_BASE ;))
//! ```
//!
//! With bulk memory enabled, calls to the `$memcopy`/`$memset` helpers are
//! lowered to `memory.copy`/`memory.fill` and the helper definitions are
//! dropped.

use crate::record::definition_parts;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreprocessOptions {
    /// Lower the memory helpers to bulk-memory instructions.
    pub bulk_memory: bool,
}

/// Preprocess `source`. Lines are processed in order; a constant applies
/// from the line after its definition.
pub fn preprocess(source: &str, options: &PreprocessOptions) -> String {
    let mut definitions: Vec<(String, String)> = Vec::new();
    let mut skipper = DefinitionSkipper::default();
    let mut out = Vec::new();

    for raw in source.split('\n') {
        let mut line = raw.to_string();
        for (name, value) in &definitions {
            line = substitute(&line, name, value);
        }
        if let Some((name, value)) = definition_parts(&line, false) {
            let (name, value) = (name.to_string(), value.to_string());
            match definitions.iter_mut().find(|(n, _)| *n == name) {
                Some(existing) => existing.1 = value,
                None => definitions.push((name, value)),
            }
        }

        if options.bulk_memory {
            line = line
                .replace("(call $memcopy", "(memory.copy")
                .replace("(call $memset", "(memory.fill");
            if skipper.feed(&line) {
                continue;
            }
        }
        out.push(line);
    }

    tracing::debug!(constants = definitions.len(), "preprocessed");
    out.join("\n")
}

/// Replace every whitespace-delimited occurrence of `name` (ending at
/// whitespace, `)` or end of line) with `value (; = name ;)`.
fn substitute(line: &str, name: &str, value: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut copied = 0;
    let mut search = 0;
    while let Some(rel) = line[search..].find(name) {
        let start = search + rel;
        let end = start + name.len();
        search = end;
        let preceded = line[..start].ends_with(char::is_whitespace);
        let followed = line[end..]
            .chars()
            .next()
            .map_or(true, |c| c.is_whitespace() || c == ')');
        if !preceded || !followed {
            continue;
        }
        out.push_str(&line[copied..start]);
        out.push_str(&format!("{value} (; = {name} ;)"));
        copied = end;
    }
    out.push_str(&line[copied..]);
    out
}

/// Tracks whether the current line belongs to a dropped helper function,
/// by parenthesis depth.
#[derive(Debug, Default)]
struct DefinitionSkipper {
    skipping: bool,
    depth: i64,
}

impl DefinitionSkipper {
    /// `true` if `line` is part of a dropped definition.
    fn feed(&mut self, line: &str) -> bool {
        if line.contains("(func $memset") || line.contains("(func $memcopy") {
            self.skipping = true;
            self.depth = 0;
        }
        if !self.skipping {
            return false;
        }
        for c in line.chars() {
            match c {
                '(' => self.depth += 1,
                ')' => self.depth -= 1,
                _ => {}
            }
        }
        if self.depth <= 0 {
            self.skipping = false;
        }
        true
    }
}
