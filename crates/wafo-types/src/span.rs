use std::fmt;

/// Byte range inside a single piece of text, such as an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Zero-width span at a single position.
    pub fn point(at: u32) -> Self {
        Self::new(at, at)
    }

    /// Smallest span covering both.
    pub fn merge(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Holds a source file and its line index.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
    /// Cached line start byte offsets.
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            name: name.into(),
            source,
            line_starts,
        }
    }

    /// Extract a source line by 1-based line number, without its line ending.
    pub fn line(&self, line_number: u32) -> Option<&str> {
        let idx = line_number.checked_sub(1)? as usize;
        if idx >= self.line_starts.len() {
            return None;
        }
        let start = self.line_starts[idx];
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&s| s.saturating_sub(1))
            .unwrap_or(self.source.len());
        Some(self.source[start..end].trim_end_matches('\r'))
    }

    /// The terminator that ended a line in the source: `"\r\n"`, `"\n"`, or
    /// empty for the last line.
    pub fn line_ending(&self, line_number: u32) -> &str {
        let Some(line) = self.line(line_number) else {
            return "";
        };
        let idx = line_number as usize - 1;
        let end = self.line_starts[idx] + line.len();
        let next = self
            .line_starts
            .get(idx + 1)
            .copied()
            .unwrap_or(self.source.len());
        &self.source[end..next]
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Iterate `(line_number, line)` pairs, 1-based.
    pub fn lines(&self) -> impl Iterator<Item = (u32, &str)> {
        (1..=self.line_count() as u32).filter_map(move |n| self.line(n).map(|l| (n, l)))
    }
}
