//! Source location tracking

/// Index of a source file registered in the [`SourceMap`]
pub type FileId = usize;

/// A span represents a range in the source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// Start byte offset
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
    /// 1-based line of the first byte
    pub line: u32,
    /// File ID
    pub file_id: FileId,
}

impl Span {
    /// Create a new span
    pub fn new(start: usize, end: usize, line: u32, file_id: FileId) -> Self {
        Self { start, end, line, file_id }
    }

    /// Create a dummy span (builtins, tests)
    pub fn dummy() -> Self {
        Self { start: 0, end: 0, line: 0, file_id: 0 }
    }

    /// Merge two spans
    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line.min(other.line),
            file_id: self.file_id,
        }
    }

    /// Get the length of the span
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if the span is empty
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::dummy()
    }
}

/// Registry of source file names, indexed by [`FileId`]
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    files: Vec<String>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }

    /// Register a file name and return its id
    pub fn add(&mut self, name: &str) -> FileId {
        self.files.push(name.to_string());
        self.files.len() - 1
    }

    /// Name of a registered file
    pub fn name(&self, id: FileId) -> &str {
        self.files.get(id).map(String::as_str).unwrap_or("<unknown>")
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_first_line() {
        let a = Span::new(10, 14, 3, 0);
        let b = Span::new(2, 6, 1, 0);
        let m = a.merge(&b);
        assert_eq!(m.start, 2);
        assert_eq!(m.end, 14);
        assert_eq!(m.line, 1);
    }

    #[test]
    fn test_source_map_names() {
        let mut map = SourceMap::new();
        let a = map.add("main.vs");
        let b = map.add("lib/math.vs");
        assert_eq!(map.name(a), "main.vs");
        assert_eq!(map.name(b), "lib/math.vs");
        assert_eq!(map.name(42), "<unknown>");
    }
}
