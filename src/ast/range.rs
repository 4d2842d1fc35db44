//! Position and location tracking for source locations
//!
//! This module defines the data structures for representing positions and locations in
//! markup sources, as well as utilities for converting byte offsets to line/column positions.
//!
//! ## Types
//!
//! - [`Position`] - A line:column position in the source
//! - [`Range`] - A source range with start/end positions and byte span
//! - [`SourceLocation`] - Utility for converting byte offsets to positions
//!
//! ## Usage
//!
//! The typical flow is:
//! 1. The tokenizer produces `(Token, std::ops::Range<usize>)` pairs (byte offsets)
//! 2. The reader converts byte ranges to `Range` using `SourceLocation::byte_range_to_ast_range()`
//! 3. Nodes store these `Range` values for error reporting
//!
//! Fragments can be cut out of a larger file. The line offset given to
//! [`SourceLocation::with_line_offset`] is added to every line so that error
//! positions point into the enclosing file.

use std::fmt;
use std::ops::Range as ByteRange;

/// Represents a position in a markup source (line and column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Represents a location in a markup source (start and end positions)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Range {
    pub span: ByteRange<usize>,
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(span: ByteRange<usize>, start: Position, end: Position) -> Self {
        Self { span, start, end }
    }

    /// Build a bounding box that contains all provided ranges.
    pub fn bounding_box<'a, I>(mut ranges: I) -> Option<Range>
    where
        I: Iterator<Item = &'a Range>,
    {
        let first = ranges.next()?.clone();
        let mut span_start = first.span.start;
        let mut span_end = first.span.end;
        let mut start_pos = first.start;
        let mut end_pos = first.end;

        for range in ranges {
            if range.start < start_pos {
                start_pos = range.start;
                span_start = range.span.start;
            }
            if range.end > end_pos {
                end_pos = range.end;
                span_end = range.span.end;
            }
        }

        Some(Range::new(span_start..span_end, start_pos, end_pos))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl Default for Range {
    fn default() -> Self {
        Self::new(
            ByteRange { start: 0, end: 0 },
            Position::default(),
            Position::default(),
        )
    }
}

/// Provides fast conversion from byte offsets to line/column positions
#[derive(Debug, Clone)]
pub struct SourceLocation {
    /// Byte offsets where each line starts
    line_starts: Vec<usize>,
    line_offset: usize,
}

impl SourceLocation {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];

        for (byte_pos, ch) in source.char_indices() {
            if ch == '\n' {
                line_starts.push(byte_pos + 1);
            }
        }

        Self {
            line_starts,
            line_offset: 0,
        }
    }

    pub fn with_line_offset(mut self, line_offset: usize) -> Self {
        self.line_offset = line_offset;
        self
    }

    /// Convert a byte offset to a line/column position
    pub fn byte_to_position(&self, byte_offset: usize) -> Position {
        let line = self
            .line_starts
            .binary_search(&byte_offset)
            .unwrap_or_else(|i| i - 1);

        let column = byte_offset - self.line_starts[line];

        Position::new(line + self.line_offset, column)
    }

    /// Convert a byte range to a location
    pub fn byte_range_to_ast_range(&self, range: &ByteRange<usize>) -> Range {
        Range::new(
            range.clone(),
            self.byte_to_position(range.start),
            self.byte_to_position(range.end),
        )
    }

    /// Get the total number of lines in the source
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_comparison() {
        let pos1 = Position::new(1, 5);
        let pos2 = Position::new(1, 5);
        let pos3 = Position::new(2, 3);

        assert_eq!(pos1, pos2);
        assert_ne!(pos1, pos3);
        assert!(pos1 < pos3);
    }

    #[test]
    fn test_range_display() {
        let range = Range::new(0..7, Position::new(0, 0), Position::new(1, 2));
        assert_eq!(range.to_string(), "0:0..1:2");
    }

    #[test]
    fn test_bounding_box() {
        let a = Range::new(4..9, Position::new(0, 4), Position::new(0, 9));
        let b = Range::new(12..20, Position::new(1, 2), Position::new(1, 10));
        let bbox = Range::bounding_box([b.clone(), a.clone()].iter()).unwrap();
        assert_eq!(bbox.span, 4..20);
        assert_eq!(bbox.start, a.start);
        assert_eq!(bbox.end, b.end);
        assert!(Range::bounding_box(std::iter::empty()).is_none());
    }

    #[test]
    fn test_byte_to_position() {
        let loc = SourceLocation::new("hello\nworld\n\nend");
        assert_eq!(loc.line_count(), 4);
        assert_eq!(loc.byte_to_position(0), Position::new(0, 0));
        assert_eq!(loc.byte_to_position(7), Position::new(1, 1));
        assert_eq!(loc.byte_to_position(12), Position::new(2, 0));
        assert_eq!(loc.byte_to_position(14), Position::new(3, 1));
    }

    #[test]
    fn test_line_offset() {
        let loc = SourceLocation::new("a\nb").with_line_offset(10);
        assert_eq!(loc.byte_to_position(2), Position::new(11, 0));
        let range = loc.byte_range_to_ast_range(&(0..3));
        assert_eq!(range.start, Position::new(10, 0));
        assert_eq!(range.end, Position::new(11, 1));
    }

    #[test]
    fn test_multibyte_columns_are_bytes() {
        let loc = SourceLocation::new("é\nx");
        assert_eq!(loc.byte_to_position(3), Position::new(1, 0));
    }
}
