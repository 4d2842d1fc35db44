//! Error types for parsing, construction and rendering

use crate::ast::{Node, Position, Range};

/// Every failure the engine reports.
///
/// Parse and construction errors are fatal to the fragment being built. Resolution and
/// render errors abort the render of the current document. Configuration errors happen
/// before any rendering starts.
#[derive(Debug, thiserror::Error)]
pub enum FlmError {
    /// Structural problem in the markup (unbalanced braces, unknown macro, ...)
    #[error("{message}{}", located(.position))]
    Parse {
        message: String,
        position: Option<Position>,
    },

    /// Well-formed markup that breaks a construct's rules (bad label prefix, ...)
    #[error("{message}{}", located(.position))]
    Construction {
        message: String,
        position: Option<Position>,
    },

    /// Unresolved reference or citation, duplicate label, missing feature
    #[error("{message}{}", located(.position))]
    Resolution {
        message: String,
        position: Option<Position>,
    },

    /// Unknown or duplicate feature, invalid option, dependency cycle
    #[error("{message}")]
    Configuration { message: String },

    /// Renderer contract violation
    #[error("{message}{}", located(.position))]
    Render {
        message: String,
        position: Option<Position>,
    },

    #[error("Failed to load configuration: {0}")]
    ConfigLoad(#[from] flm_config::ConfigError),
}

fn located(position: &Option<Position>) -> String {
    match position {
        Some(pos) => format!(" @ {}", pos),
        None => String::new(),
    }
}

impl FlmError {
    pub fn parse(message: impl Into<String>, position: Position) -> Self {
        FlmError::Parse {
            message: message.into(),
            position: Some(position),
        }
    }

    pub fn construction(message: impl Into<String>, position: Option<Position>) -> Self {
        FlmError::Construction {
            message: message.into(),
            position,
        }
    }

    /// Construction error pointing at a node.
    pub fn at_node(message: impl Into<String>, node: &Node) -> Self {
        Self::construction(message, Some(node.range().start))
    }

    pub fn resolution(message: impl Into<String>, position: Option<Position>) -> Self {
        FlmError::Resolution {
            message: message.into(),
            position,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        FlmError::Configuration {
            message: message.into(),
        }
    }

    pub fn render(message: impl Into<String>) -> Self {
        FlmError::Render {
            message: message.into(),
            position: None,
        }
    }

    pub fn position(&self) -> Option<Position> {
        match self {
            FlmError::Parse { position, .. }
            | FlmError::Construction { position, .. }
            | FlmError::Resolution { position, .. }
            | FlmError::Render { position, .. } => *position,
            FlmError::Configuration { .. } | FlmError::ConfigLoad(_) => None,
        }
    }

    /// Attach a position unless the error already carries one.
    pub fn or_at(self, pos: Position) -> Self {
        match self {
            FlmError::Parse { message, position } => FlmError::Parse {
                message,
                position: position.or(Some(pos)),
            },
            FlmError::Construction { message, position } => FlmError::Construction {
                message,
                position: position.or(Some(pos)),
            },
            FlmError::Resolution { message, position } => FlmError::Resolution {
                message,
                position: position.or(Some(pos)),
            },
            FlmError::Render { message, position } => FlmError::Render {
                message,
                position: position.or(Some(pos)),
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, FlmError>;

/// Format source context around an error location
///
/// Shows 2 lines before the error, the error line with >> marker, and 2 lines after.
/// All lines are numbered for easy reference. `line_offset` is the line of the
/// source's first line within its enclosing file.
pub fn format_source_context(source: &str, range: &Range, line_offset: usize) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let error_line = range.start.line.saturating_sub(line_offset);

    let start_line = error_line.saturating_sub(2);
    let end_line = (error_line + 3).min(lines.len());

    let mut context = String::new();

    for line_num in start_line..end_line {
        let marker = if line_num == error_line { ">>" } else { "  " };
        let display_line_num = line_num + line_offset + 1;
        context.push_str(&format!(
            "{} {:3} | {}\n",
            marker, display_line_num, lines[line_num]
        ));
    }

    context
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_position() {
        let err = FlmError::parse("Unknown macro ‘\\foo’", Position::new(2, 4));
        assert_eq!(err.to_string(), "Unknown macro ‘\\foo’ @ 2:4");
        assert_eq!(err.position(), Some(Position::new(2, 4)));

        let err = FlmError::configuration("Duplicate feature detected: ‘refs’");
        assert_eq!(err.to_string(), "Duplicate feature detected: ‘refs’");
        assert_eq!(err.position(), None);
    }

    #[test]
    fn test_or_at_keeps_existing_position() {
        let err = FlmError::resolution("missing", None).or_at(Position::new(1, 1));
        assert_eq!(err.position(), Some(Position::new(1, 1)));
        let err = err.or_at(Position::new(5, 5));
        assert_eq!(err.position(), Some(Position::new(1, 1)));
    }

    #[test]
    fn test_format_source_context() {
        let source = "line 1\nline 2\nline 3\nerror line\nline 5\nline 6\nline 7";
        let range = Range::new(20..30, Position::new(3, 0), Position::new(3, 10));

        let context = format_source_context(source, &range, 0);

        assert!(context.contains("line 2"));
        assert!(context.contains(">>   4 | error line"));
        assert!(context.contains("line 5"));
        assert!(!context.contains("line 1"));
        assert!(!context.contains("line 7"));
    }

    #[test]
    fn test_format_source_context_with_offset() {
        let source = "first\nsecond";
        let range = Range::new(6..12, Position::new(11, 0), Position::new(11, 6));
        let context = format_source_context(source, &range, 10);
        assert!(context.contains(">>  12 | second"));
        assert!(context.contains("   11 | first"));
    }
}
