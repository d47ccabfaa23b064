use super::ast::Span;

/// A compilation error with source location.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct CompileError {
    pub message: String,
    pub span: Span,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lexer,
    Parser,
    /// Name resolution: undeclared names, const reassignment, namespace misuse.
    Name,
    Compiler,
}

impl CompileError {
    pub fn lexer(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            kind: ErrorKind::Lexer,
        }
    }

    pub fn parser(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            kind: ErrorKind::Parser,
        }
    }

    pub fn name(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            kind: ErrorKind::Name,
        }
    }

    pub fn compiler(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            kind: ErrorKind::Compiler,
        }
    }

    /// Format the error with source context.
    pub fn format_with_source(&self, source: &str) -> String {
        let (line, col) = offset_to_line_col(source, self.span.start);
        format!(
            "[{}] line {}:{}: {}",
            match self.kind {
                ErrorKind::Lexer => "lexer",
                ErrorKind::Parser => "parser",
                ErrorKind::Name => "name",
                ErrorKind::Compiler => "compiler",
            },
            line,
            col,
            self.message,
        )
    }
}

/// Render a list of diagnostics, one per line, against the source text.
pub fn format_all(errors: &[CompileError], source: &str) -> String {
    errors
        .iter()
        .map(|e| e.format_with_source(source))
        .collect::<Vec<_>>()
        .join("\n")
}

fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_line_and_column() {
        let src = "let a = 1;\nlet b = ?;";
        let err = CompileError::parser("Unexpected token: Question", Span::new(19, 20));
        assert_eq!(
            err.format_with_source(src),
            "[parser] line 2:9: Unexpected token: Question"
        );
    }

    #[test]
    fn format_all_joins_lines() {
        let src = "a\nb";
        let errs = vec![
            CompileError::name("`a` is not defined", Span::new(0, 1)),
            CompileError::name("`b` is not defined", Span::new(2, 3)),
        ];
        assert_eq!(
            format_all(&errs, src),
            "[name] line 1:1: `a` is not defined\n[name] line 2:1: `b` is not defined"
        );
    }
}
