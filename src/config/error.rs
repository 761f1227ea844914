//! Parse-time errors for the configuration language (spec §4.1, §7).

use std::fmt;

/// A parse failure, carrying enough context to render a caret diagnostic.
///
/// Mirrors the original implementation's `ParseError.__str__`: the message,
/// the 1-based line/column of the offending token, the raw line text, and
/// the token value (if any) that triggered the failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub col: usize,
    pub line_text: String,
    pub token: Option<String>,
    pub msg: String,
}

impl ParseError {
    pub fn new(
        line: usize,
        col: usize,
        line_text: impl Into<String>,
        token: Option<String>,
        msg: impl Into<String>,
    ) -> Self {
        ParseError {
            line,
            col,
            line_text: line_text.into(),
            token,
            msg: msg.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token_str = match &self.token {
            Some(t) => format!("token {t}"),
            None => String::new(),
        };
        writeln!(f, "{}", self.msg)?;
        writeln!(f)?;
        writeln!(f, "line {} col {} {}", self.line, self.col, token_str)?;
        writeln!(f, "{}", self.line_text)?;

        let ntabs = self.line_text.matches('\t').count();
        let spaces = self.col.saturating_sub(ntabs).saturating_sub(1);
        let caret = " ".repeat(spaces) + &"\t".repeat(ntabs) + "^";
        write!(f, "{caret}")
    }
}

impl std::error::Error for ParseError {}
