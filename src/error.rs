// ─────────────────────────────────────────────────────────────────────────────
//  formulary :: error
// ─────────────────────────────────────────────────────────────────────────────

use std::path::PathBuf;

use colored::Colorize;
use thiserror::Error;

// ── Parse errors ──────────────────────────────────────────────────────────────

/// Every way `scan` / `bind` can refuse to build a tree.
///
/// Offsets are byte offsets into the text handed to the outermost `scan`
/// (or into `raw_args` when `bind` is called directly).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unmatched braces: `{{{{` is never closed")]
    UnmatchedBraces { offset: usize },

    #[error("empty interpolation `{{{{}}}}`")]
    EmptyInterpolation { offset: usize },

    #[error("unknown method `{namespace}.{name}`")]
    UnknownMethod { namespace: String, name: String, offset: usize },

    #[error("unknown keyword argument `{name}`")]
    UnknownKeywordArgument { name: String, offset: usize },

    #[error("keyword argument `{name}` supplied more than once")]
    DuplicateKeywordArgument { name: String, offset: usize },

    #[error("too many positional arguments for `{namespace}.{name}`")]
    TooManyPositionalArguments { namespace: String, name: String, offset: usize },

    #[error("expression nested deeper than {limit} levels")]
    TooDeeplyNested { limit: usize, offset: usize },
}

impl ParseError {
    /// Byte offset where the problem was detected.
    pub fn offset(&self) -> usize {
        match self {
            Self::UnmatchedBraces { offset }
            | Self::EmptyInterpolation { offset }
            | Self::UnknownMethod { offset, .. }
            | Self::UnknownKeywordArgument { offset, .. }
            | Self::DuplicateKeywordArgument { offset, .. }
            | Self::TooManyPositionalArguments { offset, .. }
            | Self::TooDeeplyNested { offset, .. } => *offset,
        }
    }

    /// Stable slug, suitable for machine-readable output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnmatchedBraces { .. }            => "unmatched-braces",
            Self::EmptyInterpolation { .. }         => "empty-interpolation",
            Self::UnknownMethod { .. }              => "unknown-method",
            Self::UnknownKeywordArgument { .. }     => "unknown-keyword-argument",
            Self::DuplicateKeywordArgument { .. }   => "duplicate-keyword-argument",
            Self::TooManyPositionalArguments { .. } => "too-many-positional-arguments",
            Self::TooDeeplyNested { .. }            => "too-deeply-nested",
        }
    }

    /// Render the error with the offending source line and a caret.
    ///
    /// ```text
    /// error: unknown method `foo.bar`
    ///   --> line 1, col 3
    ///    |
    ///  1 | {{foo.bar()}}
    ///    |   ^
    /// ```
    pub fn pretty(&self, source: &str) -> String {
        let (line_no, col, line) = locate(source, self.offset());
        let gutter = " ".repeat(line_no.to_string().len());

        let mut out = String::new();
        out.push_str(&format!("{} {}\n", "error:".red().bold(), self.to_string().bold()));
        out.push_str(&format!("{} {} line {}, col {}\n", gutter, "-->".blue(), line_no, col));
        out.push_str(&format!("{} {}\n", gutter, "|".blue()));
        out.push_str(&format!("{} {} {}\n", line_no.to_string().blue(), "|".blue(), line));
        out.push_str(&format!(
            "{} {} {}{}",
            gutter,
            "|".blue(),
            " ".repeat(col.saturating_sub(1)),
            "^".red().bold(),
        ));
        out
    }
}

/// 1-based line, 1-based column (in chars) and the line's text for `offset`.
fn locate(source: &str, offset: usize) -> (usize, usize, &str) {
    let mut offset = offset.min(source.len());
    while !source.is_char_boundary(offset) {
        offset -= 1;
    }
    let line_start = source[..offset].rfind('\n').map_or(0, |i| i + 1);
    let line_end   = source[offset..].find('\n').map_or(source.len(), |i| offset + i);
    let line_no    = source[..line_start].matches('\n').count() + 1;
    let col        = source[line_start..offset].chars().count() + 1;
    (line_no, col, &source[line_start..line_end])
}

pub type Result<T> = std::result::Result<T, ParseError>;

// ── Catalog errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read {}: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },

    #[error("malformed catalog manifest at {}: {source}", .path.display())]
    Toml { path: PathBuf, source: toml::de::Error },

    #[error("malformed JSON catalog at {}: {source}", .path.display())]
    Json { path: PathBuf, source: serde_json::Error },

    #[error("method `{namespace}.{name}` is declared more than once")]
    DuplicateMethod { namespace: String, name: String },

    #[error("catalog manifest at {} declares an empty namespace prefix", .path.display())]
    EmptyPrefix { path: PathBuf },
}

// ─────────────────────────────────────────────────────────────────────────────
