// ── Filename token rendering ─────────────────────────────────────────────────
//
// Patterns mix literal text with `%token%` placeholders:
//
//   %filename%        base name without extension
//   %extension%       extension without the leading dot
//   %date%            local date, YYYYMMDD
//   %time%            local time, HHMMSS
//   %timestamp%       Unix seconds
//   %meta[KEY]%       header field of the staged file (see `extract`)
//
// `%%` is a literal percent. Tokens that cannot be resolved are written back
// verbatim, delimiters included.

use crate::extract;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Filename,
    Extension,
    Date,
    Timestamp,
    Time,
    Meta(String),
    Unknown(String),
}

impl Token {
    pub fn parse(text: &str) -> Self {
        match text {
            "filename" => Token::Filename,
            "extension" => Token::Extension,
            "date" => Token::Date,
            "timestamp" => Token::Timestamp,
            "time" => Token::Time,
            other => match other
                .strip_prefix("meta[")
                .and_then(|rest| rest.strip_suffix(']'))
            {
                Some(key) if !key.is_empty() => Token::Meta(key.to_string()),
                _ => Token::Unknown(other.to_string()),
            },
        }
    }
}

/// Everything a token may resolve against. Built once per render so every
/// time-based token in one pattern shares the same instant.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub now: DateTime<Local>,
    pub source_name: String,
    pub local_path: PathBuf,
}

impl RenderContext {
    pub fn new(source_name: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self::at(Local::now(), source_name, local_path)
    }

    pub fn at(
        now: DateTime<Local>,
        source_name: impl Into<String>,
        local_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            now,
            source_name: source_name.into(),
            local_path: local_path.into(),
        }
    }

    /// `None` means the token falls back to its verbatim text.
    pub fn resolve(&self, token: &Token) -> Option<String> {
        match token {
            Token::Filename => Some(split_extension(&self.source_name).0.to_string()),
            Token::Extension => Some(split_extension(&self.source_name).1.to_string()),
            Token::Date => Some(self.now.format("%Y%m%d").to_string()),
            Token::Time => Some(self.now.format("%H%M%S").to_string()),
            Token::Timestamp => Some(self.now.timestamp().to_string()),
            Token::Meta(key) => extract::extract(key, &self.local_path),
            Token::Unknown(_) => None,
        }
    }

    /// Expand every placeholder in `pattern`.
    pub fn expand(&self, pattern: &str) -> String {
        let mut out = String::with_capacity(pattern.len() + 16);
        let mut rest = pattern;

        while let Some(open) = rest.find('%') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('%') else {
                // Unclosed delimiter.
                out.push_str("%%");
                rest = after;
                continue;
            };
            let text = &after[..close];
            if text.is_empty() {
                out.push('%');
            } else {
                match self.resolve(&Token::parse(text)) {
                    Some(value) => out.push_str(&value.replace('%', "%%")),
                    None => {
                        out.push('%');
                        out.push_str(text);
                        out.push('%');
                    }
                }
            }
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        out
    }
}

/// Render the target name for `source_name`. Without a pattern the source
/// name is returned untouched.
pub fn render(pattern: Option<&str>, source_name: &str, local_path: &Path) -> String {
    match pattern {
        None => source_name.to_string(),
        Some(p) => RenderContext::new(source_name, local_path).expand(p),
    }
}

/// Split at the last `.`; names without a dot have an empty extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) => (&name[..idx], &name[idx + 1..]),
        None => (name, ""),
    }
}
