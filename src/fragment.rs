//! Reader for implementor fragment files.
//!
//! The documentation generator emits one script per library per marker:
//!
//! ```text
//! (function() {var implementors = {};
//! implementors["haybale"] = [{text:"impl ..",synthetic:true,types:["haybale::Project"]},];
//!     if (window.register_implementors) { .. } else { .. }
//! })()
//! ```
//!
//! Only the `implementors[..] = [..]` assignments carry data. Their right-hand
//! sides are JavaScript object literals (bare keys, trailing commas), which
//! are normalized to JSON and handed to `serde_json`. Plain JSON payloads
//! (`{"lib": [..]}`) are accepted as-is.

use crate::contribution::MarkerKey;
use anyhow::{Context, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::iter::Peekable;
use std::path::{Component, Path};
use std::str::Chars;
use std::sync::LazyLock;

static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"implementors\[\s*"((?:[^"\\]|\\.)*)"\s*\]\s*=\s*"#)
        .expect("assignment pattern is valid")
});

#[derive(Debug)]
pub enum FragmentError {
    /// Neither JSON nor any `implementors[..] = ..` assignment was found.
    NoAssignments,
    InvalidLibraryName(String),
    /// The literal for `library` never closed its brackets or a string.
    Unterminated { library: String },
    /// A bare word that is neither an object key nor a JSON literal.
    UnsupportedToken { library: String, token: String },
    Json {
        library: Option<String>,
        error: serde_json::Error,
    },
}

/// Parse fragment text into a library-to-records payload.
///
/// Assignment order is preserved. A library assigned twice in one file keeps
/// its first position and its last value, as the script itself would.
pub fn parse_fragment(text: &str) -> Result<Value, FragmentError> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed).map_err(|error| FragmentError::Json {
            library: None,
            error,
        });
    }

    let mut payload = Map::new();
    for captures in ASSIGNMENT.captures_iter(text) {
        let (Some(whole), Some(raw_name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let library = decode_library_name(raw_name.as_str())?;
        let literal = array_literal(&text[whole.end()..]).ok_or_else(|| {
            FragmentError::Unterminated {
                library: library.clone(),
            }
        })?;
        let json = normalize_literal(literal, &library)?;
        let records: Value = serde_json::from_str(&json).map_err(|error| FragmentError::Json {
            library: Some(library.clone()),
            error,
        })?;
        payload.insert(library, records);
    }

    if payload.is_empty() {
        return Err(FragmentError::NoAssignments);
    }
    Ok(Value::Object(payload))
}

/// Read and parse a fragment file.
pub fn load_fragment(path: &Path) -> Result<Value> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading fragment {}", path.display()))?;
    parse_fragment(&text).with_context(|| format!("parsing fragment {}", path.display()))
}

/// Derive the marker a fragment belongs to from its location, e.g.
/// `implementors/core/marker/trait.Unpin.js` becomes `core::marker::Unpin`.
pub fn marker_from_path(path: &Path) -> Option<MarkerKey> {
    let stem = path.file_stem()?.to_str()?;
    let name = stem
        .split_once('.')
        .map(|(_, name)| name)
        .unwrap_or(stem);
    if name.is_empty() {
        return None;
    }

    let components: Vec<&str> = path
        .parent()
        .into_iter()
        .flat_map(Path::components)
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();
    let mut segments: Vec<&str> = components
        .iter()
        .rposition(|part| *part == "implementors")
        .map(|idx| components[idx + 1..].to_vec())
        .unwrap_or_default();
    segments.push(name);
    Some(MarkerKey(segments.join("::")))
}

fn decode_library_name(raw: &str) -> Result<String, FragmentError> {
    let name: String = serde_json::from_str(&format!("\"{raw}\""))
        .map_err(|_| FragmentError::InvalidLibraryName(raw.to_string()))?;
    Ok(name)
}

/// Slice out the bracketed array starting at `rest`, honoring string
/// literals so brackets inside markup do not count.
fn array_literal(rest: &str) -> Option<&str> {
    let start = rest.find(|c: char| !c.is_whitespace())?;
    if !rest[start..].starts_with('[') {
        return None;
    }

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (offset, c) in rest[start..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&rest[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Rewrite a JavaScript array/object literal as JSON.
fn normalize_literal(literal: &str, library: &str) -> Result<String, FragmentError> {
    let unterminated = || FragmentError::Unterminated {
        library: library.to_string(),
    };
    let mut out = String::with_capacity(literal.len() + literal.len() / 8);
    let mut chars = literal.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' => copy_string(&mut chars, c, &mut out).ok_or_else(unterminated)?,
            ',' => {
                if !matches!(next_significant(&chars), Some(']' | '}')) {
                    out.push(',');
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' || next == '$' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if next_significant(&chars) == Some(':') {
                    out.push('"');
                    out.push_str(&word);
                    out.push('"');
                } else if matches!(word.as_str(), "true" | "false" | "null") {
                    out.push_str(&word);
                } else {
                    return Err(FragmentError::UnsupportedToken {
                        library: library.to_string(),
                        token: word,
                    });
                }
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Copy one string literal (opening quote already consumed) as a JSON
/// string. Returns `None` if the literal never closes.
fn copy_string(chars: &mut Peekable<Chars<'_>>, quote: char, out: &mut String) -> Option<()> {
    out.push('"');
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                // JSON has no \' escape.
                '\'' => out.push('\''),
                escaped => {
                    out.push('\\');
                    out.push(escaped);
                }
            },
            '"' if quote == '\'' => out.push_str("\\\""),
            c if c == quote => {
                out.push('"');
                return Some(());
            }
            other => out.push(other),
        }
    }
    None
}

fn next_significant(chars: &Peekable<Chars<'_>>) -> Option<char> {
    chars.clone().find(|c| !c.is_whitespace())
}

impl fmt::Display for FragmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FragmentError::NoAssignments => {
                write!(f, "no implementor assignments or JSON payload found")
            }
            FragmentError::InvalidLibraryName(raw) => {
                write!(f, "invalid library name literal \"{raw}\"")
            }
            FragmentError::Unterminated { library } => {
                write!(f, "implementor list for '{library}' is not terminated")
            }
            FragmentError::UnsupportedToken { library, token } => write!(
                f,
                "implementor list for '{library}' contains unsupported token '{token}'"
            ),
            FragmentError::Json {
                library: Some(library),
                error,
            } => write!(f, "implementor list for '{library}' is not valid JSON ({error})"),
            FragmentError::Json {
                library: None,
                error,
            } => write!(f, "payload is not valid JSON ({error})"),
        }
    }
}

impl std::error::Error for FragmentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FragmentError::Json { error, .. } => Some(error),
            _ => None,
        }
    }
}
