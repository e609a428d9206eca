//! JSONPath-like field locators.
//!
//! Supported syntax: `$.a.b`, `$['a']`, `$.items[0]`, `$.*`, `$.items[*]`.
//! A path without the leading `$` is read relative to the message root.

use serde_json::Value;

use crate::error::ConfigError;
use crate::pipeline::types::Message;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
}

/// A parsed field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self, ConfigError> {
        let fail = |message: &str| ConfigError::InvalidFieldPath {
            path: path.to_string(),
            message: message.to_string(),
        };

        let trimmed = path.trim();
        let body = match trimmed.strip_prefix('$') {
            Some(rest) => rest.to_string(),
            None if trimmed.starts_with('[') => trimmed.to_string(),
            None => format!(".{trimmed}"),
        };

        let chars: Vec<char> = body.chars().collect();
        let mut segments = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '.' => {
                    i += 1;
                    let start = i;
                    while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                        i += 1;
                    }
                    let name: String = chars[start..i].iter().collect();
                    match name.as_str() {
                        "" => return Err(fail("empty segment")),
                        "*" => segments.push(Segment::Wildcard),
                        _ => segments.push(Segment::Key(name)),
                    }
                }
                '[' => {
                    let mut j = i + 1;
                    while j < chars.len() && chars[j].is_whitespace() {
                        j += 1;
                    }

                    // Quoted keys may contain ']'; scan to the closing quote first.
                    let key_end = match chars.get(j) {
                        Some(&q) if q == '\'' || q == '"' => Some(
                            chars[j + 1..]
                                .iter()
                                .position(|c| *c == q)
                                .map(|p| p + j + 1)
                                .ok_or_else(|| fail("unclosed quote"))?,
                        ),
                        _ => None,
                    };

                    let search_from = key_end.map_or(i, |end| end + 1);
                    let close = chars[search_from..]
                        .iter()
                        .position(|c| *c == ']')
                        .map(|p| p + search_from)
                        .ok_or_else(|| fail("unclosed '['"))?;

                    if let Some(end) = key_end {
                        if chars[end + 1..close].iter().any(|c| !c.is_whitespace()) {
                            return Err(fail("unexpected text after quoted key"));
                        }
                        let key: String = chars[j + 1..end].iter().collect();
                        if key.is_empty() {
                            return Err(fail("empty key"));
                        }
                        segments.push(Segment::Key(key));
                    } else {
                        let inner: String = chars[i + 1..close].iter().collect();
                        let inner = inner.trim();
                        if inner == "*" {
                            segments.push(Segment::Wildcard);
                        } else {
                            let index = inner.parse::<usize>().map_err(|_| {
                                fail("bracket must hold an index, '*' or a quoted key")
                            })?;
                            segments.push(Segment::Index(index));
                        }
                    }
                    i = close + 1;
                }
                c => return Err(fail(&format!("unexpected character {c:?}"))),
            }
        }

        if segments.is_empty() {
            return Err(fail("path must name a field"));
        }

        Ok(Self {
            raw: path.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// All values the path selects in `message`. Empty when nothing matches.
    pub fn select<'a>(&self, message: &'a Message) -> Vec<&'a Value> {
        let Some((first, rest)) = self.segments.split_first() else {
            return Vec::new();
        };

        let mut current: Vec<&'a Value> = match first {
            Segment::Key(key) => message.get(key).into_iter().collect(),
            Segment::Wildcard => message.values().collect(),
            Segment::Index(_) => Vec::new(),
        };

        for segment in rest {
            current = current
                .into_iter()
                .flat_map(|value| step(value, segment))
                .collect();
            if current.is_empty() {
                break;
            }
        }
        current
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn step<'a>(value: &'a Value, segment: &Segment) -> Vec<&'a Value> {
    match (segment, value) {
        (Segment::Key(key), Value::Object(obj)) => obj.get(key).into_iter().collect(),
        (Segment::Index(idx), Value::Array(items)) => items.get(*idx).into_iter().collect(),
        (Segment::Wildcard, Value::Object(obj)) => obj.values().collect(),
        (Segment::Wildcard, Value::Array(items)) => items.iter().collect(),
        _ => Vec::new(),
    }
}
