//! The metadata block at the top of a document.
//!
//! The block is a small YAML-like language delimited by `---` lines:
//!
//! ```text
//! ---
//! title: Report
//! author: "Ada"
//! numbered_headings: false
//! abstract: |
//!   First line
//!   second line
//! macros:
//!   \R: \mathbb{R}
//! ---
//! ```
//!
//! Nothing in here is fatal. Problems are collected as diagnostics and the
//! parser keeps going with whatever it could make sense of.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

const DELIMITER: &str = "---";

static FIELD_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z0-9_-]+)\s*:\s*(.*)$").unwrap());
static MACRO_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([^:]+)\s*:\s*(.*)$").unwrap());

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Frontmatter {
    /// The document text following the metadata block.
    pub body: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub date: Option<String>,
    pub abstract_text: Option<String>,
    pub macros: BTreeMap<String, String>,
    pub numbered_headings: Option<bool>,
    pub toc: Option<bool>,
    pub errors: Vec<String>,
}

/// What the parser does with the next indented line.
#[derive(Debug)]
enum Mode {
    Fields,
    Abstract(Vec<String>),
    Macros,
}

/// Split the metadata block off the front of a document and parse it.
pub fn parse(source: &str) -> Frontmatter {
    let lines: Vec<&str> = source
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();

    let mut fm = Frontmatter::default();
    if lines[0] != DELIMITER {
        fm.body = source.to_string();
        return fm;
    }

    let Some(end) = lines.iter().skip(1).position(|l| *l == DELIMITER) else {
        fm.errors
            .push("Frontmatter block is missing closing '---'.".to_string());
        fm.body = source.to_string();
        return fm;
    };
    let end = end + 1;

    let mut mode = Mode::Fields;
    for &line in &lines[1..end] {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        // An unindented line ends any block and is then read as a field.
        if !matches!(mode, Mode::Fields) && !is_indented(line) {
            fm.finish_block(std::mem::replace(&mut mode, Mode::Fields));
        }

        let opened = match &mut mode {
            Mode::Abstract(collected) => {
                collected.push(line.trim_start().to_string());
                None
            }
            Mode::Macros => {
                fm.macro_line(line);
                None
            }
            Mode::Fields => fm.field_line(line),
        };
        if let Some(next) = opened {
            mode = next;
        }
    }
    fm.finish_block(mode);

    fm.body = lines[end + 1..].join("\n");
    fm
}

impl Frontmatter {
    /// Handle a top-level `key: value` line, returning the block mode it
    /// opens, if any.
    fn field_line(&mut self, line: &str) -> Option<Mode> {
        let Some(caps) = FIELD_LINE.captures(line) else {
            self.errors.push(format!("Invalid frontmatter line: {line}"));
            return None;
        };
        let key = &caps[1];
        let value = caps[2].trim();

        match key {
            "title" => set_string(&mut self.title, key, value, &mut self.errors),
            "author" => set_string(&mut self.author, key, value, &mut self.errors),
            "date" => set_string(&mut self.date, key, value, &mut self.errors),
            "numbered_headings" => {
                set_bool(&mut self.numbered_headings, key, value, &mut self.errors)
            }
            "toc" => set_bool(&mut self.toc, key, value, &mut self.errors),
            "abstract" => {
                if self.abstract_text.is_some() {
                    self.errors
                        .push("Duplicate frontmatter field: abstract".to_string());
                } else if !value.is_empty() && !is_block_indicator(value) {
                    self.abstract_text = Some(strip_quotes(value).to_string());
                } else {
                    return Some(Mode::Abstract(Vec::new()));
                }
            }
            "macros" => {
                if value.is_empty() || value == "{}" {
                    return Some(Mode::Macros);
                }
                self.errors
                    .push("Frontmatter macros must be a mapping block.".to_string());
            }
            _ => self.errors.push(format!("Unknown frontmatter field: {key}")),
        }
        None
    }

    /// Handle an indented line inside a `macros:` block.
    fn macro_line(&mut self, line: &str) {
        let Some(caps) = MACRO_LINE.captures(line) else {
            self.errors
                .push(format!("Invalid frontmatter macros line: {line}"));
            return;
        };
        let key = strip_quotes(caps[1].trim());
        let value = strip_quotes(caps[2].trim());

        if key.is_empty() {
            self.errors
                .push("Frontmatter macros key cannot be empty.".to_string());
        } else if value.is_empty() {
            self.errors
                .push(format!("Frontmatter macros value cannot be empty for \"{key}\"."));
        } else if self.macros.contains_key(key) {
            self.errors.push(format!("Duplicate frontmatter macro: {key}"));
        } else {
            self.macros.insert(key.to_string(), value.to_string());
        }
    }

    /// Close out a block mode, either on dedent or at the end of the
    /// frontmatter.
    fn finish_block(&mut self, mode: Mode) {
        if let Mode::Abstract(collected) = mode {
            let text = collected.join("\n").trim_end().to_string();
            if text.is_empty() {
                self.errors
                    .push("Frontmatter abstract cannot be empty.".to_string());
            }
            self.abstract_text = Some(text);
        }
    }
}

fn is_indented(line: &str) -> bool {
    line.starts_with(char::is_whitespace)
}

fn is_block_indicator(value: &str) -> bool {
    matches!(value.trim(), "|" | "|-" | "|+" | ">" | ">-")
}

/// Remove one pair of matching surrounding quotes, if present.
fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2
            && let Some(inner) = value
                .strip_prefix(quote)
                .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

fn set_string(slot: &mut Option<String>, key: &str, value: &str, errors: &mut Vec<String>) {
    let value = strip_quotes(value).trim();
    if slot.is_some() {
        errors.push(format!("Duplicate frontmatter field: {key}"));
    } else if value.is_empty() {
        errors.push(format!("Frontmatter {key} cannot be empty."));
    } else {
        *slot = Some(value.to_string());
    }
}

fn set_bool(slot: &mut Option<bool>, key: &str, value: &str, errors: &mut Vec<String>) {
    if slot.is_some() {
        errors.push(format!("Duplicate frontmatter field: {key}"));
        return;
    }
    if value.is_empty() {
        errors.push(format!("Frontmatter {key} cannot be empty."));
        return;
    }
    match strip_quotes(value).trim().to_lowercase().as_str() {
        "true" => *slot = Some(true),
        "false" => *slot = Some(false),
        _ => errors.push(format!("Invalid frontmatter {key} value: {value}")),
    }
}
