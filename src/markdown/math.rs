use super::RenderError;
use html_escape::{encode_double_quoted_attribute, encode_text};
use latex2mathml::{DisplayStyle, latex_to_mathml};
use pulldown_cmark::{CowStr, Event};
use std::collections::BTreeMap;

/// How many rounds of macro expansion we allow before assuming a macro
/// refers to itself.
const MAX_EXPANSION_DEPTH: usize = 32;

/// How many macro uses one expression may expand in total. Bounds macros
/// that multiply themselves, which finish few rounds but grow exponentially.
const MAX_EXPANSIONS: usize = 1000;

/// User-defined TeX macros, applied before typesetting.
#[derive(Debug, Clone, Default)]
pub struct Macros {
    defs: BTreeMap<String, String>,
}

impl Macros {
    /// Build from `name -> replacement` pairs. Names may be given with or
    /// without their leading backslash.
    pub fn new<'m>(defs: impl IntoIterator<Item = (&'m String, &'m String)>) -> Self {
        let defs = defs
            .into_iter()
            .map(|(name, body)| {
                let name = if name.starts_with('\\') {
                    name.clone()
                } else {
                    format!("\\{name}")
                };
                (name, body.clone())
            })
            .collect();
        Self { defs }
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Expand macros until none are left.
    pub fn expand(&self, tex: &str) -> Result<String, String> {
        let mut current = tex.to_string();
        if self.is_empty() {
            return Ok(current);
        }
        let mut budget = MAX_EXPANSIONS;
        for _ in 0..MAX_EXPANSION_DEPTH {
            match self.expand_once(&current, &mut budget)? {
                Some(next) => current = next,
                None => return Ok(current),
            }
        }
        Err(format!(
            "macro expansion did not finish after {MAX_EXPANSION_DEPTH} rounds"
        ))
    }

    /// One pass over the input, spending one unit of `budget` per macro use.
    /// Returns `None` if nothing was expanded.
    fn expand_once(&self, tex: &str, budget: &mut usize) -> Result<Option<String>, String> {
        let mut out = String::with_capacity(tex.len());
        let mut changed = false;
        let mut rest = tex;

        while let Some(pos) = rest.find('\\') {
            out.push_str(&rest[..pos]);
            let (name, after) = rest[pos..].split_at(control_sequence_len(&rest[pos..]));
            rest = after;
            match self.defs.get(name) {
                Some(body) => {
                    *budget = budget.checked_sub(1).ok_or_else(|| {
                        format!("too many macro expansions (limit {MAX_EXPANSIONS})")
                    })?;
                    let (args, after_args) = take_args(rest, arity(body));
                    rest = after_args;
                    out.push_str(&substitute(body, &args));
                    changed = true;
                }
                None => out.push_str(name),
            }
        }
        out.push_str(rest);

        Ok(changed.then_some(out))
    }
}

/// The byte length of the control sequence at the start of `s`, which must
/// begin with a backslash: either a run of letters or one other character.
fn control_sequence_len(s: &str) -> usize {
    let tail = &s[1..];
    let letters = tail.bytes().take_while(u8::is_ascii_alphabetic).count();
    if letters > 0 {
        1 + letters
    } else {
        1 + tail.chars().next().map_or(0, char::len_utf8)
    }
}

/// The highest `#n` placeholder in a macro body.
fn arity(body: &str) -> usize {
    let bytes = body.as_bytes();
    bytes
        .windows(2)
        .filter(|w| w[0] == b'#' && w[1].is_ascii_digit() && w[1] != b'0')
        .map(|w| usize::from(w[1] - b'0'))
        .max()
        .unwrap_or(0)
}

/// Take `count` macro arguments from the start of `s`: brace groups, control
/// sequences, or single characters.
fn take_args(mut s: &str, count: usize) -> (Vec<&str>, &str) {
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        s = s.trim_start();
        let (arg, rest) = match s.chars().next() {
            None => ("", s),
            Some('{') => {
                let end = matching_brace(s).unwrap_or(s.len());
                let inner = &s[1..end];
                (inner, s.get(end + 1..).unwrap_or(""))
            }
            Some('\\') => s.split_at(control_sequence_len(s)),
            Some(c) => s.split_at(c.len_utf8()),
        };
        args.push(arg);
        s = rest;
    }
    (args, s)
}

/// The byte index of the brace closing the one that opens `s`.
fn matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => (),
        }
    }
    None
}

fn substitute(body: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '#'
            && let Some(n) = chars.peek().and_then(|d| d.to_digit(10)).filter(|&n| n > 0)
        {
            chars.next();
            out.push_str(args.get(n as usize - 1).copied().unwrap_or(""));
        } else {
            out.push(c);
        }
    }
    out
}

/// Expand macros and convert TeX to MathML.
pub fn typeset(tex: &str, display: bool, macros: &Macros) -> Result<String, String> {
    let expanded = macros.expand(tex)?;
    let style = if display {
        DisplayStyle::Block
    } else {
        DisplayStyle::Inline
    };
    latex_to_mathml(&expanded, style).map_err(|e| e.to_string())
}

/// Visible stand-in for math that couldn't be typeset.
fn error_markup(tex: &str, message: &str) -> String {
    format!(
        "<span class=\"math-error\" title=\"{}\">{}</span>",
        encode_double_quoted_attribute(message),
        encode_text(tex)
    )
}

/// A pulldown-cmark adapter that typesets inline and display math as MathML.
///
/// In strict mode the first bad expression is stored in `error` and the
/// event stream ends there. Otherwise bad expressions are rendered as error
/// markup and rendering carries on.
pub struct TypesetMath<'a, 'm, I>
where
    I: Iterator<Item = Event<'a>>,
{
    iter: I,
    macros: &'m Macros,
    strict: bool,
    error: &'m mut Option<RenderError>,
}

impl<'a, 'm, I> TypesetMath<'a, 'm, I>
where
    I: Iterator<Item = Event<'a>>,
{
    pub fn new(
        iter: I,
        macros: &'m Macros,
        strict: bool,
        error: &'m mut Option<RenderError>,
    ) -> Self {
        Self {
            iter,
            macros,
            strict,
            error,
        }
    }
}

impl<'a, I> Iterator for TypesetMath<'a, '_, I>
where
    I: Iterator<Item = Event<'a>>,
{
    type Item = Event<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.error.is_some() {
            return None;
        }

        let event = self.iter.next()?;
        let (tex, display) = match &event {
            Event::InlineMath(tex) => (tex, false),
            Event::DisplayMath(tex) => (tex, true),
            _ => return Some(event),
        };

        match typeset(tex, display, self.macros) {
            Ok(mathml) => Some(Event::InlineHtml(CowStr::from(mathml))),
            Err(message) if self.strict => {
                *self.error = Some(RenderError::Math {
                    expr: tex.to_string(),
                    message,
                });
                None
            }
            Err(message) => {
                tracing::debug!(expr = %tex, %message, "rendering math error inline");
                Some(Event::InlineHtml(CowStr::from(error_markup(tex, &message))))
            }
        }
    }
}
