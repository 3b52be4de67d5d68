use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

static CODE_SPAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]+)`").unwrap());
static IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").unwrap());
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap());
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[*_~]").unwrap());
static ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\([\\`*_{}\[\]()#+\-.!])").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// The slug used for headings whose text has nothing slug-worthy in it.
const FALLBACK_SLUG: &str = "section";

/// Remove inline Markdown syntax from heading text, leaving (roughly) the
/// text a reader would see.
pub fn strip_markdown(text: &str) -> String {
    let text = CODE_SPAN.replace_all(text, "$1");
    let text = IMAGE.replace_all(&text, "$1");
    let text = LINK.replace_all(&text, "$1");
    let text = HTML_TAG.replace_all(&text, "");
    let text = EMPHASIS.replace_all(&text, "");
    ESCAPE.replace_all(&text, "$1").into_owned()
}

/// Normalize heading text to a base slug, without any collision suffix.
fn base_slug(text: &str) -> String {
    let lower = strip_markdown(text).to_lowercase();
    let kept: String = lower
        .trim()
        .chars()
        .filter(|&c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || c == '_' || c == '-'
        })
        .collect();
    let slug = WHITESPACE.replace_all(&kept, "-");
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug.into_owned()
    }
}

/// Generates unique slugs for the headings of one document.
///
/// The first heading with a given base slug gets it unchanged; the Nth repeat
/// gets `-N` appended. One `Slugger` must be shared by every heading in the
/// document, whatever its level.
#[derive(Debug, Default)]
pub struct Slugger {
    counts: HashMap<String, usize>,
    taken: HashSet<String>,
}

impl Slugger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the slug for the next heading with the given text.
    ///
    /// A suffixed slug can clash with a heading whose own text ends in `-N`;
    /// such suffixes are skipped.
    pub fn slug(&mut self, text: &str) -> String {
        let base = base_slug(text);
        let count = self.counts.entry(base.clone()).or_insert(0);
        loop {
            let slug = if *count == 0 {
                base.clone()
            } else {
                format!("{base}-{count}")
            };
            *count += 1;
            if self.taken.insert(slug.clone()) {
                return slug;
            }
        }
    }

    /// Mark a slug as taken, so later headings that would produce it get
    /// suffixed instead.
    pub fn reserve(&mut self, slug: &str) {
        self.taken.insert(slug.to_string());
    }
}
