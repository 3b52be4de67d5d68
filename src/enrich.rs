use crate::frontmatter::Frontmatter;
use crate::slug::Slugger;
use regex::Regex;
use std::sync::LazyLock;

/// Stands in for the table of contents until the headings are known.
const TOC_MARKER: &str = "[scimd-toc]";

static FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(```+|~~~+)").unwrap());
static ATX_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*$").unwrap());
static CLOSING_HASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+#+\s*$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub text: String,
    pub slug: String,
}

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    pub title: String,
    pub numbered_headings: bool,
    pub toc: bool,
}

#[derive(Debug)]
pub struct Enriched {
    pub markdown: String,
    /// Every heading in the document, in order, including the title.
    pub headings: Vec<Heading>,
}

impl Enriched {
    pub fn slugs(&self) -> Vec<String> {
        self.headings.iter().map(|h| h.slug.clone()).collect()
    }
}

/// Wrap the document body with the title, byline, abstract, and (optionally)
/// a table of contents.
pub fn enrich(fm: &Frontmatter, options: &EnrichOptions) -> Enriched {
    let mut parts = vec![format!("# {}", options.title)];
    if let Some(meta) = meta_line(fm.author.as_deref(), fm.date.as_deref()) {
        parts.push(meta);
    }
    if let Some(abstract_text) = &fm.abstract_text {
        parts.push(abstract_text.trim().to_string());
    }
    if options.toc {
        parts.push(TOC_MARKER.to_string());
    }
    parts.push(fm.body.trim_start().to_string());
    parts.retain(|p| !p.is_empty());

    let assembled = parts.join("\n\n");
    let headings = extract_headings(&assembled);
    let markdown = if options.toc {
        let toc = toc_markdown(&headings, options.numbered_headings);
        assembled.replacen(TOC_MARKER, &toc, 1)
    } else {
        assembled
    };

    Enriched { markdown, headings }
}

/// The "published by X on Y" line under the title.
fn meta_line(author: Option<&str>, date: Option<&str>) -> Option<String> {
    let author = author.filter(|a| !a.is_empty());
    let date = date.filter(|d| !d.is_empty());
    let mut clauses = vec![];
    if let Some(author) = author {
        clauses.push(format!("by {}", escape_html(author)));
    }
    if let Some(date) = date {
        clauses.push(format!("on {}", escape_html(date)));
    }
    if clauses.is_empty() {
        return None;
    }
    Some(format!(
        "<p class=\"title-meta\">published {}</p>",
        clauses.join(" ")
    ))
}

/// Escape text for HTML, including both quote characters.
fn escape_html(text: &str) -> String {
    html_escape::encode_quoted_attribute(text).into_owned()
}

/// Find the ATX headings in a Markdown document, skipping fenced code.
///
/// A fence is closed by the next run of the same fence character, whatever
/// its length.
pub fn extract_headings(markdown: &str) -> Vec<Heading> {
    let mut headings = vec![];
    let mut slugger = Slugger::new();
    let mut fence: Option<char> = None;

    for line in markdown.lines() {
        if let Some(m) = FENCE.find(line.trim()) {
            let marker = m.as_str().chars().next();
            match fence {
                None => fence = marker,
                Some(open) if Some(open) == marker => fence = None,
                Some(_) => (),
            }
            continue;
        }
        if fence.is_some() {
            continue;
        }

        let Some(caps) = ATX_HEADING.captures(line) else {
            continue;
        };
        let text = CLOSING_HASHES.replace(&caps[2], "");
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        headings.push(Heading {
            level: caps[1].len() as u8,
            text: text.to_string(),
            slug: slugger.slug(text),
        });
    }

    headings
}

/// Build the table of contents list. The title (level 1) is left out.
fn toc_markdown(headings: &[Heading], numbered: bool) -> String {
    let entries: Vec<&Heading> = headings.iter().filter(|h| h.level >= 2).collect();
    let Some(min_level) = entries.iter().map(|h| h.level).min() else {
        return String::new();
    };

    let bullet = if numbered { "1." } else { "-" };
    let mut lines = vec!["<p class=\"toc-marker\"></p>".to_string(), String::new()];
    for heading in entries {
        let indent = "    ".repeat(usize::from(heading.level - min_level));
        lines.push(format!(
            "{indent}{bullet} [{}](#{})",
            escape_link_text(&heading.text),
            heading.slug
        ));
    }
    lines.join("\n")
}

fn escape_link_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('[', "\\[")
        .replace(']', "\\]")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(toc: bool) -> EnrichOptions {
        EnrichOptions {
            title: "Report".to_string(),
            numbered_headings: true,
            toc,
        }
    }

    fn body(text: &str) -> Frontmatter {
        Frontmatter {
            body: text.to_string(),
            ..Default::default()
        }
    }

    fn levels_and_slugs(markdown: &str) -> Vec<(u8, String)> {
        extract_headings(markdown)
            .into_iter()
            .map(|h| (h.level, h.slug))
            .collect()
    }

    #[test]
    fn title_only() {
        let doc = enrich(&body(""), &options(false));
        assert_eq!(doc.markdown, "# Report");
        assert_eq!(doc.slugs(), ["report"]);
    }

    #[test]
    fn title_and_body() {
        let doc = enrich(&body("\n\n## Intro\nHello"), &options(false));
        assert_eq!(doc.markdown, "# Report\n\n## Intro\nHello");
        assert_eq!(
            doc.headings[1],
            Heading {
                level: 2,
                text: "Intro".to_string(),
                slug: "intro".to_string()
            }
        );
    }

    #[test]
    fn meta_and_abstract() {
        let fm = Frontmatter {
            author: Some("Ada & Co".to_string()),
            date: Some("2024".to_string()),
            abstract_text: Some("  Summary.  ".to_string()),
            body: "Text".to_string(),
            ..Default::default()
        };
        let doc = enrich(&fm, &options(false));
        assert_eq!(
            doc.markdown,
            "# Report\n\n<p class=\"title-meta\">published by Ada &amp; Co on 2024</p>\
             \n\nSummary.\n\nText"
        );
    }

    #[test]
    fn meta_date_only() {
        assert_eq!(
            meta_line(None, Some("<today>")).as_deref(),
            Some("<p class=\"title-meta\">published on &lt;today&gt;</p>")
        );
        assert_eq!(meta_line(None, None), None);
    }

    #[test]
    fn empty_abstract_omitted() {
        let fm = Frontmatter {
            abstract_text: Some(String::new()),
            body: "Text".to_string(),
            ..Default::default()
        };
        assert_eq!(enrich(&fm, &options(false)).markdown, "# Report\n\nText");
    }

    #[test]
    fn duplicate_headings() {
        assert_eq!(
            levels_and_slugs("## Intro\n### Intro\n# Intro"),
            [
                (2, "intro".to_string()),
                (3, "intro-1".to_string()),
                (1, "intro-2".to_string())
            ]
        );
    }

    #[test]
    fn closing_hashes_and_empty_headings() {
        let headings = extract_headings("## Setup ##\n###   \n#NoSpace\n####### seven");
        assert_eq!(headings.len(), 1);
        assert_eq!(headings[0].text, "Setup");
    }

    #[test]
    fn fenced_code_skipped() {
        let md = "```rust\n# not a heading\n```\n~~~\n## nor this\n```\n## still code\n~~~~~\n## Real";
        assert_eq!(levels_and_slugs(md), [(2, "real".to_string())]);
    }

    #[test]
    fn fence_closes_regardless_of_length() {
        let md = "`````\n# inside\n```\n# outside";
        assert_eq!(levels_and_slugs(md), [(1, "outside".to_string())]);
    }

    #[test]
    fn unclosed_fence_hides_rest() {
        assert!(extract_headings("```\n# a\n# b").is_empty());
    }

    #[test]
    fn toc_numbered() {
        let doc = enrich(&body("## One\n### One.A\n## Two"), &options(true));
        assert_eq!(
            doc.markdown,
            "# Report\n\n<p class=\"toc-marker\"></p>\n\n\
             1. [One](#one)\n    1. [One.A](#onea)\n1. [Two](#two)\
             \n\n## One\n### One.A\n## Two"
        );
        assert_eq!(doc.slugs(), ["report", "one", "onea", "two"]);
    }

    #[test]
    fn toc_bulleted_relative_indent() {
        let mut opts = options(true);
        opts.numbered_headings = false;
        let doc = enrich(&body("### Deep\n#### Deeper"), &opts);
        assert!(doc.markdown.contains("- [Deep](#deep)\n    - [Deeper](#deeper)"));
    }

    #[test]
    fn toc_escapes_labels() {
        let doc = enrich(&body(r"## A [b] \c"), &options(true));
        assert!(doc.markdown.contains(r"1. [A \[b\] \\c](#a-b-c)"));
    }

    #[test]
    fn toc_excludes_title() {
        let doc = enrich(&body("Just text"), &options(true));
        assert_eq!(doc.markdown, "# Report\n\n\n\nJust text");
        assert!(!doc.markdown.contains("toc-marker"));
    }
}
