use crate::markdown::parser_options;
use pulldown_cmark::{Event, Parser, Tag};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

static SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*:").unwrap());
static MODE_INFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(dark|light)\.[^.]+$").unwrap());

/// Which color scheme an image is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageMode {
    Dark,
    Light,
}

impl ImageMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageMode::Dark => "dark",
            ImageMode::Light => "light",
        }
    }
}

impl fmt::Display for ImageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An image file sitting next to the Markdown document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub file_name: String,
    pub mode: Option<ImageMode>,
}

impl ImageRef {
    fn new(file_name: &str) -> Self {
        let mode = MODE_INFIX.captures(file_name).map(|c| {
            if c[1].eq_ignore_ascii_case("dark") {
                ImageMode::Dark
            } else {
                ImageMode::Light
            }
        });
        Self {
            file_name: file_name.to_string(),
            mode,
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImageScan {
    pub images: Vec<ImageRef>,
    pub errors: Vec<String>,
}

impl ImageScan {
    /// Look up the entry for an image source as written in the document.
    pub fn find(&self, src: &str) -> Option<&ImageRef> {
        match classify(src) {
            ImageSource::Local(name) => self.images.iter().find(|i| i.file_name == name),
            _ => None,
        }
    }
}

/// What an image's `src` points at.
#[derive(Debug, PartialEq, Eq)]
pub enum ImageSource<'a> {
    Empty,
    /// Anything with a URI scheme or a protocol-relative `//` prefix.
    External,
    /// A sibling file of the document.
    Local(&'a str),
    /// A relative path that isn't a plain sibling file name.
    Invalid,
}

pub fn classify(src: &str) -> ImageSource<'_> {
    let src = src.trim();
    if src.is_empty() {
        return ImageSource::Empty;
    }
    if SCHEME.is_match(src) || src.starts_with("//") {
        return ImageSource::External;
    }

    let mut name = src;
    while let Some(rest) = name.strip_prefix("./") {
        name = rest;
    }
    if matches!(name, "" | "." | "..") || name.contains(['?', '#', '/', '\\']) {
        ImageSource::Invalid
    } else {
        ImageSource::Local(name)
    }
}

/// Collect the local images a document refers to.
pub fn scan(markdown: &str) -> ImageScan {
    let mut scan = ImageScan::default();
    let mut seen = HashSet::new();

    for event in Parser::new_ext(markdown, parser_options()) {
        let Event::Start(Tag::Image { dest_url, .. }) = event else {
            continue;
        };
        match classify(&dest_url) {
            ImageSource::Empty | ImageSource::External => (),
            ImageSource::Invalid => {
                let error = format!(
                    "Image references must point to sibling files next to the markdown file: {dest_url}"
                );
                if !scan.errors.contains(&error) {
                    scan.errors.push(error);
                }
            }
            ImageSource::Local(name) => {
                if seen.insert(name.to_string()) {
                    scan.images.push(ImageRef::new(name));
                }
            }
        }
    }

    scan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(scan: &ImageScan) -> Vec<&str> {
        scan.images.iter().map(|i| i.file_name.as_str()).collect()
    }

    #[test]
    fn external() {
        assert_eq!(classify("https://example.com/a.png"), ImageSource::External);
        assert_eq!(classify("//cdn.example/x.png"), ImageSource::External);
        assert_eq!(classify("data:image/png;base64,AAAA"), ImageSource::External);
    }

    #[test]
    fn local() {
        assert_eq!(classify("a.png"), ImageSource::Local("a.png"));
        assert_eq!(classify("././a.png"), ImageSource::Local("a.png"));
        assert_eq!(classify("  a.png "), ImageSource::Local("a.png"));
    }

    #[test]
    fn invalid() {
        assert_eq!(classify("../x.png"), ImageSource::Invalid);
        assert_eq!(classify("img/x.png"), ImageSource::Invalid);
        assert_eq!(classify("x.png?v=2"), ImageSource::Invalid);
        assert_eq!(classify("x.png#frag"), ImageSource::Invalid);
        assert_eq!(classify(r"dir\x.png"), ImageSource::Invalid);
        assert_eq!(classify("./"), ImageSource::Invalid);
        assert_eq!(classify("/abs.png"), ImageSource::Invalid);
    }

    #[test]
    fn empty() {
        assert_eq!(classify(""), ImageSource::Empty);
    }

    #[test]
    fn modes() {
        assert_eq!(ImageRef::new("plot.dark.png").mode, Some(ImageMode::Dark));
        assert_eq!(ImageRef::new("plot.LIGHT.svg").mode, Some(ImageMode::Light));
        assert_eq!(ImageRef::new("dark.png").mode, None);
        assert_eq!(ImageRef::new("plot.dark.v2.png").mode, None);
        assert_eq!(ImageRef::new("plot.png").mode, None);
    }

    #[test]
    fn dark_image() {
        let scan = scan("![diagram](./diagram.dark.png)");
        assert_eq!(
            scan.images,
            [ImageRef {
                file_name: "diagram.dark.png".to_string(),
                mode: Some(ImageMode::Dark),
            }]
        );
        assert!(scan.errors.is_empty());
    }

    #[test]
    fn dedup_in_order() {
        let scan = scan("![](b.png) ![](a.png)\n\n![again](./b.png)\n\n> ![](c.png)");
        assert_eq!(names(&scan), ["b.png", "a.png", "c.png"]);
    }

    #[test]
    fn nested_in_link_and_list() {
        let scan = scan("- [![badge](badge.svg)](https://example.com)\n- *![x](x.jpg)*");
        assert_eq!(names(&scan), ["badge.svg", "x.jpg"]);
    }

    #[test]
    fn external_ignored_silently() {
        let scan = scan("![](https://example.com/a.png) ![](//cdn.example/x.png)");
        assert_eq!(scan, ImageScan::default());
    }

    #[test]
    fn parent_dir_reported_once() {
        let scan = scan("![](../x.png) ![](../x.png)");
        assert!(scan.images.is_empty());
        assert_eq!(
            scan.errors,
            ["Image references must point to sibling files next to the markdown file: ../x.png"]
        );
    }

    #[test]
    fn code_is_not_an_image() {
        let scan = scan("`![](a.png)`\n\n```\n![](b.png)\n```");
        assert_eq!(scan, ImageScan::default());
    }

    #[test]
    fn find_by_source() {
        let scan = scan("![](./a.light.png)");
        assert_eq!(
            scan.find("a.light.png").and_then(|i| i.mode),
            Some(ImageMode::Light)
        );
        assert_eq!(scan.find("https://a.light.png"), None);
    }
}
