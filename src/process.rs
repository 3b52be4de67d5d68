use crate::enrich::{self, EnrichOptions};
use crate::frontmatter;
use crate::images::{self, ImageRef};
use crate::markdown::{self, Macros, RenderError, RenderOptions};

/// The title used when neither the document nor the caller supplies one.
pub const DEFAULT_TITLE: &str = "scimd";

/// Caller-level settings. The document's own frontmatter takes precedence
/// over the `default_*` values here.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub strict_math: bool,
    pub default_title: Option<String>,
    pub default_numbered_headings: Option<bool>,
    pub default_toc: Option<bool>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            strict_math: true,
            default_title: None,
            default_numbered_headings: None,
            default_toc: None,
        }
    }
}

#[derive(Debug)]
pub struct Processed {
    pub html: String,
    pub title: String,
    pub numbered_headings: bool,
    /// Local images the document refers to, in order of first use.
    pub images: Vec<ImageRef>,
    /// Problems with the document that didn't stop it from rendering.
    pub errors: Vec<String>,
}

/// Turn an annotated Markdown document into an HTML fragment.
pub fn process(source: &str, options: &ProcessOptions) -> Result<Processed, RenderError> {
    let fm = frontmatter::parse(source);
    let numbered_headings = fm
        .numbered_headings
        .or(options.default_numbered_headings)
        .unwrap_or(true);
    let toc = fm.toc.or(options.default_toc).unwrap_or(false);
    // A blank title would render as an empty heading the line scanner
    // doesn't see, throwing off every precomputed slug.
    let title = fm
        .title
        .clone()
        .or_else(|| options.default_title.clone())
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let doc = enrich::enrich(
        &fm,
        &EnrichOptions {
            title: title.clone(),
            numbered_headings,
            toc,
        },
    );
    let scan = images::scan(&doc.markdown);

    let html = markdown::render(
        &doc.markdown,
        RenderOptions {
            heading_slugs: Some(doc.slugs()),
            images: Some(&scan),
            macros: Macros::new(&fm.macros),
            strict_math: options.strict_math,
        },
    )?;

    let mut errors = fm.errors;
    errors.extend(scan.errors);
    Ok(Processed {
        html,
        title,
        numbered_headings,
        images: scan.images,
        errors,
    })
}
