mod add_ids;
mod image_class;
mod math;

pub use add_ids::{Live, Precomputed, SlugSource};
pub use image_class::IMAGE_CLASS;
pub use math::Macros;

use crate::images::ImageScan;
use pulldown_cmark::{Options, Parser, html::push_html};

/// The only way rendering can fail: bad math in strict mode.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to typeset math `{expr}`: {message}")]
    Math { expr: String, message: String },
}

/// Parser options shared by everything that tokenizes a document, so that
/// every pass sees the same structure.
pub fn parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_MATH);
    options
}

#[derive(Debug)]
pub struct RenderOptions<'r> {
    /// Heading IDs, in document order. Without these, IDs are computed from
    /// the heading text as the document renders.
    pub heading_slugs: Option<Vec<String>>,
    /// Local images to tag with CSS classes.
    pub images: Option<&'r ImageScan>,
    pub macros: Macros,
    /// Fail on the first bad math expression instead of rendering it as an
    /// error.
    pub strict_math: bool,
}

impl Default for RenderOptions<'_> {
    fn default() -> Self {
        Self {
            heading_slugs: None,
            images: None,
            macros: Macros::default(),
            strict_math: true,
        }
    }
}

/// Per-render state that the adapters write into.
struct RenderEnv<S: SlugSource> {
    slugs: S,
    math_error: Option<RenderError>,
}

pub fn render(source: &str, mut options: RenderOptions<'_>) -> Result<String, RenderError> {
    match options.heading_slugs.take() {
        Some(slugs) => render_with(source, Precomputed::new(slugs), &options),
        None => render_with(source, Live::default(), &options),
    }
}

fn render_with<S: SlugSource>(
    source: &str,
    slugs: S,
    options: &RenderOptions<'_>,
) -> Result<String, RenderError> {
    let mut env = RenderEnv {
        slugs,
        math_error: None,
    };
    let no_images = ImageScan::default();
    let images = options.images.unwrap_or(&no_images);

    let mut html_buf = String::new();
    let iter = Parser::new_ext(source, parser_options());
    let iter = add_ids::AddHeadingIds::new(iter, &mut env.slugs);
    let iter = image_class::ClassifyImages::new(iter, images);
    let iter = math::TypesetMath::new(
        iter,
        &options.macros,
        options.strict_math,
        &mut env.math_error,
    );
    push_html(&mut html_buf, iter);

    match env.math_error {
        Some(err) => Err(err),
        None => Ok(html_buf),
    }
}
