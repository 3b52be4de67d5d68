use crate::images::ImageScan;
use html_escape::encode_double_quoted_attribute as attr;
use pulldown_cmark::{CowStr, Event, Tag, TagEnd};
use std::collections::BTreeSet;
use std::fmt::Write;

/// The class every local image gets, so the stylesheet can find them.
pub const IMAGE_CLASS: &str = "scimd-image";

/// A pulldown-cmark adapter that tags local images with CSS classes: the base
/// [`IMAGE_CLASS`] and, for `.dark.`/`.light.` variants, a mode class such as
/// `scimd-image-dark`. Images that aren't in the scan are left alone.
pub struct ClassifyImages<'a, 'b, I>
where
    I: Iterator<Item = Event<'a>>,
{
    iter: I,
    scan: &'b ImageScan,
}

impl<'a, 'b, I> ClassifyImages<'a, 'b, I>
where
    I: Iterator<Item = Event<'a>>,
{
    pub fn new(iter: I, scan: &'b ImageScan) -> Self {
        Self { iter, scan }
    }

    /// Consume the image's alt text, up to and including the end of the image.
    fn consume_alt(&mut self) -> String {
        let mut alt = String::new();
        let mut depth = 0;
        for event in self.iter.by_ref() {
            match event {
                Event::Start(Tag::Image { .. }) => depth += 1,
                Event::End(TagEnd::Image) => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                Event::Text(t) | Event::Code(t) | Event::InlineMath(t) | Event::DisplayMath(t) => {
                    alt.push_str(&t)
                }
                Event::SoftBreak | Event::HardBreak => alt.push(' '),
                _ => (),
            }
        }
        alt
    }
}

impl<'a, I> Iterator for ClassifyImages<'a, '_, I>
where
    I: Iterator<Item = Event<'a>>,
{
    type Item = Event<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let event = self.iter.next()?;
        let Event::Start(Tag::Image {
            dest_url, title, ..
        }) = &event
        else {
            return Some(event);
        };
        let Some(image) = self.scan.find(dest_url) else {
            return Some(event);
        };

        let mode_class = image.mode.map(|m| format!("{IMAGE_CLASS}-{m}"));
        let extra = [Some(IMAGE_CLASS), mode_class.as_deref()];
        let classes = merge_classes("", extra.into_iter().flatten());
        let (dest_url, title) = (dest_url.clone(), title.clone());
        let alt = self.consume_alt();
        Some(Event::InlineHtml(img_tag(&dest_url, &alt, &title, &classes)))
    }
}

/// Add classes to a space-separated class list, keeping each class once.
pub fn merge_classes<'c>(existing: &'c str, extra: impl IntoIterator<Item = &'c str>) -> String {
    let classes: BTreeSet<&str> = existing.split_whitespace().chain(extra).collect();
    classes.into_iter().collect::<Vec<_>>().join(" ")
}

fn img_tag(src: &str, alt: &str, title: &str, classes: &str) -> CowStr<'static> {
    let mut tag = format!("<img src=\"{}\" alt=\"{}\"", attr(src), attr(alt));
    if !title.is_empty() {
        let _ = write!(tag, " title=\"{}\"", attr(title));
    }
    let _ = write!(tag, " class=\"{}\" />", attr(classes));
    CowStr::from(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images;
    use pulldown_cmark::{Parser, html};

    fn render_classified(source: &str) -> String {
        let scan = images::scan(source);
        let parser = Parser::new(source);

        let mut buf = String::new();
        html::push_html(&mut buf, ClassifyImages::new(parser, &scan));
        buf
    }

    #[test]
    fn plain_local() {
        assert_eq!(
            render_classified("![a plot](plot.png)"),
            "<p><img src=\"plot.png\" alt=\"a plot\" class=\"scimd-image\" /></p>\n"
        );
    }

    #[test]
    fn dark_local() {
        assert_eq!(
            render_classified("![](./plot.dark.png \"Dark\")"),
            "<p><img src=\"./plot.dark.png\" alt=\"\" title=\"Dark\" \
             class=\"scimd-image scimd-image-dark\" /></p>\n"
        );
    }

    #[test]
    fn styled_alt() {
        assert_eq!(
            render_classified("![*big* `x`](x.png)"),
            "<p><img src=\"x.png\" alt=\"big x\" class=\"scimd-image\" /></p>\n"
        );
    }

    #[test]
    fn external_unchanged() {
        assert_eq!(
            render_classified("![hi](https://example.com/a.png)"),
            "<p><img src=\"https://example.com/a.png\" alt=\"hi\" /></p>\n"
        );
    }

    #[test]
    fn invalid_unchanged() {
        assert_eq!(
            render_classified("![hi](../a.png)"),
            "<p><img src=\"../a.png\" alt=\"hi\" /></p>\n"
        );
    }

    #[test]
    fn text_after_image_survives() {
        assert_eq!(
            render_classified("![a](a.png) and *more*"),
            "<p><img src=\"a.png\" alt=\"a\" class=\"scimd-image\" /> and <em>more</em></p>\n"
        );
    }

    #[test]
    fn merge_is_a_set_union() {
        assert_eq!(
            merge_classes("wide scimd-image", ["scimd-image", "scimd-image-light"]),
            "scimd-image scimd-image-light wide"
        );
        assert_eq!(merge_classes("", ["b", "a"]), "a b");
    }
}
