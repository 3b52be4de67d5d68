use crate::slug::Slugger;
use pulldown_cmark::{CowStr, Event, Tag, TagEnd};
use std::collections::VecDeque;

/// Where heading IDs come from during a render.
pub trait SlugSource {
    /// Produce the ID for the next heading, given its flattened text.
    fn next_slug(&mut self, text: &str) -> String;
}

/// Slugify headings as they are rendered.
#[derive(Debug, Default)]
pub struct Live(Slugger);

impl SlugSource for Live {
    fn next_slug(&mut self, text: &str) -> String {
        self.0.slug(text)
    }
}

/// Hand out slugs computed ahead of time, one per heading, in order.
///
/// If the document has more headings than there are slugs, the extras are
/// slugified live without colliding with any precomputed slug.
#[derive(Debug)]
pub struct Precomputed {
    slugs: std::vec::IntoIter<String>,
    overflow: Slugger,
}

impl Precomputed {
    pub fn new(slugs: Vec<String>) -> Self {
        let mut overflow = Slugger::new();
        for slug in &slugs {
            overflow.reserve(slug);
        }
        Self {
            slugs: slugs.into_iter(),
            overflow,
        }
    }
}

impl SlugSource for Precomputed {
    fn next_slug(&mut self, text: &str) -> String {
        match self.slugs.next() {
            Some(slug) => slug,
            None => {
                tracing::debug!(text, "more headings than precomputed slugs");
                self.overflow.slug(text)
            }
        }
    }
}

/// A pulldown-cmark adapter that gives every heading an ID drawn from a
/// [`SlugSource`].
pub struct AddHeadingIds<'a, 's, I, S>
where
    I: Iterator<Item = Event<'a>>,
    S: SlugSource,
{
    iter: I,
    buffer: VecDeque<Event<'a>>,
    slugs: &'s mut S,
}

impl<'a, 's, I, S> AddHeadingIds<'a, 's, I, S>
where
    I: Iterator<Item = Event<'a>>,
    S: SlugSource,
{
    pub fn new(iter: I, slugs: &'s mut S) -> Self {
        Self {
            iter,
            buffer: VecDeque::new(),
            slugs,
        }
    }

    /// Assuming that `self` is now just after the beginning of a heading,
    /// buffer up all the events until the heading ends in `self.buffer`.
    /// Return the heading's text: its plain text, inline code, and inline
    /// math, concatenated. Image alt text is left out.
    fn consume_heading(&mut self) -> String {
        assert!(self.buffer.is_empty(), "nested headings are not allowed");
        let mut text = String::new();
        let mut image_depth = 0usize;

        for future_event in self.iter.by_ref() {
            let is_end = match &future_event {
                Event::End(TagEnd::Heading(_)) => true,
                Event::Start(Tag::Image { .. }) => {
                    image_depth += 1;
                    false
                }
                Event::End(TagEnd::Image) => {
                    image_depth = image_depth.saturating_sub(1);
                    false
                }
                Event::Text(t) | Event::Code(t) | Event::InlineMath(t) if image_depth == 0 => {
                    text.push_str(t);
                    false
                }
                _ => false,
            };
            self.buffer.push_back(future_event);
            if is_end {
                break;
            }
        }

        text
    }
}

impl<'a, I, S> Iterator for AddHeadingIds<'a, '_, I, S>
where
    I: Iterator<Item = Event<'a>>,
    S: SlugSource,
{
    type Item = Event<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        // Unbuffer the next buffered event, if any.
        if let Some(event) = self.buffer.pop_front() {
            return Some(event);
        }

        let event = self.iter.next()?;
        match event {
            Event::Start(Tag::Heading {
                level,
                id: _,
                classes,
                attrs,
            }) => {
                let text = self.consume_heading();
                let slug = self.slugs.next_slug(&text);
                Some(Event::Start(Tag::Heading {
                    level,
                    id: Some(CowStr::from(slug)),
                    classes,
                    attrs,
                }))
            }
            _ => Some(event),
        }
    }
}
