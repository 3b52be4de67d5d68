//! Render annotated Markdown documents (frontmatter, math, light/dark
//! images, numbered sections) to HTML.

pub mod enrich;
pub mod frontmatter;
pub mod images;
pub mod markdown;
pub mod process;
pub mod slug;
