use crate::assets::assets;
use anyhow::{Context as _, Result};
use scimd::markdown::RenderError;
use scimd::process::{self, DEFAULT_TITLE, ProcessOptions, Processed};
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use std::{fs, io};
use tracing::{error, info, warn};

assets!(
    TEMPLATES,
    "templates",
    ["page.html", "style.css", "livereload.js"]
);

/// Optional settings file, looked up next to the document.
pub const CONFIG_FILE: &str = "scimd.toml";

pub struct Context {
    /// The Markdown document.
    pub src_path: PathBuf,
    /// The directory containing it, where local images live.
    pub src_dir: PathBuf,
    /// Are we serving a live preview? This also makes math errors non-fatal.
    pub livereload: bool,
    pub config: Config,
    tmpls: minijinja::Environment<'static>,
}

impl Context {
    pub fn new(src_path: &Path, livereload: bool, config: Config) -> Result<Self> {
        let mut ctx = Self {
            src_path: src_path.into(),
            src_dir: parent_dir(src_path).into(),
            livereload,
            config,
            tmpls: minijinja::Environment::new(),
        };
        ctx.reload_templates()?;
        Ok(ctx)
    }

    /// (Re-)register all templates. Debug builds read them from disk.
    pub fn reload_templates(&mut self) -> Result<()> {
        self.tmpls.clear_templates();
        for (name, source) in TEMPLATES.load_all() {
            let source = source.with_context(|| format!("could not load template {name}"))?;
            self.tmpls.add_template_owned(name, source)?;
        }
        Ok(())
    }

    fn process_options(&self) -> ProcessOptions {
        ProcessOptions {
            strict_math: !self.livereload,
            default_title: self.config.title.clone(),
            default_numbered_headings: self.config.numbered_headings,
            default_toc: self.config.toc,
        }
    }

    /// Read and process the document.
    pub fn process(&self) -> Result<Processed> {
        let source = fs::read_to_string(&self.src_path)
            .with_context(|| format!("could not read {}", self.src_path.display()))?;
        Ok(process::process(&source, &self.process_options())?)
    }

    /// Render the HTML page for a processed document.
    pub fn render_page<W: io::Write>(&self, doc: &Processed, dest: W) -> Result<()> {
        // Diagnostics only go on the page in the live preview; `render` logs them.
        let errors: &[String] = if self.livereload { &doc.errors } else { &[] };

        let tmpl = self.tmpls.get_template("page.html")?;
        tmpl.render_to_write(
            minijinja::context! {
                title => doc.title,
                numbered_headings => doc.numbered_headings,
                body => doc.html,
                errors => errors,
                livereload => self.livereload,
            },
            dest,
        )?;
        Ok(())
    }

    /// Render a page that shows only an error message.
    pub fn render_failure<W: io::Write>(&self, message: &str, dest: W) -> Result<()> {
        let title = self.config.title.as_deref().unwrap_or(DEFAULT_TITLE);

        let tmpl = self.tmpls.get_template("page.html")?;
        tmpl.render_to_write(
            minijinja::context! {
                title => title,
                failure => message,
                livereload => self.livereload,
            },
            dest,
        )?;
        Ok(())
    }

    /// Render the live preview page. Problems with the document end up on the
    /// page, so this only fails if the page itself can't be produced.
    pub fn render_preview<W: io::Write>(&self, dest: W) -> Result<()> {
        match self.process() {
            Ok(doc) => self.render_page(&doc, dest),
            Err(err) => {
                if err.downcast_ref::<RenderError>().is_some() {
                    warn!("{err:#}");
                } else {
                    error!("{err:#}");
                }
                self.render_failure(&format!("{err:#}"), dest)
            }
        }
    }

    /// Write a processed document to `index.html` in a destination
    /// directory, along with the stylesheet and every local image it uses.
    pub fn write_site(&self, doc: &Processed, dest_dir: &Path) -> Result<()> {
        fs::create_dir_all(dest_dir)
            .with_context(|| format!("could not create {}", dest_dir.display()))?;

        let page_path = dest_dir.join("index.html");
        let page = fs::File::create(&page_path)
            .with_context(|| format!("could not create {}", page_path.display()))?;
        self.render_page(doc, page)?;

        let css = TEMPLATES.load("style.css")?;
        fs::write(dest_dir.join("style.css"), css.as_bytes())?;

        for image in &doc.images {
            let from = self.src_dir.join(&image.file_name);
            if !from.is_file() {
                warn!("Missing image file: {}", image.file_name);
                continue;
            }
            let to = dest_dir.join(&image.file_name);
            if same_file(&from, &to)? {
                continue;
            }
            hard_link_or_copy(&from, &to)
                .with_context(|| format!("could not copy image {}", image.file_name))?;
        }

        info!("wrote {}", page_path.display());
        Ok(())
    }

    /// Look up what the preview server should send for a request path.
    pub fn resolve_resource(&self, rel_path: &str) -> Option<Resource> {
        match rel_path.trim_start_matches('/') {
            "" | "index.html" => return Some(Resource::Page),
            "style.css" => return Some(Resource::Stylesheet),
            _ => (),
        }

        let src_path = self.src_dir.join(sibling_name(rel_path)?);
        src_path.is_file().then_some(Resource::Static(src_path))
    }
}

#[derive(Debug, PartialEq)]
pub enum Resource {
    /// The rendered document.
    Page,
    Stylesheet,
    /// A file next to the document, such as an image.
    Static(PathBuf),
}

/// The directory containing a file, which is `.` for a bare file name.
pub fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Try to hard-link `from` at `to`, falling back to a copy if the link fails
/// (e.g., the two paths are on different filesystems). This always removes the
/// current file at `to`.
fn hard_link_or_copy(from: &Path, to: &Path) -> io::Result<Option<u64>> {
    if to.exists() {
        fs::remove_file(to)?;
    }
    match fs::hard_link(from, to) {
        Ok(_) => Ok(None),
        Err(_) => fs::copy(from, to).map(Some),
    }
}

/// Do two paths name the same file? Rendering into the source directory would
/// otherwise delete images before linking them.
fn same_file(a: &Path, b: &Path) -> io::Result<bool> {
    if !b.exists() {
        return Ok(false);
    }
    Ok(fs::canonicalize(a)? == fs::canonicalize(b)?)
}

/// Should we refuse to serve a given file? We skip hidden files (prefixed
/// with .) and ones starting with _, which are special.
fn ignore_filename(name: &OsStr) -> bool {
    let bytes = name.as_encoded_bytes();
    bytes.starts_with(b".") || bytes.starts_with(b"_")
}

/// Validate a requested path as the name of a file next to the document. May
/// return `None` for any disallowed path, including anything in a
/// subdirectory.
fn sibling_name(path: &str) -> Option<PathBuf> {
    let mut names = Path::new(path)
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::CurDir));
    match (names.next(), names.next()) {
        (Some(Component::Normal(name)), None) if !ignore_filename(name) => Some(name.into()),
        _ => None,
    }
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct Config {
    pub title: Option<String>,
    pub numbered_headings: Option<bool>,
    pub toc: Option<bool>,
}

impl Config {
    pub fn load(src_dir: &Path) -> Result<Self> {
        let path = src_dir.join(CONFIG_FILE);
        match fs::read_to_string(&path) {
            // Silently proceed if the file isn't found, but crash on other errors.
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e)?,
            Ok(s) => toml::from_str(&s).with_context(|| format!("invalid {}", path.display())),
        }
    }
}
