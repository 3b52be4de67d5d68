mod assets;
mod core;
mod serve;
mod watch;

use crate::core::{Config, Context, parent_dir};
use anyhow::{Result, bail};
use argh::FromArgs;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// Render annotated Markdown documents to HTML.
struct Args {
    /// log more detail
    #[argh(switch, short = 'v')]
    verbose: bool,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Render(RenderArgs),
    Watch(WatchArgs),
}

#[derive(FromArgs)]
/// Render a document to a directory.
#[argh(subcommand, name = "render")]
struct RenderArgs {
    /// the Markdown document
    #[argh(positional)]
    input: PathBuf,

    /// output directory (default: the current directory)
    #[argh(option, short = 'o')]
    output: Option<PathBuf>,
}

#[derive(FromArgs)]
/// Serve a live-reloading preview of a document.
#[argh(subcommand, name = "watch")]
struct WatchArgs {
    /// the Markdown document
    #[argh(positional)]
    input: PathBuf,

    /// port to listen on
    #[argh(option, short = 'p', default = "3000")]
    port: u16,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "scimd=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Check that the input looks like a document we can read.
fn check_input(path: &Path) -> Result<()> {
    if path.extension().is_none_or(|ext| ext != "md") {
        bail!("input must be a .md file: {}", path.display());
    }
    if !path.is_file() {
        bail!("no such file: {}", path.display());
    }
    Ok(())
}

fn load_context(input: &Path, livereload: bool) -> Result<Context> {
    check_input(input)?;
    let config = Config::load(parent_dir(input))?;
    Context::new(input, livereload, config)
}

fn render(args: RenderArgs) -> Result<()> {
    let ctx = load_context(&args.input, false)?;
    let dest_dir = args.output.unwrap_or_else(|| PathBuf::from("."));
    render_to(&ctx, &dest_dir, |error| warn!("{error}"))
}

/// Process the document, report its diagnostics, then write the site. The
/// diagnostics come out even when writing fails.
fn render_to(ctx: &Context, dest_dir: &Path, mut report: impl FnMut(&str)) -> Result<()> {
    let doc = ctx.process()?;
    for error in &doc.errors {
        report(error);
    }
    ctx.write_site(&doc, dest_dir)
}

fn watch(args: WatchArgs) -> Result<()> {
    if args.port == 0 {
        bail!("port must be between 1 and 65535");
    }
    let ctx = load_context(&args.input, true)?;
    serve::serve(ctx, args.port)
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();
    init_logging(args.verbose);

    match args.command {
        Command::Render(args) => render(args),
        Command::Watch(args) => watch(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn input_needs_md_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.txt");
        fs::write(&path, "hi").unwrap();
        let err = check_input(&path).unwrap_err();
        assert!(err.to_string().starts_with("input must be a .md file"));
    }

    #[test]
    fn input_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_input(&dir.path().join("paper.md")).unwrap_err();
        assert!(err.to_string().starts_with("no such file"));
    }

    #[test]
    fn input_ok() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.md");
        fs::write(&path, "hi").unwrap();
        assert!(check_input(&path).is_ok());
    }

    #[test]
    fn parse_watch() {
        let args = Args::from_args(&["scimd"], &["-v", "watch", "paper.md", "-p", "8080"]).unwrap();
        assert!(args.verbose);
        let Command::Watch(watch) = args.command else {
            panic!("expected watch");
        };
        assert_eq!(watch.input, PathBuf::from("paper.md"));
        assert_eq!(watch.port, 8080);
    }

    #[test]
    fn parse_render_defaults() {
        let args = Args::from_args(&["scimd"], &["render", "paper.md"]).unwrap();
        let Command::Render(render) = args.command else {
            panic!("expected render");
        };
        assert_eq!(render.output, None);
    }

    #[test]
    fn diagnostics_reported_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.md");
        fs::write(&path, "---\ncolour: red\n---\n![](../up.png)\n").unwrap();
        // A file where the output directory should go makes writing fail.
        let blocked = dir.path().join("public");
        fs::write(&blocked, "").unwrap();

        let ctx = load_context(&path, false).unwrap();
        let mut reported = vec![];
        let result = render_to(&ctx, &blocked, |e| reported.push(e.to_string()));
        assert!(result.is_err());
        assert_eq!(
            reported,
            [
                "Unknown frontmatter field: colour",
                "Image references must point to sibling files next to the markdown file: ../up.png",
            ]
        );
    }

    #[test]
    fn port_zero_rejected() {
        let args = WatchArgs {
            input: PathBuf::from("paper.md"),
            port: 0,
        };
        assert!(watch(args).is_err());
    }
}
