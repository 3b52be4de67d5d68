use std::borrow::Cow;
use std::io;

/// A set of files from the source tree that are built into the binary.
pub struct Assets {
    /// The directory these files live in.
    pub dir: &'static str,

    /// Names and embedded contents.
    files: &'static [(&'static str, &'static str)],
}

impl Assets {
    pub const fn new(dir: &'static str, files: &'static [(&'static str, &'static str)]) -> Self {
        Self { dir, files }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        self.files.iter().map(|(n, _)| *n)
    }

    /// Get the copy of a file that was embedded at build time.
    pub fn embedded(&self, name: &str) -> Option<&'static str> {
        self.files.iter().find(|(n, _)| *n == name).map(|(_, c)| *c)
    }

    /// Load a file. Debug builds read it from disk, so edits show up without
    /// a rebuild; release builds use the embedded copy.
    pub fn load(&self, name: &str) -> io::Result<Cow<'static, str>> {
        let Some(embedded) = self.embedded(name) else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no asset named {name}"),
            ));
        };

        if cfg!(debug_assertions) {
            std::fs::read_to_string(std::path::Path::new(self.dir).join(name)).map(Cow::Owned)
        } else {
            Ok(Cow::Borrowed(embedded))
        }
    }

    /// Load every file, returning `(name, contents)` pairs.
    pub fn load_all(&self) -> impl Iterator<Item = (&'static str, io::Result<Cow<'static, str>>)> {
        self.names().map(|name| (name, self.load(name)))
    }
}

/// Declare a set of asset files under a directory of the crate.
macro_rules! assets {
    ($constname:ident, $dirname:literal, [ $($filename:literal),* ]) => {
        pub(crate) const $constname: $crate::assets::Assets = $crate::assets::Assets::new(
            concat!(env!("CARGO_MANIFEST_DIR"), "/", $dirname),
            &[$(
                (
                    $filename,
                    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/", $dirname, "/", $filename)),
                ),
            )*],
        );
    };
}

pub(crate) use assets;
