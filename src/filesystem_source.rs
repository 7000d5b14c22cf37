use std::fs::File;
use std::io::{Error, ErrorKind, Result};
use std::path::{Path, PathBuf};

use crate::*;

/// A [Source] that reads keys as paths under a root directory, such as a bundle of placeholder or offline images.
///
/// Keys look like `/avatars/1.png` or `avatars/1.png` and always use `/` (behavior with `\` is undefined).  A key that
/// climbs out of the root with `..` is refused with [ErrorKind::InvalidInput] rather than read.
#[derive(Debug, Clone)]
pub struct FilesystemSource {
    root: PathBuf,
}

impl FilesystemSource {
    pub fn new(root: impl Into<PathBuf>) -> FilesystemSource {
        FilesystemSource { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where on disk a key lives, or an error if it would leave the root.
    pub fn resolve(&self, key: &str) -> Result<PathBuf> {
        // Normalizing through `RelativePath` collapses `.` and `..` the same way on every platform, which
        // `canonicalize` does not.
        let resolved = relative_path::RelativePath::new(key).to_logical_path(&self.root);
        if !resolved.starts_with(&self.root) {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("key {:?} is outside the source root", key),
            ));
        }
        Ok(resolved)
    }
}

impl Source for FilesystemSource {
    type Reader = File;

    fn open(&self, key: &str) -> Result<File> {
        File::open(self.resolve(key)?)
    }
}
