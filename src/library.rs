use std::{io, path::PathBuf};

use log::debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("cartridge {0} not found in library")]
    NotFound(String),

    #[error("library I/O failure: {0}")]
    Io(#[from] io::Error),
}

/// Source of cartridge images, keyed by game identifier.
#[allow(async_fn_in_trait)]
pub trait CartridgeLibrary {
    async fn fetch(&self, identifier: &str) -> Result<Vec<u8>, LibraryError>;
}

/// Library that serves `<root>/<identifier>` straight from disk.
#[derive(Clone, Debug)]
pub struct FsLibrary {
    root: PathBuf,
}

impl FsLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl CartridgeLibrary for FsLibrary {
    async fn fetch(&self, identifier: &str) -> Result<Vec<u8>, LibraryError> {
        // Identifiers are plain names, never paths.
        if identifier.contains('/') || identifier.contains('\\') {
            debug!("rejecting cartridge identifier with path separators: {identifier}");
            return Err(LibraryError::NotFound(identifier.to_owned()));
        }

        match tokio::fs::read(self.root.join(identifier)).await {
            Ok(data) => Ok(data),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(LibraryError::NotFound(identifier.to_owned()))
            }
            Err(err) => Err(err.into()),
        }
    }
}
