use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("invalid arguments: {0}")]
    Argument(String),

    #[error("unclosed path quote")]
    UnterminatedQuote,

    #[error(
        "path {} is not valid (not a .class, not a directory and not a .zip/.jar file)",
        .0.display()
    )]
    InvalidPath(PathBuf),

    #[error(
        "seen directory '{}' in the path list, it won't be changed; pass --allow-directories or set CLASS_VERSION_PATCHER_ALLOW_DIRECTORIES=true",
        .0.display()
    )]
    RejectedDirectory(PathBuf),

    #[error("stream does not start with cafebabe (found {found:08x})")]
    InvalidMagic { found: u32 },

    #[error("class file header is truncated")]
    TruncatedHeader,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("walk: {0}")]
    Walk(#[from] ignore::Error),

    #[error("archive entry {name}")]
    Entry {
        name: String,
        #[source]
        source: Box<PatchError>,
    },

    #[error("failed to change class version of {}", path.display())]
    Failed {
        path: PathBuf,
        #[source]
        source: Box<PatchError>,
    },
}

impl PatchError {
    pub fn at(self, path: impl Into<PathBuf>) -> Self {
        match self {
            already @ PatchError::Failed { .. } => already,
            other => PatchError::Failed {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }

    pub fn in_entry(self, name: &str) -> Self {
        PatchError::Entry {
            name: name.to_string(),
            source: Box::new(self),
        }
    }

    /// True for errors caused by a stream that is not a class file.
    pub fn is_format_error(&self) -> bool {
        match self {
            PatchError::InvalidMagic { .. } | PatchError::TruncatedHeader => true,
            PatchError::Failed { source, .. } | PatchError::Entry { source, .. } => {
                source.is_format_error()
            }
            _ => false,
        }
    }
}

pub type PatchResult<T> = Result<T, PatchError>;
