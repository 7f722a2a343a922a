//! The crate's error taxonomy.
//!
//! Parse and object errors are small tagged sets; user-facing message
//! phrasing belongs to the caller. I/O errors are annotated at the point of
//! origin with the operation and the file they concern.

use std::fmt;
use std::path::PathBuf;

/// What the crate was doing when an I/O error surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoContext {
    Accessing,
    Creating,
    Opening,
    Reading,
    Seeking,
    Writing,
}

impl fmt::Display for IoContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IoContext::Accessing => "accessing",
            IoContext::Creating => "creating",
            IoContext::Opening => "opening",
            IoContext::Reading => "reading",
            IoContext::Seeking => "seeking",
            IoContext::Writing => "writing",
        })
    }
}

/// Structural problems found while parsing an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("not an archive")]
    NotArchive,
    #[error("malformed archive")]
    MalformedArchive,
    #[error("numeric field overflow")]
    Overflow,
    #[error("invalid character in header field")]
    InvalidCharacter,
}

/// Problems found while extracting symbols from a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ObjectError {
    #[error("not an object file")]
    NotObject,
    #[error("unsupported machine type")]
    NotSupportedMachine,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{context} {}: {source}", .path.display())]
    Io {
        context: IoContext,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Object(#[from] ObjectError),
    #[error("cannot extract members from a thin archive")]
    ExtractingFromThin,
}

impl Error {
    /// Build a `map_err` closure annotating an I/O error with its context
    /// and the file it concerns.
    pub(crate) fn io(
        context: IoContext,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Error {
        let path = path.into();
        move |source| Error::Io {
            context,
            path,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
