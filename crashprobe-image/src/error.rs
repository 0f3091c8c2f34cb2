use thiserror::Error;

/// An error produced while accessing a crashed process image.
///
/// The parser runs in a signal handler, so errors are plain copyable values
/// without attached payloads.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ImageError {
    /// The requested segment/section pair does not exist in the image.
    #[error("section not found in image")]
    SectionNotFound,

    /// A memory range could not be read out of the target task.
    #[error("cannot read memory from the target task")]
    ReadFailed,

    /// A string in the target task was unterminated or not valid UTF-8.
    #[error("invalid string in the target task")]
    InvalidString,
}
