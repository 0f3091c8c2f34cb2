use crashprobe_image::ImageError;
use thiserror::Error;

/// An error encountered while parsing Objective-C metadata.
///
/// The parser runs under async-signal-safety constraints, so errors are plain
/// copyable values. `NotFound` doubles as a non-fatal "nothing here"
/// indicator: the unified parser uses it to fall through from the ObjC1 to
/// the ObjC2 layout, and the class walker uses it to skip classes the
/// runtime has not realized.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ObjcError {
    /// No Objective-C metadata was found.
    ///
    /// Raised when a metadata section is absent from the image, when a class
    /// has not been realized by the runtime, or when a search produced no
    /// candidate.
    #[error("no Objective-C metadata")]
    NotFound,

    /// The metadata is structurally corrupt: a pointer did not resolve
    /// inside the section that should contain it, or a record would not
    /// parse.
    #[error("malformed Objective-C metadata")]
    Invalid,

    /// Memory could not be read out of the crashed task for a reason other
    /// than bounds.
    #[error("failed to read memory from the crashed task")]
    MemoryRead,
}

impl From<ImageError> for ObjcError {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::SectionNotFound => ObjcError::NotFound,
            ImageError::InvalidString => ObjcError::Invalid,
            _ => ObjcError::MemoryRead,
        }
    }
}

impl From<scroll::Error> for ObjcError {
    fn from(_: scroll::Error) -> Self {
        ObjcError::Invalid
    }
}
