//! Abstractions over the images of a crashed process.
//!
//! The crashprobe parsers run at crash time, inside the process that is being
//! reported on, and read metadata out of images that are still mapped into
//! the crashed task. This crate defines the seam between those parsers and
//! whatever provides access to that task: the [`Image`] trait describes a
//! single mapped Mach-O image, [`MemoryObject`] describes a section that has
//! been made locally readable, and [`LazyString`] is a deferred reference to
//! a null-terminated string in the target task.
//!
//! Everything here is designed to be callable from a signal handler: no
//! method allocates, takes a lock, or re-enters the runtime of the crashed
//! process. Implementations of these traits must uphold the same discipline.

#![warn(missing_docs)]

mod error;
mod image;
mod memory;
mod types;

pub use error::ImageError;
pub use image::{Image, LazyString};
pub use memory::{MemoryObject, SliceMemoryObject};
pub use types::Arch;

// The byte order of an image is expressed with scroll's runtime endianness so
// record readers can be handed it directly.
pub use scroll::Endian;
