use std::fmt;

use scroll::Endian;

use crate::error::ImageError;
use crate::memory::MemoryObject;
use crate::types::Arch;

/// A Mach-O image mapped into the crashed task.
///
/// This is the interface the metadata parsers consume. An implementation
/// typically wraps a parsed Mach-O header plus a handle to the task the image
/// lives in; every method must be safe to call from a signal handler.
pub trait Image {
    /// The memory object type produced by [`map_section`](Image::map_section).
    type Mobj: MemoryObject;

    /// A stable identity token for this image.
    ///
    /// Used only for identity comparison, never dereferenced. The load
    /// address of the image is a natural choice.
    fn id(&self) -> u64;

    /// The name of the image, for diagnostics.
    fn name(&self) -> &str;

    /// The architecture the image was built for.
    fn arch(&self) -> Arch;

    /// The byte order of the image.
    fn endian(&self) -> Endian;

    /// Maps a section of the image for local reading.
    ///
    /// Returns [`ImageError::SectionNotFound`] if the image has no such
    /// section.
    fn map_section(&self, segment: &str, section: &str) -> Result<Self::Mobj, ImageError>;

    /// Reads `buf.len()` bytes at `address` in the target task.
    fn read_memory(&self, address: u64, buf: &mut [u8]) -> Result<(), ImageError>;

    /// Returns true if the image uses 64-bit pointers.
    fn is_64bit(&self) -> bool {
        self.arch().is_64bit()
    }
}

/// A deferred reference to a null-terminated string in the target task.
///
/// Constructing a `LazyString` performs no reads; the string is resolved on
/// demand with [`read`](LazyString::read), into a caller-provided buffer.
/// This keeps string handling allocation-free and means invalid string
/// pointers only surface when (and if) a caller actually needs the text.
pub struct LazyString<'a, I: ?Sized> {
    image: &'a I,
    address: u64,
}

impl<'a, I: Image + ?Sized> LazyString<'a, I> {
    /// Creates a lazy reference to the string at `address` in the image's
    /// task.
    pub fn new(image: &'a I, address: u64) -> Self {
        LazyString { image, address }
    }

    /// The address of the string in the target task.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Resolves the string into `buf` and returns it.
    ///
    /// Bytes are read one at a time up to the terminating NUL, so no memory
    /// past the string itself is ever touched. Fails with
    /// [`ImageError::InvalidString`] if no terminator is found within
    /// `buf.len()` bytes or the data is not valid UTF-8.
    pub fn read<'b>(&self, buf: &'b mut [u8]) -> Result<&'b str, ImageError> {
        for len in 0..buf.len() {
            self.image
                .read_memory(self.address + len as u64, &mut buf[len..len + 1])?;
            if buf[len] == 0 {
                return std::str::from_utf8(&buf[..len]).map_err(|_| ImageError::InvalidString);
            }
        }
        Err(ImageError::InvalidString)
    }
}

impl<I: ?Sized> fmt::Debug for LazyString<'_, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyString")
            .field("address", &self.address)
            .finish()
    }
}
