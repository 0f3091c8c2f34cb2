//! The per-caller parser cache.
//!
//! [`ObjcCache`] bundles everything the parser remembers between calls: the
//! four mapped `__DATA` sections of the most recently parsed image, the
//! direct-mapped `data_rw → data_ro` table, and the one-shot hint that the
//! image uses the ObjC2 layout. A cache is owned by a single caller; for
//! concurrent symbolication use one cache per thread.

use std::ptr::NonNull;
use std::slice;

use crashprobe_image::{Image, MemoryObject};

use crate::error::ObjcError;
use crate::raw::{SECT_CATLIST, SECT_CLASSLIST, SECT_OBJC_CONST, SECT_OBJC_DATA, SEG_DATA};

/// Number of buckets in the class-RO cache.
const RO_CACHE_CAPACITY: usize = 1024;

/// Arena size: parallel `keys` and `values` arrays of target addresses.
const RO_CACHE_BYTES: usize = RO_CACHE_CAPACITY * 2 * std::mem::size_of::<u64>();

/// Source of page-granularity memory for the class-RO cache arena.
///
/// The parser may be entered from a signal handler, where the general heap is
/// off limits; the one allocation it ever makes is funneled through this
/// trait so it can come straight from the kernel (and be substituted in
/// tests). Returned memory must be zeroed.
pub trait PageAllocator {
    /// Allocates `len` bytes of zeroed, writable memory, or `None` if the
    /// allocation fails.
    fn alloc_zeroed(&self, len: usize) -> Option<NonNull<u8>>;

    /// Returns an allocation to the system.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`alloc_zeroed`] on this allocator
    /// with the same `len`, and must not be used afterwards.
    ///
    /// [`alloc_zeroed`]: PageAllocator::alloc_zeroed
    unsafe fn dealloc(&self, ptr: NonNull<u8>, len: usize);
}

/// The default [`PageAllocator`], backed by anonymous `mmap`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPages;

impl PageAllocator for SystemPages {
    fn alloc_zeroed(&self, len: usize) -> Option<NonNull<u8>> {
        // Anonymous mappings come back zero-filled from the kernel.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANON | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            None
        } else {
            NonNull::new(ptr.cast())
        }
    }

    unsafe fn dealloc(&self, ptr: NonNull<u8>, len: usize) {
        libc::munmap(ptr.as_ptr().cast(), len);
    }
}

/// Direct-mapped table resolving a class's `data_rw` address to its
/// `data_ro` address.
///
/// The arena is allocated lazily on the first store and never grows. There
/// is no chaining and no eviction: on a bucket collision the first entry
/// wins and later stores are dropped. A miss only costs one extra cross-task
/// read, so losing entries is fine; if the arena allocation itself fails the
/// table stays disabled and every lookup misses.
pub(crate) struct RoCache<A: PageAllocator> {
    alloc: A,
    table: Option<NonNull<u64>>,
}

impl<A: PageAllocator> RoCache<A> {
    fn new(alloc: A) -> Self {
        RoCache { alloc, table: None }
    }

    /// The bucket for `key`. The two low bits of a word-aligned pointer are
    /// always zero and carry no entropy.
    fn index(key: u64) -> usize {
        (key >> 2) as usize % RO_CACHE_CAPACITY
    }

    fn keys(&self) -> Option<&[u64]> {
        // SAFETY: `table` points at RO_CACHE_BYTES of initialized memory
        // owned by this cache; the keys array is the first half.
        self.table
            .map(|t| unsafe { slice::from_raw_parts(t.as_ptr(), RO_CACHE_CAPACITY) })
    }

    fn values(&self) -> Option<&[u64]> {
        // SAFETY: as above; the values array is the second half.
        self.table.map(|t| unsafe {
            slice::from_raw_parts(t.as_ptr().add(RO_CACHE_CAPACITY), RO_CACHE_CAPACITY)
        })
    }

    /// Returns the value stored for `key`, or 0 if there is none.
    pub(crate) fn lookup(&self, key: u64) -> u64 {
        let (Some(keys), Some(values)) = (self.keys(), self.values()) else {
            return 0;
        };

        let index = Self::index(key);
        if keys[index] == key {
            values[index]
        } else {
            0
        }
    }

    /// Stores `key → value` if the bucket is empty.
    pub(crate) fn store(&mut self, key: u64, value: u64) {
        if self.table.is_none() {
            // First use; grab the arena. If this fails the cache simply
            // stays disabled.
            self.table = self.alloc.alloc_zeroed(RO_CACHE_BYTES).map(NonNull::cast);
        }
        let Some(table) = self.table else {
            return;
        };

        let index = Self::index(key);
        // SAFETY: index < RO_CACHE_CAPACITY and the arena holds
        // 2 * RO_CACHE_CAPACITY words.
        unsafe {
            let key_slot = table.as_ptr().add(index);
            if *key_slot == 0 {
                *key_slot = key;
                *table.as_ptr().add(RO_CACHE_CAPACITY + index) = value;
            }
        }
    }

    /// Number of occupied buckets.
    #[cfg(test)]
    pub(crate) fn entries(&self) -> usize {
        self.keys()
            .map(|keys| keys.iter().filter(|&&k| k != 0).count())
            .unwrap_or(0)
    }
}

impl<A: PageAllocator> Drop for RoCache<A> {
    fn drop(&mut self) {
        if let Some(table) = self.table.take() {
            // SAFETY: the arena was obtained from `self.alloc` with this
            // exact length and is not referenced after this point.
            unsafe { self.alloc.dealloc(table.cast(), RO_CACHE_BYTES) };
        }
    }
}

/// Borrowed views of the four mapped ObjC2 sections.
pub(crate) struct Objc2Sections<'a, M> {
    pub objc_const: &'a M,
    pub classlist: &'a M,
    pub catlist: &'a M,
    pub objc_data: &'a M,
}

/// Reusable parser state, created once per caller and passed into every
/// parse.
///
/// `M` is the memory object type of the [`Image`] implementation in use; `A`
/// supplies the class-RO cache arena and defaults to [`SystemPages`].
///
/// Construction performs no allocation and no mapping; sections are mapped
/// on first use and remapped whenever a different image is presented. All
/// resources are released on drop.
pub struct ObjcCache<M, A: PageAllocator = SystemPages> {
    last_image: Option<u64>,
    got_objc2_info: bool,
    objc_const: Option<M>,
    classlist: Option<M>,
    catlist: Option<M>,
    objc_data: Option<M>,
    pub(crate) ro_cache: RoCache<A>,
}

impl<M: MemoryObject> ObjcCache<M> {
    /// Creates an empty cache using the system page allocator.
    pub fn new() -> Self {
        Self::with_allocator(SystemPages)
    }
}

impl<M: MemoryObject> Default for ObjcCache<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: MemoryObject, A: PageAllocator> ObjcCache<M, A> {
    /// Creates an empty cache drawing its arena from `alloc`.
    pub fn with_allocator(alloc: A) -> Self {
        ObjcCache {
            last_image: None,
            got_objc2_info: false,
            objc_const: None,
            classlist: None,
            catlist: None,
            objc_data: None,
            ro_cache: RoCache::new(alloc),
        }
    }

    /// Returns true once an image has successfully parsed as ObjC2.
    ///
    /// The hint is sticky: later parses on this cache skip the ObjC1 attempt
    /// entirely.
    pub fn uses_objc2(&self) -> bool {
        self.got_objc2_info
    }

    pub(crate) fn set_uses_objc2(&mut self) {
        self.got_objc2_info = true;
    }

    fn free_mapped_sections(&mut self) {
        self.objc_const = None;
        self.classlist = None;
        self.catlist = None;
        self.objc_data = None;
    }

    /// Ensures the mapped sections describe `image`.
    ///
    /// A cache that already holds this image's sections returns immediately.
    /// Otherwise any previous mappings are released and the four ObjC2
    /// sections are mapped in order. `NotFound` from one of the first three
    /// means the image simply has no ObjC2 metadata; a missing `__objc_data`
    /// when the class list exists means the image is malformed.
    ///
    /// `last_image` is recorded only once all four mappings succeed. On a
    /// mid-sequence failure the slots mapped so far deliberately stay
    /// initialized without an owning image; the next call with any image
    /// starts by releasing them.
    pub(crate) fn map_sections<I>(&mut self, image: &I) -> Result<(), ObjcError>
    where
        I: Image<Mobj = M>,
    {
        if self.last_image == Some(image.id()) {
            return Ok(());
        }

        self.free_mapped_sections();
        self.last_image = None;

        self.objc_const = Some(image.map_section(SEG_DATA, SECT_OBJC_CONST)?);
        self.classlist = Some(image.map_section(SEG_DATA, SECT_CLASSLIST)?);
        self.catlist = Some(image.map_section(SEG_DATA, SECT_CATLIST)?);
        self.objc_data = Some(
            image
                .map_section(SEG_DATA, SECT_OBJC_DATA)
                .map_err(|e| match ObjcError::from(e) {
                    ObjcError::NotFound => ObjcError::Invalid,
                    other => other,
                })?,
        );

        self.last_image = Some(image.id());
        Ok(())
    }

    /// Splits the cache into section views and the RO table, for the ObjC2
    /// walker.
    pub(crate) fn objc2_parts(
        &mut self,
    ) -> Result<(Objc2Sections<'_, M>, &mut RoCache<A>), ObjcError> {
        let ObjcCache {
            objc_const,
            classlist,
            catlist,
            objc_data,
            ro_cache,
            ..
        } = self;

        match (
            objc_const.as_ref(),
            classlist.as_ref(),
            catlist.as_ref(),
            objc_data.as_ref(),
        ) {
            (Some(objc_const), Some(classlist), Some(catlist), Some(objc_data)) => Ok((
                Objc2Sections {
                    objc_const,
                    classlist,
                    catlist,
                    objc_data,
                },
                ro_cache,
            )),
            _ => Err(ObjcError::Invalid),
        }
    }

    /// True if no section slot is initialized (used by tests to check the
    /// all-or-nothing section invariant).
    #[cfg(test)]
    pub(crate) fn sections_unmapped(&self) -> bool {
        self.objc_const.is_none()
            && self.classlist.is_none()
            && self.catlist.is_none()
            && self.objc_data.is_none()
    }

    #[cfg(test)]
    pub(crate) fn last_image(&self) -> Option<u64> {
        self.last_image
    }
}
