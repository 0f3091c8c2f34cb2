//! Async-signal-safe Objective-C metadata parsing for crash reporting.
//!
//! When a crash reporter symbolicates a stack, program counters that land in
//! Objective-C methods are best labeled with the `-[ClassName method:]` form,
//! but at crash time the dynamic runtime of the crashed process cannot be
//! asked: it may hold locks, be mid-mutation, or be the thing that crashed.
//! This crate instead recovers class and method names straight from the
//! compiled metadata of the still-mapped images, reading raw memory out of
//! the crashed task.
//!
//! Both generations of the metadata layout are supported: the legacy ObjC1
//! `__OBJC,__module_info` module graph and the modern ObjC2
//! `__DATA,__objc_classlist` layout, each in its 32- and 64-bit variants and
//! in the image's own byte order.
//!
//! The entry point is [`ObjcCache::find_method`], which locates the method
//! whose implementation address is the greatest one at or below a given
//! program counter. The [`ObjcCache`] carries everything worth keeping
//! between lookups — section mappings, the `data_rw → data_ro` resolution
//! table, and the detected metadata generation — so a reporter walking many
//! frames pays the setup cost once.
//!
//! # Async-signal-safety
//!
//! Every entry point may be called from a signal handler or from a crash
//! thread that has suspended all others. Nothing here allocates from the
//! general heap, takes a lock, or re-enters the runtime of the crashed
//! process; the one allocation ever made (the class-RO cache arena) is
//! requested directly from the kernel through a [`PageAllocator`]. A cache
//! must not be shared across threads; use one per thread.

#![warn(missing_docs)]

mod cache;
mod error;
mod lookup;
mod objc1;
mod objc2;
mod raw;

pub use cache::{ObjcCache, PageAllocator, SystemPages};
pub use error::ObjcError;
pub use lookup::FoundMethod;
