//! Test helpers for `crashprobe`.
//!
//! Provides [`TestImage`], an in-memory stand-in for a crashed process image:
//! sections and loose memory regions are laid out at chosen target addresses
//! and served back through the [`Image`] trait. Every cross-task read is
//! logged so tests can assert on read traffic, not just results.

#![warn(missing_docs)]

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use crashprobe_image::{Arch, Endian, Image, ImageError, MemoryObject};

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

struct TestSection {
    segment: String,
    section: String,
    address: u64,
    data: Vec<u8>,
}

/// A synthetic image backed by plain byte buffers.
pub struct TestImage {
    id: u64,
    name: String,
    arch: Arch,
    endian: Endian,
    sections: Vec<TestSection>,
    regions: Vec<(u64, Vec<u8>)>,
    reads: RefCell<Vec<u64>>,
}

impl TestImage {
    /// Creates an empty image for the given architecture and byte order.
    pub fn new(name: &str, arch: Arch, endian: Endian) -> Self {
        TestImage {
            id: NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_owned(),
            arch,
            endian,
            sections: Vec::new(),
            regions: Vec::new(),
            reads: RefCell::new(Vec::new()),
        }
    }

    /// Places a section at `address` in the simulated task.
    ///
    /// Section contents are also readable through [`Image::read_memory`],
    /// just as a mapped section of a real task would be.
    pub fn add_section(&mut self, segment: &str, section: &str, address: u64, data: Vec<u8>) {
        self.sections.push(TestSection {
            segment: segment.to_owned(),
            section: section.to_owned(),
            address,
            data,
        });
    }

    /// Places a loose memory region (heap, runtime allocations) at `address`.
    pub fn add_region(&mut self, address: u64, data: Vec<u8>) {
        self.regions.push((address, data));
    }

    /// Places a NUL-terminated string at `address`.
    pub fn add_cstring(&mut self, address: u64, value: &str) {
        let mut data = value.as_bytes().to_vec();
        data.push(0);
        self.add_region(address, data);
    }

    /// Number of cross-task reads that started at exactly `address`.
    pub fn reads_at(&self, address: u64) -> usize {
        self.reads.borrow().iter().filter(|&&a| a == address).count()
    }

    /// Total number of cross-task reads performed through this image.
    pub fn total_reads(&self) -> usize {
        self.reads.borrow().len()
    }

    fn copy_from(range: &[u8], base: u64, address: u64, buf: &mut [u8]) -> bool {
        let Some(start) = address.checked_sub(base) else {
            return false;
        };
        let start = start as usize;
        let Some(end) = start.checked_add(buf.len()) else {
            return false;
        };
        match range.get(start..end) {
            Some(bytes) => {
                buf.copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }
}

impl Image for TestImage {
    type Mobj = TestMemoryObject;

    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn arch(&self) -> Arch {
        self.arch
    }

    fn endian(&self) -> Endian {
        self.endian
    }

    fn map_section(&self, segment: &str, section: &str) -> Result<TestMemoryObject, ImageError> {
        self.sections
            .iter()
            .find(|s| s.segment == segment && s.section == section)
            .map(|s| TestMemoryObject {
                task_address: s.address,
                data: s.data.clone(),
            })
            .ok_or(ImageError::SectionNotFound)
    }

    fn read_memory(&self, address: u64, buf: &mut [u8]) -> Result<(), ImageError> {
        self.reads.borrow_mut().push(address);

        for (base, data) in &self.regions {
            if Self::copy_from(data, *base, address, buf) {
                return Ok(());
            }
        }
        for section in &self.sections {
            if Self::copy_from(&section.data, section.address, address, buf) {
                return Ok(());
            }
        }

        Err(ImageError::ReadFailed)
    }
}

/// A [`MemoryObject`] owning a copy of a [`TestImage`] section.
#[derive(Debug)]
pub struct TestMemoryObject {
    task_address: u64,
    data: Vec<u8>,
}

impl MemoryObject for TestMemoryObject {
    fn task_address(&self) -> u64 {
        self.task_address
    }

    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    fn remap(&self, address: u64, offset: u64, length: u64) -> Option<&[u8]> {
        let address = address.checked_add(offset)?;
        let start = address.checked_sub(self.task_address)? as usize;
        let end = start.checked_add(length as usize)?;
        self.data.get(start..end)
    }
}

/// Incrementally builds the byte image of an on-wire record in a chosen byte
/// order.
pub struct BytesBuilder {
    endian: Endian,
    data: Vec<u8>,
}

impl BytesBuilder {
    /// Creates an empty builder writing in `endian` order.
    pub fn new(endian: Endian) -> Self {
        BytesBuilder {
            endian,
            data: Vec::new(),
        }
    }

    /// Appends a `u16`.
    pub fn u16(mut self, value: u16) -> Self {
        match self.endian {
            Endian::Little => self.data.extend_from_slice(&value.to_le_bytes()),
            Endian::Big => self.data.extend_from_slice(&value.to_be_bytes()),
        }
        self
    }

    /// Appends a `u32`.
    pub fn u32(mut self, value: u32) -> Self {
        match self.endian {
            Endian::Little => self.data.extend_from_slice(&value.to_le_bytes()),
            Endian::Big => self.data.extend_from_slice(&value.to_be_bytes()),
        }
        self
    }

    /// Appends a `u64`.
    pub fn u64(mut self, value: u64) -> Self {
        match self.endian {
            Endian::Little => self.data.extend_from_slice(&value.to_le_bytes()),
            Endian::Big => self.data.extend_from_slice(&value.to_be_bytes()),
        }
        self
    }

    /// Appends `count` zero bytes.
    pub fn pad(mut self, count: usize) -> Self {
        self.data.resize(self.data.len() + count, 0);
        self
    }

    /// Returns the accumulated bytes.
    pub fn build(self) -> Vec<u8> {
        self.data
    }
}
