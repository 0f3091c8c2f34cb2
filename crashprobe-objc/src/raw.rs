//! Raw Objective-C runtime records as they appear in target memory.
//!
//! These layouts are fixed by the Objective-C runtime ABI and must match it
//! bit for bit. Multi-byte fields are stored in the image's byte order, so
//! records are always read with `pread_with` and the image's endianness
//! rather than cast in place.

use std::mem;

use scroll::{Endian, Pread};

use crate::error::ObjcError;

/// Segment holding legacy ObjC1 metadata.
pub(crate) const SEG_OBJC: &str = "__OBJC";
/// Segment holding ObjC2 metadata sections.
pub(crate) const SEG_DATA: &str = "__DATA";

/// ObjC1 module records.
pub(crate) const SECT_MODULE_INFO: &str = "__module_info";
/// ObjC2 class pointer list.
pub(crate) const SECT_CLASSLIST: &str = "__objc_classlist";
/// ObjC2 category pointer list.
pub(crate) const SECT_CATLIST: &str = "__objc_catlist";
/// ObjC2 read-only class data.
pub(crate) const SECT_OBJC_CONST: &str = "__objc_const";
/// ObjC2 class structures.
pub(crate) const SECT_OBJC_DATA: &str = "__objc_data";

/// ObjC1 class `info` flag: `methods` points at a single method list rather
/// than a NULL-terminated array of method list pointers.
pub(crate) const CLS_NO_METHOD_ARRAY: u32 = 0x4000;

/// Alternate terminator of an ObjC1 method list array. Older runtimes wrote
/// this instead of NULL; both must be accepted.
pub(crate) const END_OF_METHODS_LIST: u32 = 0xffff_ffff;

/// The class's rw data has been realized by the runtime.
pub(crate) const RW_REALIZED: u32 = 1 << 31;

/// A realized class's `data_ro` pointer is a heap-allocated copy rather than
/// a pointer into `__objc_const`.
pub(crate) const RW_COPIED_RO: u32 = 1 << 27;

/// On 64-bit ARM the runtime packs refcount and side-table bits into `isa`
/// pointers; the class pointer is recovered by masking.
pub(crate) const ARM64_ISA_MASK: u64 = 0x1_ffff_fff8;

/// The low bits of an ObjC2 class's `data_rw` pointer and of a method list's
/// `entsize` carry flags, not address bits.
pub(crate) const PTR_FLAG_MASK: u64 = 3;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread)]
pub(crate) struct Objc1Module {
    pub version: u32,
    pub size: u32,
    pub name: u32,
    pub symtab: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread)]
pub(crate) struct Objc1Symtab {
    pub sel_ref_cnt: u32,
    pub refs: u32,
    pub cls_def_count: u16,
    pub cat_def_count: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread)]
pub(crate) struct Objc1Class {
    pub isa: u32,
    pub super_class: u32,
    pub name: u32,
    pub version: u32,
    pub info: u32,
    pub instance_size: u32,
    pub ivars: u32,
    pub methods: u32,
    pub cache: u32,
    pub protocols: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread)]
pub(crate) struct Objc1MethodList {
    pub obsolete: u32,
    pub count: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread)]
pub(crate) struct Objc1Method {
    pub name: u32,
    pub types: u32,
    pub imp: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread)]
pub(crate) struct Objc2Class32 {
    pub isa: u32,
    pub superclass: u32,
    pub cache: u32,
    pub vtable: u32,
    pub data_rw: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread)]
pub(crate) struct Objc2Class64 {
    pub isa: u64,
    pub superclass: u64,
    pub cache: u64,
    pub vtable: u64,
    pub data_rw: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread)]
pub(crate) struct Objc2ClassRw32 {
    pub flags: u32,
    pub version: u32,
    pub data_ro: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread)]
pub(crate) struct Objc2ClassRw64 {
    pub flags: u32,
    pub version: u32,
    pub data_ro: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread)]
pub(crate) struct Objc2ClassRo32 {
    pub flags: u32,
    pub instance_start: u32,
    pub instance_size: u32,
    pub ivar_layout: u32,
    pub name: u32,
    pub base_methods: u32,
    pub base_protocols: u32,
    pub ivars: u32,
    pub weak_ivar_layout: u32,
    pub base_properties: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread)]
pub(crate) struct Objc2ClassRo64 {
    pub flags: u32,
    pub instance_start: u32,
    pub instance_size: u32,
    pub reserved: u32,
    pub ivar_layout: u64,
    pub name: u64,
    pub base_methods: u64,
    pub base_protocols: u64,
    pub ivars: u64,
    pub weak_ivar_layout: u64,
    pub base_properties: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread)]
pub(crate) struct Objc2Method32 {
    pub name: u32,
    pub types: u32,
    pub imp: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread)]
pub(crate) struct Objc2Method64 {
    pub name: u64,
    pub types: u64,
    pub imp: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread)]
pub(crate) struct Objc2Category32 {
    pub name: u32,
    pub cls: u32,
    pub instance_methods: u32,
    pub class_methods: u32,
    pub protocols: u32,
    pub instance_properties: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread)]
pub(crate) struct Objc2Category64 {
    pub name: u64,
    pub cls: u64,
    pub instance_methods: u64,
    pub class_methods: u64,
    pub protocols: u64,
    pub instance_properties: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pread)]
pub(crate) struct Objc2ListHeader {
    pub entsize: u32,
    pub count: u32,
}

macro_rules! record_size {
    ($($ty:ty),* $(,)?) => {
        $(impl $ty {
            pub(crate) const SIZE: usize = mem::size_of::<Self>();
        })*
    };
}

// All records are naturally aligned, so their in-memory size equals the wire
// size and the derived field-by-field read consumes exactly SIZE bytes.
record_size!(
    Objc1Module,
    Objc1Symtab,
    Objc1Class,
    Objc1MethodList,
    Objc1Method,
    Objc2Class32,
    Objc2Class64,
    Objc2ClassRw32,
    Objc2ClassRw64,
    Objc2ClassRo32,
    Objc2ClassRo64,
    Objc2Method32,
    Objc2Method64,
    Objc2Category32,
    Objc2Category64,
    Objc2ListHeader,
);

/// An ObjC2 class with fields widened to target addresses.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Objc2Class {
    pub isa: u64,
    pub data_rw: u64,
}

/// An ObjC2 `class_rw_t` with the ro pointer widened to a target address.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Objc2ClassRw {
    pub flags: u32,
    pub data_ro: u64,
}

/// The parts of an ObjC2 `class_ro_t` the parser consumes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Objc2ClassRo {
    pub name: u64,
    pub base_methods: u64,
}

/// An ObjC2 method entry with fields widened to target addresses.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Objc2Method {
    pub name: u64,
    pub imp: u64,
}

/// An ObjC2 category entry with fields widened to target addresses.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Objc2Category {
    pub name: u64,
    pub cls: u64,
    pub instance_methods: u64,
    pub class_methods: u64,
}

/// The pointer width of an image.
///
/// The 32- and 64-bit record layouts differ only in pointer width; rather
/// than templating the walkers over three struct types apiece, the width is
/// carried as a value and the readers here widen every record to the unified
/// `u64`-addressed views above. This keeps a single copy of the walking code
/// in the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PtrWidth {
    U32,
    U64,
}

impl PtrWidth {
    pub(crate) fn bytes(self) -> usize {
        match self {
            PtrWidth::U32 => 4,
            PtrWidth::U64 => 8,
        }
    }

    /// Reads a pointer-sized field at `offset`.
    pub(crate) fn read_pointer(
        self,
        data: &[u8],
        offset: usize,
        endian: Endian,
    ) -> Result<u64, ObjcError> {
        match self {
            PtrWidth::U32 => Ok(data.pread_with::<u32>(offset, endian)? as u64),
            PtrWidth::U64 => Ok(data.pread_with::<u64>(offset, endian)?),
        }
    }

    pub(crate) fn class_size(self) -> usize {
        match self {
            PtrWidth::U32 => Objc2Class32::SIZE,
            PtrWidth::U64 => Objc2Class64::SIZE,
        }
    }

    pub(crate) fn class_rw_size(self) -> usize {
        match self {
            PtrWidth::U32 => Objc2ClassRw32::SIZE,
            PtrWidth::U64 => Objc2ClassRw64::SIZE,
        }
    }

    pub(crate) fn class_ro_size(self) -> usize {
        match self {
            PtrWidth::U32 => Objc2ClassRo32::SIZE,
            PtrWidth::U64 => Objc2ClassRo64::SIZE,
        }
    }

    pub(crate) fn category_size(self) -> usize {
        match self {
            PtrWidth::U32 => Objc2Category32::SIZE,
            PtrWidth::U64 => Objc2Category64::SIZE,
        }
    }

    pub(crate) fn read_class(self, data: &[u8], endian: Endian) -> Result<Objc2Class, ObjcError> {
        match self {
            PtrWidth::U32 => {
                let raw: Objc2Class32 = data.pread_with(0, endian)?;
                Ok(Objc2Class {
                    isa: raw.isa as u64,
                    data_rw: raw.data_rw as u64,
                })
            }
            PtrWidth::U64 => {
                let raw: Objc2Class64 = data.pread_with(0, endian)?;
                Ok(Objc2Class {
                    isa: raw.isa,
                    data_rw: raw.data_rw,
                })
            }
        }
    }

    pub(crate) fn read_class_rw(
        self,
        data: &[u8],
        endian: Endian,
    ) -> Result<Objc2ClassRw, ObjcError> {
        match self {
            PtrWidth::U32 => {
                let raw: Objc2ClassRw32 = data.pread_with(0, endian)?;
                Ok(Objc2ClassRw {
                    flags: raw.flags,
                    data_ro: raw.data_ro as u64,
                })
            }
            PtrWidth::U64 => {
                let raw: Objc2ClassRw64 = data.pread_with(0, endian)?;
                Ok(Objc2ClassRw {
                    flags: raw.flags,
                    data_ro: raw.data_ro,
                })
            }
        }
    }

    pub(crate) fn read_class_ro(
        self,
        data: &[u8],
        endian: Endian,
    ) -> Result<Objc2ClassRo, ObjcError> {
        match self {
            PtrWidth::U32 => {
                let raw: Objc2ClassRo32 = data.pread_with(0, endian)?;
                Ok(Objc2ClassRo {
                    name: raw.name as u64,
                    base_methods: raw.base_methods as u64,
                })
            }
            PtrWidth::U64 => {
                let raw: Objc2ClassRo64 = data.pread_with(0, endian)?;
                Ok(Objc2ClassRo {
                    name: raw.name,
                    base_methods: raw.base_methods,
                })
            }
        }
    }

    /// Reads the method entry at `offset`. The caller controls the stride;
    /// only the leading `name`/`types`/`imp` fields are interpreted.
    pub(crate) fn read_method(
        self,
        data: &[u8],
        offset: usize,
        endian: Endian,
    ) -> Result<Objc2Method, ObjcError> {
        match self {
            PtrWidth::U32 => {
                let raw: Objc2Method32 = data.pread_with(offset, endian)?;
                Ok(Objc2Method {
                    name: raw.name as u64,
                    imp: raw.imp as u64,
                })
            }
            PtrWidth::U64 => {
                let raw: Objc2Method64 = data.pread_with(offset, endian)?;
                Ok(Objc2Method {
                    name: raw.name,
                    imp: raw.imp,
                })
            }
        }
    }

    pub(crate) fn read_category(
        self,
        data: &[u8],
        endian: Endian,
    ) -> Result<Objc2Category, ObjcError> {
        match self {
            PtrWidth::U32 => {
                let raw: Objc2Category32 = data.pread_with(0, endian)?;
                Ok(Objc2Category {
                    name: raw.name as u64,
                    cls: raw.cls as u64,
                    instance_methods: raw.instance_methods as u64,
                    class_methods: raw.class_methods as u64,
                })
            }
            PtrWidth::U64 => {
                let raw: Objc2Category64 = data.pread_with(0, endian)?;
                Ok(Objc2Category {
                    name: raw.name,
                    cls: raw.cls,
                    instance_methods: raw.instance_methods,
                    class_methods: raw.class_methods,
                })
            }
        }
    }
}
