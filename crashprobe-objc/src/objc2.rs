//! Walker for the modern ObjC2 metadata layout.
//!
//! ObjC2 images keep a packed array of class pointers in
//! `__DATA,__objc_classlist`. Each class structure lives in
//! `__DATA,__objc_data` and points, through its runtime-private rw data, at
//! the compiled read-only data in `__DATA,__objc_const` that carries the
//! class name and method list. The rw data is heap-allocated by the runtime
//! and can only be reached with cross-task reads; the `data_rw → data_ro`
//! resolution is what the class-RO cache short-circuits.

use crashprobe_image::{Arch, Image, LazyString, MemoryObject};
use scroll::Pread;

use crate::cache::{Objc2Sections, ObjcCache, PageAllocator, RoCache};
use crate::error::ObjcError;
use crate::lookup::FoundMethod;
use crate::raw::{
    Objc2Category, Objc2Class, Objc2ClassRo64, Objc2ClassRw64, Objc2ListHeader, PtrWidth,
    ARM64_ISA_MASK, PTR_FLAG_MASK, RW_COPIED_RO, RW_REALIZED,
};

/// Recovers a class pointer from a possibly tagged isa value.
///
/// On 64-bit ARM the runtime stores refcount and side-table bits in the high
/// bits of isa pointers, including within class data; everywhere else the
/// value is already a plain pointer.
fn tagged_isa<I: Image>(image: &I, isa: u64) -> u64 {
    if image.arch() == Arch::Arm64 {
        isa & ARM64_ISA_MASK
    } else {
        isa
    }
}

fn ptr_width<I: Image>(image: &I) -> PtrWidth {
    if image.is_64bit() {
        PtrWidth::U64
    } else {
        PtrWidth::U32
    }
}

/// Parses ObjC2 class data out of the `__DATA` metadata sections.
///
/// Returns `NotFound` if the image carries no ObjC2 metadata. Classes the
/// runtime has not realized are skipped; any structural failure aborts the
/// walk.
pub(crate) fn parse_data_section<I, A, F>(
    image: &I,
    cache: &mut ObjcCache<I::Mobj, A>,
    callback: &mut F,
) -> Result<(), ObjcError>
where
    I: Image,
    A: PageAllocator,
    F: FnMut(FoundMethod<'_, I>),
{
    cache.map_sections(image)?;

    let endian = image.endian();
    let width = ptr_width(image);
    let (sections, ro_cache) = cache.objc2_parts()?;

    let class_ptrs = sections
        .classlist
        .remap(sections.classlist.task_address(), 0, sections.classlist.length())
        .ok_or(ObjcError::Invalid)?;

    let class_count = class_ptrs.len() / width.bytes();
    for i in 0..class_count {
        let ptr = width.read_pointer(class_ptrs, i * width.bytes(), endian)?;

        let bytes = sections
            .objc_data
            .remap(ptr, 0, width.class_size() as u64)
            .ok_or(ObjcError::Invalid)?;
        let class = width.read_class(bytes, endian)?;

        match parse_class(image, &sections, ro_cache, width, &class, false, callback) {
            Ok(()) | Err(ObjcError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let isa = tagged_isa(image, class.isa);
        let bytes = sections
            .objc_data
            .remap(isa, 0, width.class_size() as u64)
            .ok_or(ObjcError::Invalid)?;
        let metaclass = width.read_class(bytes, endian)?;

        match parse_class(image, &sections, ro_cache, width, &metaclass, true, callback) {
            Ok(()) | Err(ObjcError::NotFound) => {}
            Err(e) => return Err(e),
        }
    }

    let cat_ptrs = sections
        .catlist
        .remap(sections.catlist.task_address(), 0, sections.catlist.length())
        .ok_or(ObjcError::Invalid)?;

    let cat_count = cat_ptrs.len() / width.bytes();
    for i in 0..cat_count {
        let ptr = width.read_pointer(cat_ptrs, i * width.bytes(), endian)?;

        let bytes = sections
            .objc_data
            .remap(ptr, 0, width.category_size() as u64)
            .ok_or(ObjcError::Invalid)?;
        let category = width.read_category(bytes, endian)?;

        parse_category(image, &category, callback)?;
    }

    Ok(())
}

/// Emits every method of a single ObjC2 class (or metaclass).
fn parse_class<I, A, F>(
    image: &I,
    sections: &Objc2Sections<'_, I::Mobj>,
    ro_cache: &mut RoCache<A>,
    width: PtrWidth,
    class: &Objc2Class,
    is_meta_class: bool,
    callback: &mut F,
) -> Result<(), ObjcError>
where
    I: Image,
    A: PageAllocator,
    F: FnMut(FoundMethod<'_, I>),
{
    let endian = image.endian();

    // The low bits of data_rw are flags.
    let data_rw = class.data_rw & !PTR_FLAG_MASK;

    let cached_ro = ro_cache.lookup(data_rw);
    let ro = if cached_ro == 0 {
        let mut buf = [0u8; Objc2ClassRw64::SIZE];
        let buf = &mut buf[..width.class_rw_size()];
        image.read_memory(data_rw, buf)?;
        let rw = width.read_class_rw(buf, endian)?;

        // Unrealized classes have no usable rw data yet; skip them without
        // failing the image walk.
        if rw.flags & RW_REALIZED == 0 {
            return Err(ObjcError::NotFound);
        }

        // The ro data is either a heap copy made by the runtime, or lives in
        // __objc_const where the cheaper mapping reaches it.
        let ro = if rw.flags & RW_COPIED_RO != 0 {
            let mut buf = [0u8; Objc2ClassRo64::SIZE];
            let buf = &mut buf[..width.class_ro_size()];
            image.read_memory(rw.data_ro, buf)?;
            width.read_class_ro(buf, endian)?
        } else {
            let bytes = sections
                .objc_const
                .remap(rw.data_ro, 0, width.class_ro_size() as u64)
                .ok_or(ObjcError::Invalid)?;
            width.read_class_ro(bytes, endian)?
        };

        ro_cache.store(data_rw, rw.data_ro);
        ro
    } else {
        // The address was validated when it was cached. Try the mapping
        // first and fall back to a cross-task copy.
        if let Some(bytes) = sections
            .objc_const
            .remap(cached_ro, 0, width.class_ro_size() as u64)
        {
            width.read_class_ro(bytes, endian)?
        } else {
            let mut buf = [0u8; Objc2ClassRo64::SIZE];
            let buf = &mut buf[..width.class_ro_size()];
            image
                .read_memory(cached_ro, buf)
                .map_err(|_| ObjcError::Invalid)?;
            width.read_class_ro(buf, endian)?
        }
    };

    let class_name = LazyString::new(image, ro.name);

    // A class or metaclass with no methods of its own stores NULL here.
    if ro.base_methods == 0 {
        return Ok(());
    }

    walk_method_list(
        image,
        sections,
        width,
        &class_name,
        is_meta_class,
        ro.base_methods,
        callback,
    )
}

/// Emits the entries of one `method_list_t`.
fn walk_method_list<I, F>(
    image: &I,
    sections: &Objc2Sections<'_, I::Mobj>,
    width: PtrWidth,
    class_name: &LazyString<'_, I>,
    is_meta_class: bool,
    list_addr: u64,
    callback: &mut F,
) -> Result<(), ObjcError>
where
    I: Image,
    F: FnMut(FoundMethod<'_, I>),
{
    let endian = image.endian();

    let header_bytes = sections
        .objc_const
        .remap(list_addr, 0, Objc2ListHeader::SIZE as u64)
        .ok_or(ObjcError::Invalid)?;
    let header: Objc2ListHeader = header_bytes.pread_with(0, endian)?;

    // The low entsize bits are flags. Entries are indexed by entsize, not by
    // the record size, so runtimes that extend the record keep working.
    let entsize = (header.entsize & !(PTR_FLAG_MASK as u32)) as usize;
    let count = header.count as usize;
    if count == 0 {
        return Ok(());
    }

    let body = sections
        .objc_const
        .remap(
            list_addr + Objc2ListHeader::SIZE as u64,
            0,
            entsize as u64 * count as u64,
        )
        .ok_or(ObjcError::Invalid)?;

    for i in 0..count {
        let method = width.read_method(body, i * entsize, endian)?;
        let method_name = LazyString::new(image, method.name);

        callback(FoundMethod {
            is_meta_class,
            class_name,
            method_name: &method_name,
            imp: method.imp,
        });
    }

    Ok(())
}

/// Category records are decoded so the walk validates them, but resolving
/// category methods onto their host classes is not implemented yet; nothing
/// is emitted.
fn parse_category<I, F>(
    _image: &I,
    _category: &Objc2Category,
    _callback: &mut F,
) -> Result<(), ObjcError>
where
    I: Image,
    F: FnMut(FoundMethod<'_, I>),
{
    Ok(())
}
