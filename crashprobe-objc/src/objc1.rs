//! Walker for the legacy ObjC1 metadata layout.
//!
//! ObjC1 images describe their classes through module records in the
//! `__OBJC,__module_info` section: each module points at a symtab, the symtab
//! at a run of class pointers, and each class at its method lists. Only the
//! module records themselves live in a mappable section; everything past them
//! is chased through cross-task reads.

use crashprobe_image::{Image, LazyString, MemoryObject};
use scroll::Pread;

use crate::error::ObjcError;
use crate::lookup::FoundMethod;
use crate::raw::{
    Objc1Class, Objc1Method, Objc1MethodList, Objc1Module, Objc1Symtab, CLS_NO_METHOD_ARRAY,
    END_OF_METHODS_LIST, SECT_MODULE_INFO, SEG_OBJC,
};

/// Parses ObjC1 class data out of `__OBJC,__module_info`.
///
/// Returns `NotFound` if the image carries no ObjC1 metadata, which the
/// unified parser treats as the cue to try the ObjC2 layout instead.
pub(crate) fn parse_module_info<I, F>(image: &I, callback: &mut F) -> Result<(), ObjcError>
where
    I: Image,
    F: FnMut(FoundMethod<'_, I>),
{
    let endian = image.endian();

    let module_info = image.map_section(SEG_OBJC, SECT_MODULE_INFO)?;
    let data = module_info
        .remap(module_info.task_address(), 0, module_info.length())
        .ok_or(ObjcError::NotFound)?;

    // The section is a packed array of module records.
    let module_count = data.len() / Objc1Module::SIZE;
    for index in 0..module_count {
        let module: Objc1Module = data.pread_with(index * Objc1Module::SIZE, endian)?;
        if module.symtab == 0 {
            continue;
        }

        let symtab_addr = module.symtab as u64;
        let mut buf = [0u8; Objc1Symtab::SIZE];
        image.read_memory(symtab_addr, &mut buf)?;
        let symtab: Objc1Symtab = buf.pread_with(0, endian)?;

        // Class pointers are laid out directly after the symtab record. The
        // cat_def_count tail that follows them is deliberately not walked.
        for i in 0..symtab.cls_def_count as u64 {
            let cursor = symtab_addr + Objc1Symtab::SIZE as u64 + i * 4;
            let mut buf = [0u8; 4];
            image.read_memory(cursor, &mut buf)?;
            let class_addr = buf.pread_with::<u32>(0, endian)? as u64;

            let class = read_class(image, class_addr)?;
            parse_class(image, &class, false, callback)?;

            // The metaclass sits at the class's isa pointer and holds the
            // class methods.
            let metaclass = read_class(image, class.isa as u64)?;
            parse_class(image, &metaclass, true, callback)?;
        }
    }

    Ok(())
}

fn read_class<I: Image>(image: &I, address: u64) -> Result<Objc1Class, ObjcError> {
    let mut buf = [0u8; Objc1Class::SIZE];
    image.read_memory(address, &mut buf)?;
    Ok(buf.pread_with(0, image.endian())?)
}

/// Emits every method of a single ObjC1 class (or metaclass).
fn parse_class<I, F>(
    image: &I,
    class: &Objc1Class,
    is_meta_class: bool,
    callback: &mut F,
) -> Result<(), ObjcError>
where
    I: Image,
    F: FnMut(FoundMethod<'_, I>),
{
    let endian = image.endian();
    let class_name = LazyString::new(image, class.name as u64);

    // `methods` is either a pointer to a single method list, or a pointer to
    // a NULL-terminated array of method list pointers, depending on
    // CLS_NO_METHOD_ARRAY in the info flags.
    let has_multiple_lists = class.info & CLS_NO_METHOD_ARRAY == 0;
    let mut cursor = class.methods as u64;

    loop {
        let list_addr = if has_multiple_lists {
            if cursor == 0 {
                break;
            }

            let mut buf = [0u8; 4];
            image.read_memory(cursor, &mut buf)?;
            let ptr = buf.pread_with::<u32>(0, endian)?;

            // Both terminators occur in the wild; the runtime has written
            // each at different points in its history.
            if ptr == 0 || ptr == END_OF_METHODS_LIST {
                break;
            }

            cursor += 4;
            ptr as u64
        } else {
            if cursor == 0 {
                break;
            }
            cursor
        };

        let mut buf = [0u8; Objc1MethodList::SIZE];
        image.read_memory(list_addr, &mut buf)?;
        let list: Objc1MethodList = buf.pread_with(0, endian)?;

        for i in 0..list.count as u64 {
            let method_addr = list_addr + Objc1MethodList::SIZE as u64 + i * Objc1Method::SIZE as u64;
            let mut buf = [0u8; Objc1Method::SIZE];
            image.read_memory(method_addr, &mut buf)?;
            let method: Objc1Method = buf.pread_with(0, endian)?;

            let method_name = LazyString::new(image, method.name as u64);
            callback(FoundMethod {
                is_meta_class,
                class_name: &class_name,
                method_name: &method_name,
                imp: method.imp as u64,
            });
        }

        if !has_multiple_lists {
            break;
        }
    }

    Ok(())
}
