//! Method enumeration and the best-IMP search.

use crashprobe_image::{Image, LazyString, MemoryObject};

use crate::cache::{ObjcCache, PageAllocator};
use crate::error::ObjcError;
use crate::{objc1, objc2};

/// A method emitted during a metadata walk.
///
/// The string handles borrow from the walk and are only valid for the
/// duration of the callback; resolve them with [`LazyString::read`] and copy
/// the result if it needs to outlive the call.
pub struct FoundMethod<'a, I: ?Sized> {
    /// True if the method belongs to the metaclass (a class method).
    pub is_meta_class: bool,
    /// The name of the class.
    pub class_name: &'a LazyString<'a, I>,
    /// The selector name of the method.
    pub method_name: &'a LazyString<'a, I>,
    /// The method's implementation address, exactly as stored in the source
    /// record.
    pub imp: u64,
}

/// Walks all class data in the image, trying ObjC1 first and falling back to
/// ObjC2.
///
/// Once an image has parsed as ObjC2, the cache remembers it and later calls
/// go straight to the ObjC2 walker.
fn parse<I, A, F>(
    image: &I,
    cache: &mut ObjcCache<I::Mobj, A>,
    callback: &mut F,
) -> Result<(), ObjcError>
where
    I: Image,
    A: PageAllocator,
    F: FnMut(FoundMethod<'_, I>),
{
    let result = if cache.uses_objc2() {
        // ObjC1 could not be found before; don't bother trying again.
        Err(ObjcError::NotFound)
    } else {
        objc1::parse_module_info(image, callback)
    };

    match result {
        Err(ObjcError::NotFound) => {
            objc2::parse_data_section(image, cache, callback)?;
            cache.set_uses_objc2();
            Ok(())
        }
        other => other,
    }
}

impl<M: MemoryObject, A: PageAllocator> ObjcCache<M, A> {
    /// Invokes `callback` for every class and metaclass method in `image`.
    ///
    /// Methods are emitted in the order the on-disk structures are
    /// traversed; no ordering across images is promised. Returns `NotFound`
    /// if the image contains no Objective-C metadata at all.
    pub fn each_method<I, F>(&mut self, image: &I, mut callback: F) -> Result<(), ObjcError>
    where
        I: Image<Mobj = M>,
        F: FnMut(FoundMethod<'_, I>),
    {
        parse(image, self, &mut callback)
    }

    /// Finds the method whose implementation address best matches `imp` and
    /// invokes `callback` with it exactly once.
    ///
    /// The best match is the method with the greatest implementation address
    /// that is still `<= imp`: the method whose compiled code a program
    /// counter inside the image most plausibly belongs to. Returns
    /// `NotFound` if no method lies at or below `imp`.
    ///
    /// The search runs in two passes: one to establish the winning address,
    /// one to recover that method's names. Buffering every candidate in the
    /// first pass would need allocation, which the crash path does not have;
    /// the second pass is cheap because the first one warmed the class-RO
    /// cache.
    pub fn find_method<I, F>(
        &mut self,
        image: &I,
        imp: u64,
        mut callback: F,
    ) -> Result<(), ObjcError>
    where
        I: Image<Mobj = M>,
        F: FnMut(FoundMethod<'_, I>),
    {
        let mut best = 0u64;
        parse(image, self, &mut |method: FoundMethod<'_, I>| {
            if method.imp >= best && method.imp <= imp {
                best = method.imp;
            }
        })?;

        if best == 0 {
            return Err(ObjcError::NotFound);
        }

        // Several methods can share the winning address; emit only the first.
        let mut fired = false;
        parse(image, self, &mut |method: FoundMethod<'_, I>| {
            if method.imp == best && !fired {
                fired = true;
                callback(method);
            }
        })
    }
}
