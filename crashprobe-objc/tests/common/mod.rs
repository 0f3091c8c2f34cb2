//! Shared synthetic images for the integration tests.
//!
//! Addresses are arbitrary but chosen so every structure lives in a distinct
//! range: sections in the 0x10000s, runtime heap data around 0x30000, and
//! strings around 0x50000.

#![allow(dead_code)]

use crashprobe_image::{Arch, Endian};
use crashprobe_objc::{ObjcCache, ObjcError};
use crashprobe_testutils::{BytesBuilder, TestImage, TestMemoryObject};

pub type Method = (bool, String, String, u64);

const CLS_NO_METHOD_ARRAY: u32 = 0x4000;
const RW_REALIZED: u32 = 0x8000_0000;
const RW_COPIED_RO: u32 = 0x0800_0000;

/// Collects every emitted method as owned data.
pub fn collect_methods(
    image: &TestImage,
    cache: &mut ObjcCache<TestMemoryObject>,
) -> Result<Vec<Method>, ObjcError> {
    let mut out = Vec::new();
    cache.each_method(image, |method| {
        let mut class_buf = [0u8; 128];
        let mut method_buf = [0u8; 128];
        out.push((
            method.is_meta_class,
            method.class_name.read(&mut class_buf).unwrap().to_owned(),
            method.method_name.read(&mut method_buf).unwrap().to_owned(),
            method.imp,
        ));
    })?;
    Ok(out)
}

/// Runs `find_method` and returns the callback payloads (there should be at
/// most one).
pub fn find_method(
    image: &TestImage,
    cache: &mut ObjcCache<TestMemoryObject>,
    imp: u64,
) -> Result<Vec<Method>, ObjcError> {
    let mut out = Vec::new();
    cache.find_method(image, imp, |method| {
        let mut class_buf = [0u8; 128];
        let mut method_buf = [0u8; 128];
        out.push((
            method.is_meta_class,
            method.class_name.read(&mut class_buf).unwrap().to_owned(),
            method.method_name.read(&mut method_buf).unwrap().to_owned(),
            method.imp,
        ));
    })?;
    Ok(out)
}

pub fn objc1_class(endian: Endian, isa: u32, name: u32, info: u32, methods: u32) -> Vec<u8> {
    BytesBuilder::new(endian)
        .u32(isa)
        .u32(0) // super
        .u32(name)
        .u32(0) // version
        .u32(info)
        .u32(0) // instance_size
        .u32(0) // ivars
        .u32(methods)
        .u32(0) // cache
        .u32(0) // protocols
        .build()
}

pub fn objc1_method_list(endian: Endian, methods: &[(u32, u32)]) -> Vec<u8> {
    let mut builder = BytesBuilder::new(endian)
        .u32(0) // obsolete
        .u32(methods.len() as u32);
    for &(name, imp) in methods {
        builder = builder.u32(name).u32(0).u32(imp);
    }
    builder.build()
}

/// The ObjC1 image used by the lookup scenarios: class `Foo` with `-bar` at
/// 0x1000 and `-baz` at 0x2000 split over two method lists (terminated with
/// the 0xffffffff sentinel), and metaclass method `+qux` at 0x3000 behind
/// the single-list flag.
pub fn objc1_image() -> TestImage {
    let endian = Endian::Little;
    let mut image = TestImage::new("objc1.dylib", Arch::X86, endian);

    // One module record pointing at the symtab.
    image.add_section(
        "__OBJC",
        "__module_info",
        0x1000,
        BytesBuilder::new(endian)
            .u32(7) // version
            .u32(16) // size
            .u32(0) // name
            .u32(0x2000) // symtab
            .build(),
    );

    // Symtab with one class definition.
    image.add_region(
        0x2000,
        BytesBuilder::new(endian)
            .u32(0) // sel_ref_cnt
            .u32(0) // refs
            .u16(1) // cls_def_count
            .u16(0) // cat_def_count
            .u32(0x3000) // class pointer
            .build(),
    );

    image.add_region(0x3000, objc1_class(endian, 0x3100, 0x4000, 0, 0x5000));
    image.add_region(
        0x3100,
        objc1_class(endian, 0, 0x4000, CLS_NO_METHOD_ARRAY, 0x5300),
    );

    image.add_cstring(0x4000, "Foo");
    image.add_cstring(0x4010, "bar");
    image.add_cstring(0x4020, "baz");
    image.add_cstring(0x4030, "qux");

    // Method list pointer array, closed by the legacy terminator.
    image.add_region(
        0x5000,
        BytesBuilder::new(endian)
            .u32(0x5100)
            .u32(0x5200)
            .u32(0xffff_ffff)
            .build(),
    );
    image.add_region(0x5100, objc1_method_list(endian, &[(0x4010, 0x1000)]));
    image.add_region(0x5200, objc1_method_list(endian, &[(0x4020, 0x2000)]));
    image.add_region(0x5300, objc1_method_list(endian, &[(0x4030, 0x3000)]));

    image
}

/// A big-endian ObjC1 image with a NULL-terminated multi-list and two
/// classes that define no methods at all.
pub fn objc1_image_be() -> TestImage {
    let endian = Endian::Big;
    let mut image = TestImage::new("objc1-be.dylib", Arch::Ppc, endian);

    image.add_section(
        "__OBJC",
        "__module_info",
        0x1000,
        BytesBuilder::new(endian)
            .u32(7)
            .u32(16)
            .u32(0)
            .u32(0x2000)
            .build(),
    );

    image.add_region(
        0x2000,
        BytesBuilder::new(endian)
            .u32(0)
            .u32(0)
            .u16(2)
            .u16(0)
            .u32(0x3000)
            .u32(0x3200)
            .build(),
    );

    // `Bee` keeps its single method list behind CLS_NO_METHOD_ARRAY; its
    // metaclass uses a NULL-terminated pointer array.
    image.add_region(
        0x3000,
        objc1_class(endian, 0x3100, 0x4000, CLS_NO_METHOD_ARRAY, 0x5000),
    );
    image.add_region(0x3100, objc1_class(endian, 0, 0x4000, 0, 0x5100));

    // `Mute` has no methods in either form.
    image.add_region(0x3200, objc1_class(endian, 0x3300, 0x4030, 0, 0));
    image.add_region(
        0x3300,
        objc1_class(endian, 0, 0x4030, CLS_NO_METHOD_ARRAY, 0),
    );

    image.add_cstring(0x4000, "Bee");
    image.add_cstring(0x4010, "buzz");
    image.add_cstring(0x4020, "sting");
    image.add_cstring(0x4030, "Mute");

    image.add_region(0x5000, objc1_method_list(endian, &[(0x4010, 0x1000)]));
    image.add_region(
        0x5100,
        BytesBuilder::new(endian).u32(0x5200).u32(0).build(),
    );
    image.add_region(0x5200, objc1_method_list(endian, &[(0x4020, 0x2000)]));

    image
}

fn objc2_class_64(endian: Endian, isa: u64, data_rw: u64) -> Vec<u8> {
    BytesBuilder::new(endian)
        .u64(isa)
        .u64(0) // superclass
        .u64(0) // cache
        .u64(0) // vtable
        .u64(data_rw)
        .build()
}

fn objc2_class_ro_64(endian: Endian, name: u64, base_methods: u64) -> Vec<u8> {
    BytesBuilder::new(endian)
        .u32(0) // flags
        .u32(0) // instance_start
        .u32(0) // instance_size
        .u32(0) // reserved
        .u64(0) // ivar_layout
        .u64(name)
        .u64(base_methods)
        .u64(0) // base_protocols
        .u64(0) // ivars
        .u64(0) // weak_ivar_layout
        .u64(0) // base_properties
        .build()
}

fn objc2_class_rw_64(endian: Endian, flags: u32, data_ro: u64) -> Vec<u8> {
    BytesBuilder::new(endian)
        .u32(flags)
        .u32(0) // version
        .u64(data_ro)
        .build()
}

pub struct Objc2Fixture {
    pub image: TestImage,
    /// The class's (masked) data_rw address.
    pub data_rw: u64,
    /// The metaclass's data_rw address.
    pub meta_data_rw: u64,
}

/// The ObjC2 image used by the lookup scenarios: a 64-bit ARM image with one
/// realized class `Bar` whose `-hello` lives at 0xdeadbe00. The metaclass is
/// unrealized and the isa pointer carries tag bits that must be masked. The
/// catlist holds one category, which the walk decodes but does not emit.
pub fn objc2_image_64() -> Objc2Fixture {
    let endian = Endian::Little;
    let mut image = TestImage::new("objc2.dylib", Arch::Arm64, endian);

    image.add_section(
        "__DATA",
        "__objc_classlist",
        0x10000,
        BytesBuilder::new(endian).u64(0x20000).build(),
    );
    image.add_section(
        "__DATA",
        "__objc_catlist",
        0x11000,
        BytesBuilder::new(endian).u64(0x20100).build(),
    );

    // Class, metaclass and category structures. The isa is tagged: high
    // bits and a low bit that the ARM64 mask must strip to reach the
    // metaclass at 0x20050, and data_rw carries a low flag bit.
    let mut objc_data = Vec::new();
    objc_data.extend(objc2_class_64(
        endian,
        0x6000_0000_0002_0051,
        0x30000 | 2,
    ));
    objc_data.extend(BytesBuilder::new(endian).pad(0x28).build());
    objc_data.extend(objc2_class_64(endian, 0, 0x30040));
    objc_data.extend(BytesBuilder::new(endian).pad(0x88).build());
    assert_eq!(objc_data.len(), 0x100);
    objc_data.extend(
        // Category record: name, cls, then empty method/protocol lists.
        BytesBuilder::new(endian)
            .u64(0x50030)
            .u64(0x20000)
            .u64(0)
            .u64(0)
            .u64(0)
            .u64(0)
            .build(),
    );
    image.add_section("__DATA", "__objc_data", 0x20000, objc_data);

    let mut objc_const = Vec::new();
    objc_const.extend(objc2_class_ro_64(endian, 0x50000, 0x40200));
    objc_const.extend(BytesBuilder::new(endian).pad(0x200 - 72).build());
    objc_const.extend(
        BytesBuilder::new(endian)
            .u32(24) // entsize
            .u32(1) // count
            .u64(0x50010) // name
            .u64(0) // types
            .u64(0xdead_be00) // imp
            .build(),
    );
    image.add_section("__DATA", "__objc_const", 0x40000, objc_const);

    image.add_region(
        0x30000,
        objc2_class_rw_64(endian, RW_REALIZED, 0x40000),
    );
    image.add_region(0x30040, objc2_class_rw_64(endian, 0, 0));

    image.add_cstring(0x50000, "Bar");
    image.add_cstring(0x50010, "hello");
    image.add_cstring(0x50030, "Extras");

    Objc2Fixture {
        image,
        data_rw: 0x30000,
        meta_data_rw: 0x30040,
    }
}

/// A 32-bit ObjC2 image: class `Quux` with two methods, and a realized
/// metaclass whose `base_methods` is NULL.
pub fn objc2_image_32() -> TestImage {
    let endian = Endian::Little;
    let mut image = TestImage::new("objc2-32.dylib", Arch::X86, endian);

    image.add_section(
        "__DATA",
        "__objc_classlist",
        0x10000,
        BytesBuilder::new(endian).u32(0x20000).build(),
    );
    image.add_section("__DATA", "__objc_catlist", 0x11000, Vec::new());

    let mut objc_data = Vec::new();
    objc_data.extend(
        BytesBuilder::new(endian)
            .u32(0x20020) // isa
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0x30000) // data_rw
            .pad(0xc)
            .u32(0) // metaclass isa
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0x30020) // metaclass data_rw
            .build(),
    );
    image.add_section("__DATA", "__objc_data", 0x20000, objc_data);

    let mut objc_const = Vec::new();
    objc_const.extend(
        BytesBuilder::new(endian)
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0) // ivar_layout
            .u32(0x50000) // name
            .u32(0x40100) // base_methods
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0)
            .build(),
    );
    objc_const.extend(BytesBuilder::new(endian).pad(0x40 - 40).build());
    objc_const.extend(
        // Metaclass ro at 0x40040 with no methods of its own.
        BytesBuilder::new(endian)
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0x50000)
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0)
            .u32(0)
            .build(),
    );
    objc_const.extend(BytesBuilder::new(endian).pad(0x100 - 0x40 - 40).build());
    objc_const.extend(
        BytesBuilder::new(endian)
            .u32(12) // entsize
            .u32(2) // count
            .u32(0x50010)
            .u32(0)
            .u32(0x9000)
            .u32(0x50020)
            .u32(0)
            .u32(0x9100)
            .build(),
    );
    image.add_section("__DATA", "__objc_const", 0x40000, objc_const);

    image.add_region(
        0x30000,
        BytesBuilder::new(endian)
            .u32(RW_REALIZED)
            .u32(0)
            .u32(0x40000)
            .build(),
    );
    image.add_region(
        0x30020,
        BytesBuilder::new(endian)
            .u32(RW_REALIZED)
            .u32(0)
            .u32(0x40040)
            .build(),
    );

    image.add_cstring(0x50000, "Quux");
    image.add_cstring(0x50010, "one");
    image.add_cstring(0x50020, "two");

    image
}

/// A 64-bit image whose class ro data was heap-copied by the runtime
/// (RW_COPIED_RO): the ro record lives outside `__objc_const` and must be
/// fetched with cross-task reads, on the cache-miss and cache-hit paths
/// alike.
pub fn objc2_copied_ro_image() -> TestImage {
    let endian = Endian::Little;
    let mut image = TestImage::new("objc2-copied.dylib", Arch::Amd64, endian);

    image.add_section(
        "__DATA",
        "__objc_classlist",
        0x10000,
        BytesBuilder::new(endian).u64(0x20000).build(),
    );
    image.add_section("__DATA", "__objc_catlist", 0x11000, Vec::new());

    let mut objc_data = Vec::new();
    objc_data.extend(objc2_class_64(endian, 0x20028, 0x30000));
    objc_data.extend(objc2_class_64(endian, 0, 0x30040));
    image.add_section("__DATA", "__objc_data", 0x20000, objc_data);

    let mut objc_const = Vec::new();
    objc_const.extend(
        BytesBuilder::new(endian)
            .u32(24)
            .u32(1)
            .u64(0x50010)
            .u64(0)
            .u64(0x7000)
            .build(),
    );
    image.add_section("__DATA", "__objc_const", 0x40100, objc_const);

    image.add_region(
        0x30000,
        objc2_class_rw_64(endian, RW_REALIZED | RW_COPIED_RO, 0x60000),
    );
    image.add_region(0x30040, objc2_class_rw_64(endian, 0, 0));

    // The heap copy of the ro data.
    image.add_region(0x60000, objc2_class_ro_64(endian, 0x50000, 0x40100));

    image.add_cstring(0x50000, "Heap");
    image.add_cstring(0x50010, "boom");

    image
}

/// A 64-bit image whose method list uses an entry size larger than the
/// record: iteration must stride by entsize and read fields from the front
/// of each entry.
pub fn objc2_wide_entsize_image() -> TestImage {
    let endian = Endian::Little;
    let mut image = TestImage::new("objc2-wide.dylib", Arch::Amd64, endian);

    image.add_section(
        "__DATA",
        "__objc_classlist",
        0x10000,
        BytesBuilder::new(endian).u64(0x20000).build(),
    );
    image.add_section("__DATA", "__objc_catlist", 0x11000, Vec::new());

    let mut objc_data = Vec::new();
    objc_data.extend(objc2_class_64(endian, 0x20028, 0x30000));
    objc_data.extend(objc2_class_64(endian, 0, 0x30040));
    image.add_section("__DATA", "__objc_data", 0x20000, objc_data);

    let mut objc_const = Vec::new();
    objc_const.extend(objc2_class_ro_64(endian, 0x50000, 0x40100));
    objc_const.extend(BytesBuilder::new(endian).pad(0x100 - 72).build());
    objc_const.extend(
        // entsize 32 with flag bits set in the low bits; each record is the
        // usual 24 bytes followed by 8 bytes of padding.
        BytesBuilder::new(endian)
            .u32(32 | 3)
            .u32(2)
            .u64(0x50010)
            .u64(0)
            .u64(0x9000)
            .pad(8)
            .u64(0x50020)
            .u64(0)
            .u64(0xa000)
            .pad(8)
            .build(),
    );
    image.add_section("__DATA", "__objc_const", 0x40000, objc_const);

    image.add_region(0x30000, objc2_class_rw_64(endian, RW_REALIZED, 0x40000));
    image.add_region(0x30040, objc2_class_rw_64(endian, 0, 0));

    image.add_cstring(0x50000, "Wide");
    image.add_cstring(0x50010, "first");
    image.add_cstring(0x50020, "second");

    image
}

/// A 64-bit image whose class has a method list with `count == 0`.
pub fn objc2_empty_list_image() -> TestImage {
    let endian = Endian::Little;
    let mut image = TestImage::new("objc2-empty.dylib", Arch::Amd64, endian);

    image.add_section(
        "__DATA",
        "__objc_classlist",
        0x10000,
        BytesBuilder::new(endian).u64(0x20000).build(),
    );
    image.add_section("__DATA", "__objc_catlist", 0x11000, Vec::new());

    let mut objc_data = Vec::new();
    objc_data.extend(objc2_class_64(endian, 0x20028, 0x30000));
    objc_data.extend(objc2_class_64(endian, 0, 0x30040));
    image.add_section("__DATA", "__objc_data", 0x20000, objc_data);

    let mut objc_const = Vec::new();
    objc_const.extend(objc2_class_ro_64(endian, 0x50000, 0x40100));
    objc_const.extend(BytesBuilder::new(endian).pad(0x100 - 72).build());
    objc_const.extend(BytesBuilder::new(endian).u32(24).u32(0).build());
    image.add_section("__DATA", "__objc_const", 0x40000, objc_const);

    image.add_region(0x30000, objc2_class_rw_64(endian, RW_REALIZED, 0x40000));
    image.add_region(0x30040, objc2_class_rw_64(endian, 0, 0));

    image.add_cstring(0x50000, "Empty");

    image
}

/// A 64-bit image whose only class is unrealized.
pub fn objc2_unrealized_image() -> TestImage {
    let endian = Endian::Little;
    let mut image = TestImage::new("objc2-unrealized.dylib", Arch::Amd64, endian);

    image.add_section(
        "__DATA",
        "__objc_classlist",
        0x10000,
        BytesBuilder::new(endian).u64(0x20000).build(),
    );
    image.add_section("__DATA", "__objc_catlist", 0x11000, Vec::new());

    let mut objc_data = Vec::new();
    objc_data.extend(objc2_class_64(endian, 0x20028, 0x30000));
    objc_data.extend(objc2_class_64(endian, 0, 0x30040));
    image.add_section("__DATA", "__objc_data", 0x20000, objc_data);

    image.add_section("__DATA", "__objc_const", 0x40000, vec![0; 0x100]);

    image.add_region(0x30000, objc2_class_rw_64(endian, 0, 0));
    image.add_region(0x30040, objc2_class_rw_64(endian, 0, 0));

    image
}

/// An image with a class list but no `__objc_data` section: malformed.
pub fn objc2_missing_data_image() -> TestImage {
    let endian = Endian::Little;
    let mut image = TestImage::new("objc2-torn.dylib", Arch::Amd64, endian);

    image.add_section("__DATA", "__objc_const", 0x40000, vec![0; 0x10]);
    image.add_section(
        "__DATA",
        "__objc_classlist",
        0x10000,
        BytesBuilder::new(endian).u64(0x20000).build(),
    );
    image.add_section("__DATA", "__objc_catlist", 0x11000, Vec::new());

    image
}
