//! Symbolicates an address against a synthetic Objective-C image.
//!
//! Builds a small in-memory image containing one class (`Greeter` with
//! `-wave` at 0x1000 and `-bow` at 0x2000) and prints the method whose
//! implementation covers the given address.

use anyhow::Result;
use clap::Parser;
use crashprobe_image::{Arch, Endian};
use crashprobe_objc::{ObjcCache, ObjcError};
use crashprobe_testutils::{BytesBuilder, TestImage};

#[derive(Debug, Parser)]
#[command(about = "Look up an Objective-C method by address")]
struct Args {
    /// The address to symbolicate, in hex.
    #[arg(default_value = "0x1500")]
    address: String,
}

fn demo_image() -> TestImage {
    let endian = Endian::Little;
    let mut image = TestImage::new("demo.dylib", Arch::X86, endian);

    image.add_section(
        "__OBJC",
        "__module_info",
        0x100,
        BytesBuilder::new(endian)
            .u32(7)
            .u32(16)
            .u32(0)
            .u32(0x200)
            .build(),
    );
    image.add_region(
        0x200,
        BytesBuilder::new(endian)
            .u32(0)
            .u32(0)
            .u16(1)
            .u16(0)
            .u32(0x300)
            .build(),
    );

    // The class and its metaclass, both with single method lists.
    for (address, methods) in [(0x300u64, 0x500u32), (0x400, 0)] {
        image.add_region(
            address,
            BytesBuilder::new(endian)
                .u32(if address == 0x300 { 0x400 } else { 0 })
                .u32(0)
                .u32(0x600) // name
                .u32(0)
                .u32(0x4000) // CLS_NO_METHOD_ARRAY
                .u32(0)
                .u32(0)
                .u32(methods)
                .u32(0)
                .u32(0)
                .build(),
        );
    }

    image.add_region(
        0x500,
        BytesBuilder::new(endian)
            .u32(0)
            .u32(2)
            .u32(0x610)
            .u32(0)
            .u32(0x1000)
            .u32(0x620)
            .u32(0)
            .u32(0x2000)
            .build(),
    );

    image.add_cstring(0x600, "Greeter");
    image.add_cstring(0x610, "wave");
    image.add_cstring(0x620, "bow");

    image
}

fn main() -> Result<()> {
    let args = Args::parse();
    let address = u64::from_str_radix(args.address.trim_start_matches("0x"), 16)?;

    let image = demo_image();
    let mut cache = ObjcCache::new();

    let result = cache.find_method(&image, address, |method| {
        let mut class_buf = [0u8; 128];
        let mut method_buf = [0u8; 128];
        let class = method.class_name.read(&mut class_buf).unwrap_or("?");
        let name = method.method_name.read(&mut method_buf).unwrap_or("?");
        let sigil = if method.is_meta_class { '+' } else { '-' };
        println!("0x{address:x}: {sigil}[{class} {name}] (imp 0x{:x})", method.imp);
    });

    match result {
        Ok(()) => Ok(()),
        Err(ObjcError::NotFound) => {
            println!("0x{address:x}: no Objective-C method found");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
