use kernel_info::memory::{IDENTITY_LOW_BYTES, KERNEL_BASE, PHYS_LOAD};
use std::{env, path::PathBuf};

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("set by cargo"));
    let ld = manifest_dir.join("kernel.ld");

    assert_eq!(
        KERNEL_BASE & ((1u64 << 21) - 1),
        0,
        "KERNEL_BASE must be 2 MiB aligned (got {KERNEL_BASE:#x})"
    );
    assert_eq!(
        PHYS_LOAD & 0xfff,
        0,
        "PHYS_LOAD must be 4 KiB aligned (got {PHYS_LOAD:#x})"
    );
    // The AP landing code in `.text.boot` runs on the identity mapping.
    assert!(
        PHYS_LOAD < IDENTITY_LOW_BYTES,
        "the start of the kernel image must be identity mapped"
    );

    println!("cargo:rerun-if-changed={}", ld.display());
    println!("cargo:rustc-link-arg-bins=-T{}", ld.display());
    println!("cargo:rustc-link-arg-bins=--defsym=KERNEL_BASE={KERNEL_BASE:#x}");
    println!("cargo:rustc-link-arg-bins=--defsym=PHYS_LOAD={PHYS_LOAD:#x}");
}
