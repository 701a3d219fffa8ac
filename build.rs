fn main() {
    println!("cargo:rerun-if-changed=kernel.ld");
    println!("cargo:rerun-if-changed=src/asm/entry.S");
    println!("cargo:rerun-if-changed=src/asm/vectors.S");
    println!("cargo:rerun-if-changed=src/asm/switch.S");

    // The linker script only applies to the kernel image itself; host
    // builds (unit tests) link normally.
    if std::env::var("CARGO_CFG_TARGET_ARCH").as_deref() == Ok("arm") {
        println!("cargo:rustc-link-arg-bins=-Tkernel.ld");
    }
}
