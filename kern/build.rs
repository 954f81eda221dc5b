use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only the embedded target actually reads the `armv7m`/`armv8m` cfg this
    // exposes; a host build (the `arch::sim` backend `cargo test` links in)
    // has no M-profile to report and must not abort the build over it.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("none") {
        build_util::expose_m_profile();
    }

    let out = &PathBuf::from(env::var_os("OUT_DIR").unwrap());
    let mut const_file = File::create(out.join("consts.rs")).unwrap();

    // Return to Thread mode, use PSP, no floating-point extended frame.
    // This kernel never saves FPU state across a context switch (Non-goal:
    // no floating-point context switching), so every task's EXC_RETURN is
    // this same constant, unlike the FPU-aware 0xFFFFFFED the teacher uses.
    writeln!(const_file, "pub const EXC_RETURN_CONST : u32 = 0xFFFFFFFD;")
        .unwrap();
    Ok(())
}
