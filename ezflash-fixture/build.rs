// SPDX-License-Identifier: MIT

use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let workspace_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap())
        .parent()
        .unwrap()
        .to_path_buf();

    let linker_script = workspace_dir.join("linker_scripts/fixture_rp2040.x");
    let contents =
        fs::read_to_string(&linker_script).expect("Failed to read fixture_rp2040.x");
    fs::write(out_dir.join("memory.x"), contents).expect("Failed to write memory.x");

    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rustc-link-arg=-Tlink.x");
    println!("cargo:rustc-link-arg=-Tdefmt.x");
    println!("cargo:rerun-if-changed={}", linker_script.display());
    println!("cargo:rerun-if-changed=build.rs");

    // Payload image to burn into the target. `EZFLASH_PAYLOAD` points at a
    // raw binary; the bundled demo blob is used when it is unset.
    let payload = env::var("EZFLASH_PAYLOAD")
        .map(PathBuf::from)
        .unwrap_or_else(|_| workspace_dir.join("payload/demo.bin"));
    let payload = payload
        .canonicalize()
        .expect("payload image not found");
    println!("cargo:rustc-env=EZFLASH_PAYLOAD={}", payload.display());
    println!("cargo:rerun-if-env-changed=EZFLASH_PAYLOAD");
    println!("cargo:rerun-if-changed={}", payload.display());
}
