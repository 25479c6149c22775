use std::env;
use std::path::PathBuf;

/// Generate `include/roundtrip.h` from the `extern "C"` surface.
fn main() {
    println!("cargo:rerun-if-changed=src");

    let crate_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => return,
    };
    let result = cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("ROUNDTRIP_H")
        .with_pragma_once(true)
        .with_documentation(true)
        .generate();
    match result {
        Ok(bindings) => {
            bindings.write_to_file(crate_dir.join("include").join("roundtrip.h"));
        }
        // A missing header must not break the Rust build.
        Err(err) => println!("cargo:warning=cbindgen: {err}"),
    }
}
