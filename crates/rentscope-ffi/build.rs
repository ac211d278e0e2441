extern crate cbindgen;

use std::env;
use std::path::PathBuf;

fn main() {
    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap();

    // Generate C header for the host apps
    let output_file = PathBuf::from(&crate_dir)
        .join("include")
        .join("rentscope.h");

    std::fs::create_dir_all(output_file.parent().unwrap()).unwrap();

    cbindgen::Builder::new()
        .with_crate(crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("RENTSCOPE_H")
        .with_documentation(true)
        .generate()
        .expect("Unable to generate rentscope bindings")
        .write_to_file(output_file);
}
