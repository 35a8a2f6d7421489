use std::{env, fs, path::PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=schemas");

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let out_schemas = out_dir.join("schemas");
    println!("cargo:rustc-env=OUT_SCHEMAS={}", out_schemas.display());
    fs::create_dir_all(&out_schemas).expect("failed to create schema output directory");

    // Only SDL files are embedded; the supergraph config is read at runtime.
    for entry in fs::read_dir("schemas").expect("schemas directory is missing") {
        let path = entry.expect("unreadable schemas entry").path();
        if path.extension().is_some_and(|ext| ext == "graphql") {
            let file_name = path.file_name().expect("schema file has a name");
            fs::copy(&path, out_schemas.join(file_name)).expect("failed to copy schema file");
        }
    }
}
