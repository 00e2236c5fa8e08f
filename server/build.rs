use std::io::Result;

fn main() -> Result<()> {
    let proto_files = &["proto/delivery.proto", "proto/auth.proto"];
    let includes = &["proto"];

    // Use the bundled protoc unless the environment already points at one
    if std::env::var_os("PROTOC").is_none() {
        if let Ok(path) = protoc_bin_vendored::protoc_bin_path() {
            std::env::set_var("PROTOC", path);
        }
    }

    tonic_build::configure()
        .type_attribute(
            ".realtime.v1",
            "#[derive(serde::Serialize)] #[serde(rename_all = \"camelCase\")]",
        )
        .compile_protos(proto_files, includes)?;

    // Recompile if any proto file changes
    for proto in proto_files {
        println!("cargo:rerun-if-changed={}", proto);
    }

    Ok(())
}
