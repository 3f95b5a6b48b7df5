//! Build script for proto compilation.
//!
//! Compiles `proto/provider.proto` into `OUT_DIR`; the crate pulls the result
//! in through `tonic::include_proto!`. Only the server side is generated since
//! the provider never dials the host.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/provider.proto");

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(false)
        .compile_protos(&["proto/provider.proto"], &["proto"])?;

    Ok(())
}
