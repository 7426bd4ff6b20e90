//! Build script rendering the `grpcwire.1` manual page.
//!
//! The page documents the `grpcwire decode` subcommand, which deframes a
//! captured gRPC request body and reports each message. It is generated from
//! the `clap` definition in `src/cli.rs` into `target/generated-man`.

use std::{fs, path::PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
mod cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let out_dir = PathBuf::from("target/generated-man");
    fs::create_dir_all(&out_dir)?;

    let cmd = cli::Cli::command();
    let man = Man::new(cmd);
    let mut buf: Vec<u8> = Vec::new();
    man.render(&mut buf)?;
    fs::write(out_dir.join("grpcwire.1"), buf)?;

    Ok(())
}
