//! Command line interface for the `grpcwire` binary.
//!
//! Kept free of library imports so the build script can render a man page
//! from it.

use std::{num::NonZeroUsize, path::PathBuf};

use clap::{Args, Parser, Subcommand};

/// Command line arguments for the `grpcwire` binary.
#[derive(Debug, Parser)]
#[command(name = "grpcwire", version, about = "Inspect gRPC message streams")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deframe a captured request body and list its messages.
    Decode(DecodeArgs),
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// File holding the raw body bytes.
    pub file: PathBuf,
    /// Feed the deframer this many bytes at a time instead of all at once.
    #[arg(short, long)]
    pub chunk_size: Option<NonZeroUsize>,
    /// Decompress frames flagged as compressed with gzip.
    #[arg(long)]
    pub gzip: bool,
    /// Largest message accepted, in bytes.
    #[arg(long, default_value_t = 4 * 1024 * 1024)]
    pub max_message_size: usize,
    /// Number of leading bytes of each message to print in hex.
    #[arg(long, default_value_t = 16)]
    pub preview: usize,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn parses_decode_options() {
        let cli = Cli::parse_from([
            "grpcwire",
            "decode",
            "body.bin",
            "--chunk-size",
            "3",
            "--gzip",
        ]);
        let Command::Decode(args) = cli.command;
        assert_eq!(args.file.to_str(), Some("body.bin"));
        assert_eq!(args.chunk_size.map(std::num::NonZeroUsize::get), Some(3));
        assert!(args.gzip);
        assert_eq!(args.max_message_size, 4 * 1024 * 1024);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(Cli::try_parse_from(["grpcwire", "decode", "x", "--chunk-size", "0"]).is_err());
    }
}
