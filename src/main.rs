//! Diagnostic binary for `grpcwire`.
//!
//! `grpcwire decode <FILE>` runs a captured request body through the deframer
//! and prints one line per message. The exit status is non-zero if the body
//! is malformed or truncated.

mod cli;

use std::{
    fmt::Write as _,
    fs,
    io::{self, Write},
    num::NonZeroUsize,
    process::ExitCode,
    sync::Arc,
};

use bytes::Bytes;
use clap::Parser;
use cli::{Cli, Command, DecodeArgs};
use grpcwire::{
    compression::{Decompressor, Gzip},
    deframer::{Deframer, DeframerConfig, DeframerEvent, EventQueue},
};

fn main() -> ExitCode {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Decode(args) => match decode(&args) {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(e) => {
                eprintln!("grpcwire: {}: {e}", args.file.display());
                ExitCode::from(2)
            }
        },
    }
}

/// Returns `Ok(false)` when the body did not deframe cleanly.
fn decode(args: &DecodeArgs) -> io::Result<bool> {
    let body = Bytes::from(fs::read(&args.file)?);
    let decompressor = args
        .gzip
        .then(|| Arc::new(Gzip) as Arc<dyn Decompressor>);
    let config = DeframerConfig {
        max_inbound_message_size: args.max_message_size,
        max_buffered_bytes: None,
    };
    let mut deframer = Deframer::new(EventQueue::new(), decompressor, config);
    let chunk_size = args
        .chunk_size
        .map_or(body.len().max(1), NonZeroUsize::get);

    let mut out = io::stdout().lock();
    let mut report = Report::new(args.preview);
    let mut offset = 0;
    while offset < body.len() && !deframer.is_closed() {
        let end = (offset + chunk_size).min(body.len());
        deframer.deframe(body.slice(offset..end));
        offset = end;
        report.drain(&mut out, &mut deframer)?;
    }
    deframer.close_when_complete();
    report.drain(&mut out, &mut deframer)?;
    writeln!(out, "{} message(s)", report.messages)?;
    Ok(report.clean)
}

struct Report {
    preview: usize,
    messages: usize,
    clean: bool,
}

impl Report {
    fn new(preview: usize) -> Self {
        Self {
            preview,
            messages: 0,
            clean: true,
        }
    }

    fn drain(&mut self, out: &mut impl Write, deframer: &mut Deframer<EventQueue>) -> io::Result<()> {
        while let Some(event) = deframer.listener_mut().pop() {
            match event {
                DeframerEvent::Message(message) => {
                    writeln!(
                        out,
                        "#{} {} bytes {}",
                        self.messages,
                        message.len(),
                        hex_preview(&message, self.preview)
                    )?;
                    self.messages += 1;
                }
                DeframerEvent::Closed {
                    has_partial_message: true,
                } => {
                    writeln!(out, "error: body ends mid-frame")?;
                    self.clean = false;
                }
                DeframerEvent::Closed { .. } => {}
                DeframerEvent::Failed(status) => {
                    writeln!(out, "error: {status}")?;
                    self.clean = false;
                }
            }
        }
        Ok(())
    }
}

fn hex_preview(message: &[u8], limit: usize) -> String {
    let mut hex = String::with_capacity(limit.min(message.len()) * 2 + 3);
    for byte in message.iter().take(limit) {
        let _ = write!(hex, "{byte:02x}");
    }
    if message.len() > limit {
        hex.push_str("...");
    }
    hex
}
