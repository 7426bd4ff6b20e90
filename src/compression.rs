//! Message compression and its registries.
//!
//! A gRPC peer names the encoding of compressed messages in the
//! `grpc-encoding` header. The registries map those names to
//! [`Compressor`] and [`Decompressor`] implementations. The `identity`
//! encoding never appears in a registry: it means "messages are not
//! compressed" and is represented by `None` wherever an optional
//! (de)compressor is held.

use std::{
    collections::BTreeMap,
    fmt,
    io::{self, Read, Write},
    sync::Arc,
};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};

/// Name of the no-op encoding.
pub const IDENTITY: &str = "identity";
/// Name of the gzip encoding.
pub const GZIP: &str = "gzip";

/// Decompresses message payloads for one encoding.
pub trait Decompressor: Send + Sync + fmt::Debug {
    /// Encoding name as it appears in `grpc-encoding`.
    fn encoding(&self) -> &str;

    /// Wrap `compressed` in a reader yielding the decompressed bytes.
    ///
    /// The caller bounds how much it reads, so implementations should stream
    /// rather than inflate eagerly.
    fn reader<'a>(&self, compressed: &'a [u8]) -> Box<dyn Read + 'a>;
}

/// Compresses message payloads for one encoding.
pub trait Compressor: Send + Sync + fmt::Debug {
    /// Encoding name as it appears in `grpc-encoding`.
    fn encoding(&self) -> &str;

    /// Compress `payload` into a new buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying encoder fails.
    fn compress(&self, payload: &[u8]) -> io::Result<Vec<u8>>;
}

/// The gzip codec, backed by `flate2`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Gzip;

impl Decompressor for Gzip {
    fn encoding(&self) -> &str { GZIP }

    fn reader<'a>(&self, compressed: &'a [u8]) -> Box<dyn Read + 'a> {
        Box::new(GzDecoder::new(compressed))
    }
}

impl Compressor for Gzip {
    fn encoding(&self) -> &str { GZIP }

    fn compress(&self, payload: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(payload.len() / 2), Compression::fast());
        encoder.write_all(payload)?;
        encoder.finish()
    }
}

/// Decompressors keyed by encoding name.
#[derive(Clone, Debug, Default)]
pub struct DecompressorRegistry {
    by_name: BTreeMap<String, Arc<dyn Decompressor>>,
}

impl DecompressorRegistry {
    /// Registry with no encodings beyond `identity`.
    #[must_use]
    pub fn empty() -> Self { Self::default() }

    /// Registry with the built-in gzip decompressor.
    #[must_use]
    pub fn with_defaults() -> Self { Self::empty().with(Arc::new(Gzip)) }

    /// Register `decompressor` under its encoding name, replacing any
    /// previous entry.
    #[must_use]
    pub fn with(mut self, decompressor: Arc<dyn Decompressor>) -> Self {
        self.by_name
            .insert(decompressor.encoding().to_owned(), decompressor);
        self
    }

    /// Look up a decompressor by encoding name.
    #[must_use]
    pub fn lookup(&self, encoding: &str) -> Option<Arc<dyn Decompressor>> {
        self.by_name.get(encoding).cloned()
    }

    /// Value for `grpc-accept-encoding`: `identity` followed by every
    /// registered encoding.
    #[must_use]
    pub fn advertised_encodings(&self) -> String {
        std::iter::once(IDENTITY)
            .chain(self.by_name.keys().map(String::as_str))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Compressors keyed by encoding name.
#[derive(Clone, Debug, Default)]
pub struct CompressorRegistry {
    by_name: BTreeMap<String, Arc<dyn Compressor>>,
}

impl CompressorRegistry {
    #[must_use]
    pub fn empty() -> Self { Self::default() }

    /// Registry with the built-in gzip compressor.
    #[must_use]
    pub fn with_defaults() -> Self { Self::empty().with(Arc::new(Gzip)) }

    #[must_use]
    pub fn with(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.by_name
            .insert(compressor.encoding().to_owned(), compressor);
        self
    }

    #[must_use]
    pub fn lookup(&self, encoding: &str) -> Option<Arc<dyn Compressor>> {
        self.by_name.get(encoding).cloned()
    }

    /// Pick the first encoding from a `grpc-accept-encoding` value that this
    /// registry can produce. `identity` and unknown names are skipped.
    #[must_use]
    pub fn negotiate(&self, accept_encoding: &str) -> Option<Arc<dyn Compressor>> {
        accept_encoding
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty() && *name != IDENTITY)
            .find_map(|name| self.lookup(name))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use rstest::rstest;

    use super::*;

    #[test]
    fn gzip_round_trips() {
        let payload = b"hello hello hello hello".repeat(8);
        let compressed = Gzip.compress(&payload).expect("compress");
        let mut out = Vec::new();
        Gzip.reader(&compressed)
            .read_to_end(&mut out)
            .expect("decompress");
        assert_eq!(out, payload);
    }

    #[test]
    fn corrupt_gzip_fails_to_read() {
        let mut out = Vec::new();
        let result = Gzip.reader(b"definitely not gzip").read_to_end(&mut out);
        assert!(result.is_err(), "corrupt input must fail");
    }

    #[test]
    fn default_registry_knows_gzip_only() {
        let registry = DecompressorRegistry::with_defaults();
        assert!(registry.lookup(GZIP).is_some());
        assert!(registry.lookup(IDENTITY).is_none());
        assert!(registry.lookup("snappy").is_none());
        assert_eq!(registry.advertised_encodings(), "identity,gzip");
    }

    #[test]
    fn empty_registry_advertises_identity() {
        assert_eq!(DecompressorRegistry::empty().advertised_encodings(), "identity");
    }

    #[rstest]
    #[case("gzip", Some(GZIP))]
    #[case("identity, gzip", Some(GZIP))]
    #[case("deflate,gzip", Some(GZIP))]
    #[case("identity", None)]
    #[case("", None)]
    #[case("snappy", None)]
    fn negotiates_response_encoding(#[case] accept: &str, #[case] expected: Option<&str>) {
        let registry = CompressorRegistry::with_defaults();
        let chosen = registry.negotiate(accept);
        assert_eq!(chosen.as_deref().map(Compressor::encoding), expected);
    }
}
