//! Dispatcher configuration.
//!
//! Every field has a default, so a partial document deserializes cleanly.
//!
//! ```
//! use grpcwire::config::DispatcherConfig;
//!
//! let config = DispatcherConfig {
//!     max_inbound_message_size: 1024,
//!     ..DispatcherConfig::default()
//! };
//! assert_eq!(config.deframer_config().max_inbound_message_size, 1024);
//! assert!(!config.compress_responses);
//! ```

use serde::Deserialize;

use crate::{
    deframer::{DEFAULT_MAX_BUFFERED_BYTES, DEFAULT_MAX_MESSAGE_SIZE, DeframerConfig},
    transport::DEFAULT_BODY_CHANNEL_CAPACITY,
};

/// Limits and switches applied to every call.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Largest request message, before and after decompression.
    pub max_inbound_message_size: usize,
    /// Largest framed response message.
    pub max_outbound_message_size: usize,
    /// Cap on bytes held in an incomplete frame per call. `None` disables it.
    pub max_buffered_bytes: Option<usize>,
    /// Capacity of channels made by
    /// [`Dispatcher::body_channel`](crate::dispatcher::Dispatcher::body_channel).
    pub body_channel_capacity: usize,
    /// Compress responses when the client accepts a known encoding.
    pub compress_responses: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_inbound_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_outbound_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_buffered_bytes: Some(DEFAULT_MAX_BUFFERED_BYTES),
            body_channel_capacity: DEFAULT_BODY_CHANNEL_CAPACITY,
            compress_responses: false,
        }
    }
}

impl DispatcherConfig {
    /// Limits for each call's deframer.
    #[must_use]
    pub fn deframer_config(&self) -> DeframerConfig {
        DeframerConfig {
            max_inbound_message_size: self.max_inbound_message_size,
            max_buffered_bytes: self.max_buffered_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::de::value::{Error as ValueError, MapDeserializer};

    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let config = DispatcherConfig::default();
        assert_eq!(config.max_inbound_message_size, 4 * 1024 * 1024);
        assert_eq!(config.max_outbound_message_size, 4 * 1024 * 1024);
        assert_eq!(config.max_buffered_bytes, Some(16 * 1024 * 1024));
        assert_eq!(config.body_channel_capacity, 16);
        assert!(!config.compress_responses);
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let entries = vec![("max_inbound_message_size", 1024_usize)];
        let deserializer: MapDeserializer<'_, _, ValueError> =
            MapDeserializer::new(entries.into_iter());
        let config = DispatcherConfig::deserialize(deserializer).expect("deserialize");

        assert_eq!(config.max_inbound_message_size, 1024);
        assert_eq!(
            config.max_outbound_message_size,
            DispatcherConfig::default().max_outbound_message_size
        );
        assert_eq!(config.deframer_config().max_inbound_message_size, 1024);
    }
}
