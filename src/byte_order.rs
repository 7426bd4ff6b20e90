//! Helpers for explicit network byte-order conversions.
//!
//! The gRPC length prefix is a big-endian `u32`. Keeping the conversion in
//! one place scopes the Clippy expectation to the wire boundary.

/// Serialise a `u32` in network byte order (big-endian).
///
/// # Examples
///
/// ```
/// use grpcwire::byte_order::write_network_u32;
///
/// assert_eq!(write_network_u32(0x1234_5678), [0x12, 0x34, 0x56, 0x78]);
/// ```
#[must_use]
pub fn write_network_u32(value: u32) -> [u8; 4] {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    value.to_be_bytes()
}

/// Parse a network-order `u32` from its on-wire representation.
///
/// # Examples
///
/// ```
/// use grpcwire::byte_order::read_network_u32;
///
/// assert_eq!(read_network_u32([0x00, 0x00, 0x00, 0x03]), 3);
/// ```
#[must_use]
pub fn read_network_u32(bytes: [u8; 4]) -> u32 {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    u32::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{read_network_u32, write_network_u32};

    #[rstest]
    #[case(0, [0, 0, 0, 0])]
    #[case(3, [0, 0, 0, 3])]
    #[case(0x0100_0000, [1, 0, 0, 0])]
    #[case(u32::MAX, [0xff, 0xff, 0xff, 0xff])]
    fn length_prefix_uses_network_order(#[case] value: u32, #[case] wire: [u8; 4]) {
        assert_eq!(write_network_u32(value), wire);
        assert_eq!(read_network_u32(wire), value);
    }
}
