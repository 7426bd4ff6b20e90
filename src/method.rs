//! Method descriptors.
//!
//! A gRPC method is addressed as `/<service>/<method>` on the wire, where
//! `<service>` is the fully qualified service name such as
//! `helloworld.Greeter`. The routing key stored in the registry is the path
//! without its leading slash.

use std::fmt;

use crate::registry::RegistryError;

/// Streaming shape of a method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MethodType {
    /// One request, one response.
    #[default]
    Unary,
    /// Many requests, one response.
    ClientStreaming,
    /// One request, many responses.
    ServerStreaming,
    /// Many requests, many responses.
    BidiStreaming,
}

impl MethodType {
    /// Whether the client may send more than one message.
    #[must_use]
    pub fn client_sends_one(self) -> bool {
        matches!(self, MethodType::Unary | MethodType::ServerStreaming)
    }

    /// Whether the server may send more than one message.
    #[must_use]
    pub fn server_sends_one(self) -> bool {
        matches!(self, MethodType::Unary | MethodType::ClientStreaming)
    }
}

/// Immutable description of one method.
///
/// # Examples
///
/// ```
/// use grpcwire::method::{MethodDescriptor, MethodType};
///
/// let method = MethodDescriptor::parse("helloworld.Greeter/SayHello", MethodType::Unary)
///     .expect("valid name");
/// assert_eq!(method.service_name(), "helloworld.Greeter");
/// assert_eq!(method.method_name(), "SayHello");
/// assert_eq!(method.path(), "/helloworld.Greeter/SayHello");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    full_name: String,
    split: usize,
    method_type: MethodType,
}

impl MethodDescriptor {
    /// Build a descriptor from its service and method names.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] if either part is empty or
    /// contains `/`.
    pub fn new(service: &str, method: &str, method_type: MethodType) -> Result<Self, RegistryError> {
        Self::parse(&format!("{service}/{method}"), method_type)
    }

    /// Parse a `service/method` routing key.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] unless `full_name` holds exactly
    /// one `/` with non-empty text on both sides.
    pub fn parse(full_name: &str, method_type: MethodType) -> Result<Self, RegistryError> {
        let invalid = || RegistryError::InvalidName(full_name.to_owned());
        let (service, method) = full_name.split_once('/').ok_or_else(invalid)?;
        if service.is_empty() || method.is_empty() || method.contains('/') {
            return Err(invalid());
        }
        Ok(Self {
            full_name: full_name.to_owned(),
            split: service.len(),
            method_type,
        })
    }

    /// Routing key, `service/method`.
    #[must_use]
    pub fn full_name(&self) -> &str { &self.full_name }

    #[must_use]
    pub fn service_name(&self) -> &str { &self.full_name[..self.split] }

    #[must_use]
    pub fn method_name(&self) -> &str { &self.full_name[self.split + 1..] }

    /// HTTP path, `/service/method`.
    #[must_use]
    pub fn path(&self) -> String { format!("/{}", self.full_name) }

    #[must_use]
    pub fn method_type(&self) -> MethodType { self.method_type }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.full_name) }
}
