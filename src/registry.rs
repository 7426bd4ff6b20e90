//! Static method registry.
//!
//! Services are composed up front with [`ServiceDefinition`] and collected
//! into a [`MethodRegistry`]. The registry is immutable once built; the
//! dispatcher shares it behind an `Arc` and reads it without locking.

use std::{collections::HashMap, fmt, sync::Arc};

use thiserror::Error;

use crate::{
    call::CallHandler,
    method::{MethodDescriptor, MethodType},
};

/// Errors raised while composing services.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    /// A method name is not of the form `service/method`.
    #[error("invalid method name: {0:?}")]
    InvalidName(String),
    /// A method was registered twice.
    #[error("method {0} was already registered")]
    DuplicateMethod(String),
}

/// A method paired with the handler that serves it.
#[derive(Clone)]
pub struct ServerMethodDefinition {
    descriptor: MethodDescriptor,
    handler: Arc<dyn CallHandler>,
}

impl ServerMethodDefinition {
    #[must_use]
    pub fn new(descriptor: MethodDescriptor, handler: Arc<dyn CallHandler>) -> Self {
        Self {
            descriptor,
            handler,
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> &MethodDescriptor { &self.descriptor }

    #[must_use]
    pub fn handler(&self) -> &Arc<dyn CallHandler> { &self.handler }
}

impl fmt::Debug for ServerMethodDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerMethodDefinition")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Builder for the methods of one service.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use grpcwire::{
///     call::unary,
///     method::MethodType,
///     registry::{MethodRegistry, ServiceDefinition},
/// };
///
/// let service = ServiceDefinition::new("echo.Echo")
///     .method("Say", MethodType::Unary, unary(|req: Bytes| async move { Ok(req) }))
///     .expect("valid method");
/// let registry = MethodRegistry::new()
///     .add_service(service)
///     .expect("no duplicates");
/// assert!(registry.lookup("echo.Echo/Say").is_some());
/// ```
#[derive(Debug)]
pub struct ServiceDefinition {
    name: String,
    methods: Vec<ServerMethodDefinition>,
}

impl ServiceDefinition {
    /// Start a service named `name`, e.g. `helloworld.Greeter`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Add a method served by `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] for a malformed name and
    /// [`RegistryError::DuplicateMethod`] if `method` was already added.
    pub fn method<H>(
        mut self,
        method: &str,
        method_type: MethodType,
        handler: H,
    ) -> Result<Self, RegistryError>
    where
        H: CallHandler + 'static,
    {
        let descriptor = MethodDescriptor::new(&self.name, method, method_type)?;
        if self
            .methods
            .iter()
            .any(|existing| existing.descriptor == descriptor)
        {
            return Err(RegistryError::DuplicateMethod(
                descriptor.full_name().to_owned(),
            ));
        }
        self.methods
            .push(ServerMethodDefinition::new(descriptor, Arc::new(handler)));
        Ok(self)
    }

    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    #[must_use]
    pub fn methods(&self) -> &[ServerMethodDefinition] { &self.methods }
}

/// Routing table from `service/method` to its definition.
#[derive(Debug, Default)]
pub struct MethodRegistry {
    methods: HashMap<String, Arc<ServerMethodDefinition>>,
}

impl MethodRegistry {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register every method of `service`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateMethod`] if any method is already
    /// registered. The registry is consumed in that case.
    pub fn add_service(self, service: ServiceDefinition) -> Result<Self, RegistryError> {
        service
            .methods
            .into_iter()
            .try_fold(self, MethodRegistry::add_method)
    }

    /// Register a single method.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateMethod`] if the routing key is taken.
    pub fn add_method(mut self, method: ServerMethodDefinition) -> Result<Self, RegistryError> {
        let key = method.descriptor.full_name().to_owned();
        if self.methods.contains_key(&key) {
            return Err(RegistryError::DuplicateMethod(key));
        }
        self.methods.insert(key, Arc::new(method));
        Ok(self)
    }

    /// Find the method for a routing key (the request path without its
    /// leading `/`).
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<Arc<ServerMethodDefinition>> {
        self.methods.get(key).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize { self.methods.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.methods.is_empty() }

    /// Registered routing keys in sorted order.
    #[must_use]
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
