//! Handler registry: service construction and method lookup.
//!
//! A [`Service`] is built fluently and handed to
//! [`HandlerRegistry::register`], which validates it and installs its
//! methods. Registration is a startup-time activity; the registry is
//! read-only once the server is running, so lookups take no lock.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use super::{BoxFuture, Handler, HandlerResult};
use crate::codec::{JsonCodec, PayloadCodec};
use crate::error::{MeshwireError, Result};
use crate::session::SessionRef;

/// Wrapper that deserializes the payload before calling the handler.
///
/// A payload that fails to deserialize is reported as `BadRequest`, which
/// the dispatcher turns into an error-kind response for requests.
pub struct TypedHandler<C, F, T, Fut>
where
    C: PayloadCodec,
    F: Fn(SessionRef, T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(C, T) -> Fut>,
}

impl<C, F, T, Fut> TypedHandler<C, F, T, Fut>
where
    C: PayloadCodec,
    F: Fn(SessionRef, T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<C, F, T, Fut> Handler for TypedHandler<C, F, T, Fut>
where
    C: PayloadCodec + 'static,
    F: Fn(SessionRef, T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, session: SessionRef, payload: Bytes) -> BoxFuture<'static, HandlerResult> {
        let parsed: T = match C::decode(&payload) {
            Ok(v) => v,
            Err(e) => {
                let err = MeshwireError::BadRequest(e.to_string());
                return Box::pin(async move { Err(err) });
            }
        };

        Box::pin((self.handler)(session, parsed))
    }
}

/// Wrapper for handlers that take the payload bytes untouched.
pub struct RawHandler<F, Fut>
where
    F: Fn(SessionRef, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
}

impl<F, Fut> RawHandler<F, Fut>
where
    F: Fn(SessionRef, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Create a new raw handler.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F, Fut> Handler for RawHandler<F, Fut>
where
    F: Fn(SessionRef, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, session: SessionRef, payload: Bytes) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(session, payload))
    }
}

/// Entry for one registered method.
pub struct HandlerMethod {
    handler: Box<dyn Handler>,
    /// Whether the method takes the payload as raw bytes.
    pub raw: bool,
}

impl HandlerMethod {
    /// Invoke the method.
    pub fn call(&self, session: SessionRef, payload: Bytes) -> BoxFuture<'static, HandlerResult> {
        self.handler.call(session, payload)
    }
}

/// A named component under construction.
///
/// Methods accumulate in insertion order; all validation happens at
/// registration so the fluent chain stays infallible.
pub struct Service {
    name: String,
    methods: Vec<(String, HandlerMethod)>,
}

impl Service {
    /// Start building a service with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Register a typed method decoding its payload as JSON.
    pub fn method<F, T, Fut>(self, name: &str, handler: F) -> Self
    where
        F: Fn(SessionRef, T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.method_with::<JsonCodec, F, T, Fut>(name, handler)
    }

    /// Register a typed method with an explicit payload codec.
    pub fn method_with<C, F, T, Fut>(mut self, name: &str, handler: F) -> Self
    where
        C: PayloadCodec + 'static,
        F: Fn(SessionRef, T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.methods.push((
            name.to_string(),
            HandlerMethod {
                handler: Box::new(TypedHandler::<C, F, T, Fut>::new(handler)),
                raw: false,
            },
        ));
        self
    }

    /// Register a method that receives the payload as raw bytes.
    pub fn raw_method<F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(SessionRef, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.methods.push((
            name.to_string(),
            HandlerMethod {
                handler: Box::new(RawHandler::new(handler)),
                raw: true,
            },
        ));
        self
    }
}

struct ServiceEntry {
    methods: HashMap<String, HandlerMethod>,
}

/// Registry mapping `service.method` to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    services: HashMap<String, ServiceEntry>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and install a service.
    ///
    /// # Errors
    ///
    /// Fails with `Registration` when the service name is empty or not an
    /// identifier, the service is already registered, a method name is
    /// invalid or duplicated, or the service has no methods at all.
    pub fn register(&mut self, service: Service) -> Result<()> {
        if !is_valid_name(&service.name) {
            return Err(MeshwireError::Registration(format!(
                "invalid service name {:?}",
                service.name
            )));
        }
        if self.services.contains_key(&service.name) {
            return Err(MeshwireError::Registration(format!(
                "service {:?} already registered",
                service.name
            )));
        }
        if service.methods.is_empty() {
            return Err(MeshwireError::Registration(format!(
                "service {:?} has no methods",
                service.name
            )));
        }

        let mut methods = HashMap::with_capacity(service.methods.len());
        for (name, method) in service.methods {
            if !is_valid_name(&name) {
                return Err(MeshwireError::Registration(format!(
                    "invalid method name {:?} on service {:?}",
                    name, service.name
                )));
            }
            if methods.insert(name.clone(), method).is_some() {
                return Err(MeshwireError::Registration(format!(
                    "method {:?} defined twice on service {:?}",
                    name, service.name
                )));
            }
        }

        self.services.insert(service.name, ServiceEntry { methods });
        Ok(())
    }

    /// Look up a method; a pure map read.
    pub fn lookup(&self, service: &str, method: &str) -> Option<&HandlerMethod> {
        self.services.get(service)?.methods.get(method)
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Log every registered `service.method` at debug level.
    pub fn dump(&self) {
        for (sname, entry) in &self.services {
            for mname in entry.methods.keys() {
                tracing::debug!("registered handler: {}.{}", sname, mname);
            }
        }
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
