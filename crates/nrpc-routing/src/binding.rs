//! Explicit, developer-authored dispatch tables.
//!
//! Per Design Note "Handler dispatch", a `ServiceBinding` pairs a
//! `ServiceDescriptor` with a `HashMap` from method name to a boxed
//! `DispatchFn` built through [`ServiceBindingBuilder`] — never introspected
//! from a Rust type's methods the way the original reached for `inspect`.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use nrpc_protocol::Value;
use nrpc_schema::{MethodDescriptor, ServiceDescriptor};

/// A handler for one method: decoded request in, response value out.
pub type DispatchFn = Box<dyn Fn(Value) -> Value + Send + Sync>;

/// A bound service: its descriptor plus the handlers answering its methods.
pub struct ServiceBinding {
    pub descriptor: ServiceDescriptor,
    handlers: HashMap<String, DispatchFn>,
}

impl ServiceBinding {
    pub fn builder(service_name: impl Into<String>) -> ServiceBindingBuilder {
        ServiceBindingBuilder {
            descriptor: ServiceDescriptor::new(service_name),
            handlers: HashMap::new(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.descriptor.service_name
    }

    /// Invokes the handler bound to `method_name`. `None` means either the
    /// method isn't bound locally or its handler panicked — both are
    /// treated identically by the caller (§4.6's "a panicking handler is
    /// treated the same as a missing one").
    pub fn dispatch(&self, method_name: &str, request: Value) -> Option<Value> {
        let handler = self.handlers.get(method_name)?;
        panic::catch_unwind(AssertUnwindSafe(|| handler(request))).ok()
    }
}

pub struct ServiceBindingBuilder {
    descriptor: ServiceDescriptor,
    handlers: HashMap<String, DispatchFn>,
}

impl ServiceBindingBuilder {
    pub fn method(
        mut self,
        method: MethodDescriptor,
        handler: impl Fn(Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(method.method_name.clone(), Box::new(handler));
        self.descriptor = self.descriptor.with_method(method);
        self
    }

    pub fn build(mut self) -> ServiceBinding {
        self.descriptor.has_server = true;
        ServiceBinding {
            descriptor: self.descriptor,
            handlers: self.handlers,
        }
    }
}
