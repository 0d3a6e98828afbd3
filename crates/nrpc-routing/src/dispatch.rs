//! The dispatch table and schema registry shared by `ServerRouter` and
//! `ClientRouter`: decode against the declared method shape, invoke the
//! bound handler, encode the reply — or fall back to a default response and
//! an annotated error, per §4.6/§7 ("never bubble a dispatch failure to the
//! calling peer").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map as JsonMap, Value as Json};
use tokio::sync::Mutex;
use tracing::debug;

use nrpc_schema::{
    SchemaMethodEntry, SchemaRegistry, SchemaSnapshot, decode, default_value, encode,
};

use crate::binding::ServiceBinding;

pub struct Dispatcher {
    registry: Mutex<SchemaRegistry>,
    services: HashMap<String, ServiceBinding>,
    call_count: AtomicU64,
}

impl Dispatcher {
    pub fn new(mut registry: SchemaRegistry, services: Vec<ServiceBinding>) -> Self {
        let services = services
            .into_iter()
            .map(|binding| {
                registry.declare_service(binding.descriptor.clone());
                (binding.service_name().to_owned(), binding)
            })
            .collect();
        Self {
            registry: Mutex::new(registry),
            services,
            call_count: AtomicU64::new(0),
        }
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub async fn schema_snapshot(&self) -> SchemaSnapshot {
        self.registry.lock().await.get_schema()
    }

    pub async fn type_count(&self) -> usize {
        self.registry.lock().await.types().count()
    }

    pub async fn service_count(&self) -> usize {
        self.registry.lock().await.services().count()
    }

    pub async fn merge_peer_schema(&self, peer: &SchemaSnapshot) {
        self.registry.lock().await.merge_peer(peer);
    }

    pub async fn find_missing_methods(&self, peer_methods: &[SchemaMethodEntry]) {
        self.registry.lock().await.find_missing_methods(peer_methods);
    }

    /// Decodes `payload` against `service_name.method_name`'s declared
    /// request type, invokes the bound handler, and encodes the reply.
    /// Unknown routes, broken methods, decode failures, a missing handler,
    /// or a panicking handler are all indistinguishable to the caller: each
    /// annotates the registry and returns the method's default-valued
    /// response.
    pub async fn invoke(&self, service_name: &str, method_name: &str, payload: Json) -> Json {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        let (request_type, response_type) = {
            let mut registry = self.registry.lock().await;
            let Some(method) = registry.method(service_name, method_name) else {
                if let Some(service) = registry.service_mut(service_name) {
                    if service.service_errors.is_empty() {
                        service.service_errors =
                            format!("failed invocation: {service_name}.{method_name}");
                    }
                } else {
                    debug!(service_name, method_name, "call to unknown service");
                }
                return Json::Object(JsonMap::new());
            };
            if method.is_broken() {
                let response_type = method.response_type.clone();
                let default = default_value(registry.as_resolver(), &response_type);
                return encode(registry.as_resolver(), &response_type, &default)
                    .unwrap_or(Json::Null);
            }
            (method.request_type.clone(), method.response_type.clone())
        };

        let Some(binding) = self.services.get(service_name) else {
            let registry = self.registry.lock().await;
            let default = default_value(registry.as_resolver(), &response_type);
            return encode(registry.as_resolver(), &response_type, &default).unwrap_or(Json::Null);
        };

        let request_value = {
            let registry = self.registry.lock().await;
            decode(registry.as_resolver(), &request_type, &payload)
        };
        let request_value = match request_value {
            Ok(value) => value,
            Err(err) => {
                debug!(service_name, method_name, %err, "decode failed, returning default response");
                let registry = self.registry.lock().await;
                let default = default_value(registry.as_resolver(), &response_type);
                return encode(registry.as_resolver(), &response_type, &default)
                    .unwrap_or(Json::Null);
            }
        };

        let response_value = match binding.dispatch(method_name, request_value) {
            Some(value) => value,
            None => {
                let mut registry = self.registry.lock().await;
                if let Some(method) = registry
                    .service_mut(service_name)
                    .and_then(|s| s.methods.get_mut(method_name))
                {
                    if method.method_errors.is_empty() {
                        method.method_errors =
                            format!("failed invocation: {service_name}.{method_name}");
                    }
                }
                default_value(registry.as_resolver(), &response_type)
            }
        };

        let registry = self.registry.lock().await;
        encode(registry.as_resolver(), &response_type, &response_value).unwrap_or(Json::Null)
    }
}
