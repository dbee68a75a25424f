//! Operation routing: dispatches requests to handlers by operation name.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, info_span, warn};

use crate::config::RouterConfig;
use crate::envelope::{Envelope, Response};
use crate::handler::{ErasedHandler, Handler, HandlerAdapter, Payload};
use crate::object::Object;
use crate::registry::{BaseType, MethodRegistry, MethodSet, RegistryError, TypeKey};
use crate::request::{Batch, Inbound, Request, MISSING_SUB_OPERATION, NO_OPERATION};

type BoxedHandler<O> = Box<dyn ErasedHandler<O>>;

/// Errors raised while configuring a router.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("Operation name must be a non-empty string")]
    InvalidOperationName,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Routes requests to the handler bound to their operation name.
///
/// The router owns the operation table, the declared base types and the
/// method registry derived from both, plus an optional managing object used
/// as the target of requests that do not name one. Configuration errors are
/// returned to the caller; request errors never are: every dispatch path
/// produces an `Envelope`.
pub struct Router<O: Object> {
    config: RouterConfig,
    managing_object: Option<O>,
    base_types: Vec<BaseType>,
    operations: HashMap<String, BoxedHandler<O>>,
    /// Registration order, for deterministic listing and registry builds.
    order: Vec<String>,
    registry: MethodRegistry,
}

impl<O: Object> Router<O> {
    /// Create a router with no base types and no operations.
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        Self::with_base_types(config, Vec::new())
    }

    /// Create a router that declares `base_types` up front.
    #[must_use]
    pub fn with_base_types(config: RouterConfig, base_types: impl IntoIterator<Item = BaseType>) -> Self {
        let mut router = Self {
            config,
            managing_object: None,
            base_types: Vec::new(),
            operations: HashMap::new(),
            order: Vec::new(),
            registry: MethodRegistry::default(),
        };
        for base in base_types {
            router.add_base_type(base);
        }
        router.rebuild_registry();
        info!(
            base_types = router.base_types.len(),
            strict = router.config.strict_type_check,
            "initialized router"
        );
        router
    }

    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.config.strict_type_check
    }

    // -- managing object ----------------------------------------------------

    /// Replace the managing object. A previously unseen type is declared as
    /// a base type and the registry is rebuilt.
    pub fn set_managing_object(&mut self, obj: O) {
        let base = obj.base_type();
        if self.add_base_type(base) {
            self.rebuild_registry();
        }
        info!(type_name = base.key.name(), "set managing object");
        self.managing_object = Some(obj);
    }

    /// Drop the managing object, returning it.
    pub fn take_managing_object(&mut self) -> Option<O> {
        self.managing_object.take()
    }

    #[must_use]
    pub fn managing_object(&self) -> Option<&O> {
        self.managing_object.as_ref()
    }

    // -- registration -------------------------------------------------------

    /// Bind `name` to `handler`. A name already bound is overwritten and
    /// keeps its original position in `get_supported_operations`.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::InvalidOperationName` if `name` is empty
    /// or whitespace. The router is left unchanged.
    pub fn register_operation<H: Handler<O>>(
        &mut self,
        name: &str,
        handler: H,
    ) -> Result<(), RegistrationError> {
        if name.trim().is_empty() {
            error!("operation name must be a non-empty string");
            return Err(RegistrationError::InvalidOperationName);
        }

        let handler: BoxedHandler<O> = Box::new(HandlerAdapter(handler));
        let handler_type = handler.type_key();
        if self.operations.insert(name.to_owned(), handler).is_some() {
            debug!(operation = name, "replaced existing operation binding");
        } else {
            self.order.push(name.to_owned());
        }
        self.rebuild_registry();
        info!(operation = name, handler = handler_type.name(), "registered operation");
        Ok(())
    }

    /// Rebuild the registry, optionally declaring more base types or
    /// dropping every operation first.
    pub fn update_registry(&mut self, additional: &[BaseType], clear_operations: bool) {
        if clear_operations {
            self.operations.clear();
            self.order.clear();
            info!("cleared all operations");
        }
        for base in additional {
            self.add_base_type(*base);
        }
        self.rebuild_registry();
        info!(types = self.registry.len(), "registry updated");
    }

    // -- queries ------------------------------------------------------------

    /// Methods registered for `key`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if the type has no registry entry.
    pub fn get_methods_for_type(&self, key: &TypeKey) -> Result<&MethodSet, RegistryError> {
        self.registry.methods_for(key).inspect_err(|e| error!("{e}"))
    }

    /// Methods registered for `T`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if `T` has no registry entry.
    pub fn methods_of<T: 'static>(&self) -> Result<&MethodSet, RegistryError> {
        self.get_methods_for_type(&TypeKey::of::<T>())
    }

    /// Operation names in registration order.
    #[must_use]
    pub fn get_supported_operations(&self) -> Vec<String> {
        self.order.clone()
    }

    #[must_use]
    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    #[must_use]
    pub fn base_types(&self) -> &[BaseType] {
        &self.base_types
    }

    // -- dispatch -----------------------------------------------------------

    /// Parse and dispatch a JSON request or batch.
    ///
    /// A panicking handler yields a failure envelope, but the process panic
    /// hook still reports the panic first.
    pub fn process_request(&self, request: &Value) -> Response
    where
        O: DeserializeOwned,
    {
        self.process_inbound(&Inbound::from_json(request))
    }

    /// Dispatch an already parsed request or batch.
    pub fn process_inbound(&self, inbound: &Inbound<O>) -> Response {
        match inbound {
            Inbound::Single(Ok(request)) => Response::Single(self.process(request)),
            Inbound::Single(Err(malformed)) => {
                error!(error = %malformed, "malformed request");
                Response::Single(Envelope::failure(malformed.object.clone(), None, &malformed.error))
            }
            Inbound::Batch(batch) => Response::Batch(self.process_batch(batch)),
        }
    }

    /// Dispatch every sub-request in order. A failing entry never affects
    /// its siblings.
    pub fn process_batch(&self, batch: &Batch<O>) -> Vec<(String, Envelope)> {
        info!(size = batch.len(), "processing batch");
        batch
            .iter()
            .map(|(id, entry)| {
                let envelope = match entry {
                    Err(malformed) => {
                        error!(request_id = id, error = %malformed, "malformed sub-request");
                        Envelope::failure(malformed.object.clone(), None, &malformed.error)
                    }
                    Ok(request) if request.operation.is_none() => {
                        error!(request_id = id, "missing 'operation' in sub-request");
                        Envelope::failure(echo(request), None, MISSING_SUB_OPERATION)
                    }
                    Ok(request) => self.process(request),
                };
                (id.to_owned(), envelope)
            })
            .collect()
    }

    /// Dispatch a single request.
    pub fn process(&self, request: &Request<O>) -> Envelope {
        let Some(operation) = request.operation.as_deref().filter(|op| !op.is_empty()) else {
            error!("{NO_OPERATION}");
            return Envelope::failure(echo(request), None, NO_OPERATION);
        };

        let Some(handler) = self.operations.get(operation) else {
            let message = format!("Operation '{operation}' not registered");
            error!("{message}");
            return Envelope::failure(echo(request), None, message);
        };

        let Some(object) = request.obj.clone().or_else(|| self.managing_object.clone()) else {
            error!(operation, "no request object or managing object provided");
            return Envelope::failure(None, None, "No object provided");
        };

        let type_key = object.type_key();
        if self.config.strict_type_check && !self.registry.contains(&type_key) {
            let message = format!("Unsupported object type: {}", type_key.name());
            error!(operation, "{message}");
            return Envelope::failure(echo(request), None, message);
        }

        let method = request.method.clone().filter(|m| !m.is_empty());
        let has_attributes = request.attributes.as_ref().is_some_and(|a| !a.is_empty());
        let attributes = if has_attributes || method.is_some() {
            Some(request.attributes.clone().unwrap_or_default())
        } else {
            None
        };

        self.dispatch(
            operation,
            handler.as_ref(),
            Payload {
                object,
                attributes,
                method,
            },
        )
    }

    /// Invoke a handler. The only place where handler errors and panics are
    /// converted into envelopes.
    ///
    /// `catch_unwind` does not silence the process panic hook, which still
    /// runs before the unwind is caught. Binaries that do not want the
    /// default stderr report install their own hook.
    fn dispatch(&self, operation: &str, handler: &dyn ErasedHandler<O>, payload: Payload<O>) -> Envelope {
        let label = payload.object.label();
        let object_type = payload.object.type_key().name();
        let span = info_span!(
            "operation",
            operation,
            object_type,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );
        let _entered = span.enter();
        let start = Instant::now();

        let managing = self.managing_object.as_ref();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            handler.call(operation, payload, managing)
        }));

        let envelope = match result {
            Ok(Ok(envelope)) => envelope.normalize(operation),
            Ok(Err(err)) => {
                error!(operation, error = %err, "handler execution failed");
                Envelope::failure(label, None, err.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(operation, error = %message, "handler panicked");
                Envelope::failure(label, None, message)
            }
        };

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;
        let outcome = if envelope.status { "ok" } else { "error" };
        span.record("duration_ms", duration_ms);
        span.record("outcome", outcome);
        if envelope.status {
            debug!(operation, duration_ms, "operation complete");
        } else {
            warn!(operation, duration_ms, error = envelope.error.as_deref(), "operation failed");
        }
        envelope
    }

    // -- internals ----------------------------------------------------------

    /// Declare a base type. Returns `true` if it was not known before.
    fn add_base_type(&mut self, base: BaseType) -> bool {
        if self.base_types.iter().any(|known| known.key == base.key) {
            return false;
        }
        self.base_types.push(base);
        true
    }

    fn rebuild_registry(&mut self) {
        let handlers = self
            .order
            .iter()
            .filter_map(|name| self.operations.get(name))
            .map(|handler| (handler.type_key(), handler.public_methods()));
        let registry = MethodRegistry::build(handlers, &self.base_types);
        self.registry = registry;
    }
}

impl<O: Object> Default for Router<O> {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

impl<O: Object> fmt::Debug for Router<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field(
                "managing_object",
                &self.managing_object.as_ref().map(|obj| obj.type_key().name()),
            )
            .field("operations", &self.order)
            .field("strict_type_check", &self.config.strict_type_check)
            .finish_non_exhaustive()
    }
}

fn echo<O: Object>(request: &Request<O>) -> Option<String> {
    request.obj.as_ref().and_then(Object::label)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_owned()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
