//! Handler contract and the type-erased adapter the router stores.

use std::sync::Arc;

use anyhow::anyhow;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::envelope::Envelope;
use crate::object::Object;
use crate::registry::TypeKey;
use crate::request::Attributes;

// ---------------------------------------------------------------------------
// Call
// ---------------------------------------------------------------------------

/// Everything a handler receives for one dispatched request.
#[derive(Debug)]
pub struct Call<'a, O, P> {
    /// Name the handler was registered under.
    pub operation: &'a str,
    /// Resolved target: the request's `obj`, or the managing object.
    pub object: O,
    /// The router's managing object at dispatch time.
    pub managing_object: Option<&'a O>,
    /// Attributes parsed into the handler's parameter type.
    pub params: P,
    /// Private copy of the request attributes, if any were supplied.
    pub attributes: Option<Attributes>,
    /// Explicit method name from the request.
    pub method: Option<String>,
}

// ---------------------------------------------------------------------------
// Handler trait
// ---------------------------------------------------------------------------

/// A pluggable unit implementing one named operation.
///
/// Handlers pick their behaviour from the object's variant. They should
/// report domain failures as `Ok(Envelope::failure(..))`; an `Err` (or a
/// panic) is tolerated and converted by the router.
pub trait Handler<O: Object>: Send + Sync + 'static {
    /// Typed view of the request attributes. Absent attributes parse from `{}`.
    type Params: DeserializeOwned;

    /// Registry key of this handler.
    fn type_key(&self) -> TypeKey
    where
        Self: Sized,
    {
        TypeKey::of::<Self>()
    }

    /// Public methods reported by the registry besides `execute`.
    fn public_methods(&self) -> &'static [&'static str] {
        &[]
    }

    /// Run the operation.
    ///
    /// # Errors
    ///
    /// Any error is turned into a failing envelope by the router.
    fn execute(&self, call: Call<'_, O, Self::Params>) -> anyhow::Result<Envelope>;
}

impl<O: Object, H: Handler<O>> Handler<O> for Arc<H> {
    type Params = <H as Handler<O>>::Params;

    fn type_key(&self) -> TypeKey {
        Handler::<O>::type_key(&**self)
    }

    fn public_methods(&self) -> &'static [&'static str] {
        Handler::<O>::public_methods(&**self)
    }

    fn execute(&self, call: Call<'_, O, Self::Params>) -> anyhow::Result<Envelope> {
        Handler::<O>::execute(&**self, call)
    }
}

// ---------------------------------------------------------------------------
// Type-erased adapter
// ---------------------------------------------------------------------------

/// Payload built by the router for one dispatch.
#[derive(Debug)]
pub(crate) struct Payload<O> {
    pub object: O,
    pub attributes: Option<Attributes>,
    pub method: Option<String>,
}

/// Object-safe view of a `Handler` with its parameter type erased.
pub(crate) trait ErasedHandler<O>: Send + Sync {
    fn type_key(&self) -> TypeKey;
    fn public_methods(&self) -> &'static [&'static str];
    fn call(
        &self,
        operation: &str,
        payload: Payload<O>,
        managing_object: Option<&O>,
    ) -> anyhow::Result<Envelope>;
}

/// Wrapper that parses attributes into `H::Params` before calling `execute`.
pub(crate) struct HandlerAdapter<H>(pub H);

impl<O: Object, H: Handler<O>> ErasedHandler<O> for HandlerAdapter<H> {
    fn type_key(&self) -> TypeKey {
        Handler::<O>::type_key(&self.0)
    }

    fn public_methods(&self) -> &'static [&'static str] {
        Handler::<O>::public_methods(&self.0)
    }

    fn call(
        &self,
        operation: &str,
        payload: Payload<O>,
        managing_object: Option<&O>,
    ) -> anyhow::Result<Envelope> {
        let raw = Value::Object(payload.attributes.clone().unwrap_or_default());
        let params: <H as Handler<O>>::Params = serde_json::from_value(raw)
            .map_err(|e| anyhow!("Invalid attributes for operation '{operation}': {e}"))?;

        Handler::<O>::execute(&self.0, Call {
            operation,
            object: payload.object,
            managing_object,
            params,
            attributes: payload.attributes,
            method: payload.method,
        })
    }
}
