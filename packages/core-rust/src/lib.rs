//! `MSBWizard` Core: operation router, method registry, handler contract,
//! and result envelopes.

pub mod config;
pub mod envelope;
pub mod handler;
pub mod object;
pub mod registry;
pub mod request;
pub mod router;

pub use config::RouterConfig;
pub use envelope::{Envelope, Response};
pub use handler::{Call, Handler};
pub use object::Object;
pub use registry::{BaseType, Introspect, MethodRegistry, MethodSet, RegistryError, TypeKey};
pub use request::{Attributes, Batch, Inbound, MalformedRequest, Request};
pub use router::{RegistrationError, Router};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
