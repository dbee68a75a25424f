//! Wizard operation handlers.
//!
//! | Operation  | Handler          | Targets                 |
//! |------------|------------------|-------------------------|
//! | `manage`   | `BlockManager`   | block, project          |
//! | `generate` | `CodeGenerator`  | block, project          |
//! | `render`   | `CanvasRenderer` | block, project          |
//!
//! Without a `method` each handler picks its behaviour from the target's
//! variant. A request may name one of the handler's methods instead, either
//! by its full name or without the `<operation>_` prefix. `manage` also
//! applies the target type's own methods to the managed project.

pub mod generate;
pub mod manage;
pub mod render;

pub use generate::CodeGenerator;
pub use manage::BlockManager;
pub use render::{CanvasRenderer, Scene};

use msbwizard_core::{Call, Envelope, Object};
use serde_json::Value;
use tracing::error;

use crate::object::WizardObject;
use crate::project::SharedProject;

/// The managing object, if it is a project.
fn managing_project<'a, P>(call: &Call<'a, WizardObject, P>) -> Option<&'a SharedProject> {
    call.managing_object.and_then(WizardObject::as_project)
}

/// The project a project target stands for.
///
/// A project deserialized from a request is a detached copy; when it names
/// the managing project, the managing project is used instead.
fn live_project<'c, 'a: 'c, P>(
    project: &'c SharedProject,
    call: &Call<'a, WizardObject, P>,
) -> Result<&'c SharedProject, Envelope> {
    let Some(managing) = managing_project(call) else {
        return Ok(project);
    };
    if managing.ptr_eq(project) {
        return Ok(managing);
    }
    let requested = project.read().name.clone();
    if managing.read().name == requested {
        return Ok(managing);
    }
    let message = format!("Project '{requested}' is not the managed project");
    error!("{message}");
    Err(Envelope::failure(Some(requested), None, message))
}

/// Method named by the request: `method`, else `attributes.method`.
/// `execute` means the handler's default dispatch.
fn requested_method<'c, P>(call: &'c Call<'_, WizardObject, P>) -> Option<&'c str> {
    call.method
        .as_deref()
        .or_else(|| call.attributes.as_ref()?.get("method").and_then(Value::as_str))
        .filter(|m| !m.is_empty() && *m != "execute")
}

/// Match `requested` against `methods`, by full name or without the
/// `<operation>_` prefix.
fn resolve_method(
    operation: &str,
    requested: &str,
    methods: &'static [&'static str],
) -> Option<&'static str> {
    let prefixed = format!("{operation}_{requested}");
    methods
        .iter()
        .copied()
        .find(|m| *m == requested)
        .or_else(|| methods.iter().copied().find(|m| *m == prefixed))
}

/// Resolve the requested method of `call` against a handler's `methods`.
///
/// `Ok(None)` when no method was requested; a failing envelope when the
/// name matches nothing.
fn handler_method<P>(
    call: &Call<'_, WizardObject, P>,
    methods: &'static [&'static str],
) -> Result<Option<&'static str>, Envelope> {
    match requested_method(call) {
        None => Ok(None),
        Some(name) => resolve_method(call.operation, name, methods)
            .map(Some)
            .ok_or_else(|| method_not_found(&call.object, name)),
    }
}

fn method_not_found(object: &WizardObject, method: &str) -> Envelope {
    let message = format!("Method '{method}' not found");
    error!("{message}");
    Envelope::failure(object.label(), Some(method), message)
}

fn method_mismatch(object: &WizardObject, method: &str) -> Envelope {
    let message = format!(
        "Method '{method}' does not apply to {}",
        object.type_key().name()
    );
    error!("{message}");
    Envelope::failure(object.label(), Some(method), message)
}

fn unsupported(object: &WizardObject) -> Envelope {
    let message = format!("Unsupported object type: {}", object.type_key().name());
    error!("{message}");
    Envelope::failure(object.label(), None, message)
}

#[cfg(test)]
pub(crate) mod tests {
    use msbwizard_core::Attributes;
    use serde_json::Value;

    pub(crate) fn attrs(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }
}
