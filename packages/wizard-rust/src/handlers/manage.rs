//! `manage`: create, update and delete blocks, connect them, and apply the
//! target type's own methods to the managed project.

use msbwizard_core::{Call, Envelope, Handler, Object};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::container::{Container, ContainerError};
use crate::entity::{Named, WizardBlock};
use crate::object::WizardObject;
use crate::project::{SharedProject, WizardProject};

use super::{
    live_project, managing_project, method_mismatch, method_not_found, requested_method,
    resolve_method, unsupported,
};

const MANAGE_METHODS: &[&str] = &["manage_block", "manage_connections"];

/// Block fields that only `connect`/`disconnect` and `update` may change.
const PROTECTED_FIELDS: &[&str] = &["name", "connections"];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ManageParams {
    pub action: Option<String>,
    pub source: Option<String>,
    pub target: Option<String>,
    /// Item name for container and project methods.
    pub name: Option<String>,
    /// Field read by a block's `get`.
    pub key: Option<String>,
    /// Block name for `create_item`.
    pub code: Option<String>,
    pub isactive: Option<bool>,
    /// Item for a container's `add` and `set_item`.
    pub item: Option<Value>,
}

/// Maintains the blocks and connections of the managing project.
#[derive(Debug, Default)]
pub struct BlockManager;

impl Handler<WizardObject> for BlockManager {
    type Params = ManageParams;

    fn public_methods(&self) -> &'static [&'static str] {
        MANAGE_METHODS
    }

    fn execute(&self, call: Call<'_, WizardObject, ManageParams>) -> anyhow::Result<Envelope> {
        let Some(requested) = requested_method(&call) else {
            return Ok(manage(&call, None));
        };
        if let Some(method) = resolve_method(call.operation, requested, MANAGE_METHODS) {
            return Ok(manage(&call, Some(method)));
        }
        let object_methods = call.object.base_type().methods;
        if let Some(method) = object_methods.iter().copied().find(|m| *m == requested) {
            return Ok(invoke(&call, method));
        }
        Ok(method_not_found(&call.object, requested))
    }
}

fn manage(call: &Call<'_, WizardObject, ManageParams>, method: Option<&str>) -> Envelope {
    match (&call.object, method) {
        (WizardObject::Block(block), None | Some("manage_block")) => {
            manage_block(block, managing_project(call), &call.params)
        }
        (WizardObject::Project(project), None | Some("manage_connections")) => {
            match live_project(project, call) {
                Ok(project) => manage_connections(project, &call.params),
                Err(envelope) => envelope,
            }
        }
        (other, Some(method)) => method_mismatch(other, method),
        (other, None) => unsupported(other),
    }
}

fn manage_block(
    block: &WizardBlock,
    project: Option<&SharedProject>,
    params: &ManageParams,
) -> Envelope {
    const METHOD: Option<&str> = Some("manage_block");
    let label = Some(block.name.clone());

    let Some(project) = project else {
        error!("managing object must be a project");
        return Envelope::failure(label, METHOD, "Invalid managing object");
    };
    let action = params.action.as_deref().unwrap_or_default();
    let mut project = project.write();

    let outcome = match action {
        "create" => store_block(&mut project, block, false),
        "update" => store_block(&mut project, block, true),
        "delete" => project
            .remove_block(&block.name)
            .map(|_| Value::Null)
            .ok_or_else(|| format!("Block '{}' not found", block.name)),
        other => Err(format!("Invalid action: {other}")),
    };

    match outcome {
        Ok(result) => {
            info!(block = %block.name, action, "managed block");
            Envelope::success(label, METHOD, result)
        }
        Err(message) => {
            error!(block = %block.name, action, error = %message, "block management failed");
            Envelope::failure(label, METHOD, message)
        }
    }
}

/// Add (or with `replace`, overwrite) a block. Its links are taken from the
/// project's connection map, not from the payload.
fn store_block(
    project: &mut WizardProject,
    block: &WizardBlock,
    replace: bool,
) -> Result<Value, String> {
    if replace && !project.blocks.has_item(&block.name) {
        return Err(format!("Block '{}' not found", block.name));
    }
    block.validate().map_err(|e| e.to_string())?;
    let stored = if replace {
        project.blocks.set_item(&block.name, block.clone())
    } else {
        project.blocks.add(block.clone())
    };
    stored.map_err(|e| e.to_string())?;
    project.sync_connections();
    Ok(project
        .blocks
        .get(&block.name)
        .map_or(Value::Null, WizardBlock::to_value))
}

fn manage_connections(project: &SharedProject, params: &ManageParams) -> Envelope {
    const METHOD: Option<&str> = Some("manage_connections");
    let mut project = project.write();
    let label = Some(project.name.clone());

    let (Some(source), Some(target)) = (
        params.source.as_deref().filter(|s| !s.is_empty()),
        params.target.as_deref().filter(|t| !t.is_empty()),
    ) else {
        error!("source and target must be provided for connection management");
        return Envelope::failure(label, METHOD, "Missing source or target");
    };

    let action = params.action.as_deref().unwrap_or_default();
    let outcome = match action {
        "connect" => project.connect(source, target).map(|_| ()),
        "disconnect" => project.disconnect(source, target),
        other => {
            error!(action = other, "invalid connection action");
            return Envelope::failure(label, METHOD, format!("Invalid action: {other}"));
        }
    };

    match outcome {
        Ok(()) => {
            let connections = serde_json::to_value(&project.connections).unwrap_or(Value::Null);
            Envelope::success(label, METHOD, connections)
        }
        Err(e) => {
            error!(source, target, error = %e, "connection management failed");
            Envelope::failure(label, METHOD, e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Object methods
// ---------------------------------------------------------------------------

/// Apply one of the target type's own methods to the managed project.
///
/// Blocks and templates are looked up by name. Containers stand for the
/// project's own block or template container.
fn invoke(call: &Call<'_, WizardObject, ManageParams>, method: &'static str) -> Envelope {
    let label = call.object.label();
    let params = &call.params;

    let outcome = match &call.object {
        WizardObject::Project(project) => match live_project(project, call) {
            Ok(project) => invoke_project(&mut project.write(), method, params),
            Err(envelope) => return envelope,
        },
        WizardObject::Block(block) => {
            with_managed(call, |project| invoke_block(project, &block.name, method, call))
        }
        WizardObject::Template(template) => {
            with_managed(call, |project| invoke_template(project, &template.name, method))
        }
        WizardObject::Blocks(_) => with_managed(call, |project| {
            let outcome = invoke_container(&mut project.blocks, method, params);
            project.sync_connections();
            outcome
        }),
        WizardObject::Templates(_) => with_managed(call, |project| {
            invoke_container(&mut project.templates, method, params)
        }),
    };

    match outcome {
        Ok(result) => {
            info!(method, target = label.as_deref(), "applied object method");
            Envelope::success(label, Some(method), result)
        }
        Err(message) => {
            error!(method, error = %message, "object method failed");
            Envelope::failure(label, Some(method), message)
        }
    }
}

/// Run `f` against the managing project, which must be a project.
fn with_managed<P>(
    call: &Call<'_, WizardObject, P>,
    f: impl FnOnce(&mut WizardProject) -> Result<Value, String>,
) -> Result<Value, String> {
    let project = managing_project(call).ok_or_else(|| "Invalid managing object".to_owned())?;
    f(&mut *project.write())
}

fn required<'p>(value: Option<&'p str>, field: &str) -> Result<&'p str, String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("Missing '{field}'"))
}

fn invoke_block(
    project: &mut WizardProject,
    name: &str,
    method: &str,
    call: &Call<'_, WizardObject, ManageParams>,
) -> Result<Value, String> {
    match method {
        "connect_to" => {
            let target = required(call.params.target.as_deref(), "target")?;
            project.connect(name, target).map_err(|e| e.to_string())?;
        }
        "disconnect_from" => {
            let target = required(call.params.target.as_deref(), "target")?;
            project.disconnect(name, target).map_err(|e| e.to_string())?;
        }
        _ => {
            let block = project
                .blocks
                .get_mut(name)
                .ok_or_else(|| format!("Block '{name}' not found"))?;
            match method {
                "activate" => block.activate(),
                "deactivate" => block.deactivate(),
                "get" => {
                    let key = required(call.params.key.as_deref(), "key")?;
                    return block
                        .get(key)
                        .ok_or_else(|| format!("Unknown attribute '{key}' for WizardBlock"));
                }
                "set" => {
                    let fields = settable_fields(call)?;
                    block.set(&fields).map_err(|e| e.to_string())?;
                }
                other => return Err(format!("Method '{other}' not found")),
            }
        }
    }
    Ok(project
        .blocks
        .get(name)
        .map_or(Value::Null, WizardBlock::to_value))
}

/// Request attributes meant for `WizardBlock::set`.
fn settable_fields(
    call: &Call<'_, WizardObject, ManageParams>,
) -> Result<msbwizard_core::Attributes, String> {
    let mut fields = call.attributes.clone().unwrap_or_default();
    fields.remove("method");
    fields.remove("action");
    if let Some(field) = PROTECTED_FIELDS.iter().find(|f| fields.contains_key(**f)) {
        return Err(format!("Field '{field}' cannot be changed with set"));
    }
    Ok(fields)
}

fn invoke_template(
    project: &mut WizardProject,
    name: &str,
    method: &str,
) -> Result<Value, String> {
    let outcome = match method {
        "activate" => project.templates.activate_item(name),
        "deactivate" => project.templates.deactivate_item(name),
        other => return Err(format!("Method '{other}' not found")),
    };
    outcome.map_err(|e| e.to_string())?;
    Ok(project
        .templates
        .get(name)
        .and_then(|t| serde_json::to_value(t).ok())
        .unwrap_or(Value::Null))
}

fn invoke_project(
    project: &mut WizardProject,
    method: &str,
    params: &ManageParams,
) -> Result<Value, String> {
    match method {
        "connect" | "disconnect" => {
            let source = required(params.source.as_deref(), "source")?;
            let target = required(params.target.as_deref(), "target")?;
            let outcome = if method == "connect" {
                project.connect(source, target).map(|_| ())
            } else {
                project.disconnect(source, target)
            };
            outcome.map_err(|e| e.to_string())?;
            Ok(serde_json::to_value(&project.connections).unwrap_or(Value::Null))
        }
        "create_item" => {
            let code = required(params.code.as_deref(), "code")?;
            project
                .create_item(code, params.isactive.unwrap_or(true))
                .map_err(|e| e.to_string())?;
            Ok(project.blocks.get(code).map_or(Value::Null, WizardBlock::to_value))
        }
        "remove_block" => {
            let name = required(params.name.as_deref(), "name")?;
            project
                .remove_block(name)
                .map(|block| block.to_value())
                .ok_or_else(|| format!("Block '{name}' not found"))
        }
        other => Err(format!("Method '{other}' not found")),
    }
}

fn invoke_container<T>(
    container: &mut Container<T>,
    method: &str,
    params: &ManageParams,
) -> Result<Value, String>
where
    T: Named + Serialize + DeserializeOwned,
{
    let name = || required(params.name.as_deref(), "name");
    let not_found = |name: &str| ContainerError::NotFound(name.to_owned()).to_string();

    match method {
        "activate_all" => container.activate_all(),
        "deactivate_all" => container.deactivate_all(),
        "clear" => container.clear(),
        "activate_item" => container.activate_item(name()?).map_err(|e| e.to_string())?,
        "deactivate_item" => container.deactivate_item(name()?).map_err(|e| e.to_string())?,
        "add" => container.add(parse_item(params)?).map_err(|e| e.to_string())?,
        "set_item" => container
            .set_item(name()?, parse_item(params)?)
            .map_err(|e| e.to_string())?,
        "remove" => {
            let name = name()?;
            container.remove(name).ok_or_else(|| not_found(name))?;
        }
        "active_items" => return Ok(item_names(container.active_items())),
        "inactive_items" => return Ok(item_names(container.inactive_items())),
        "drop_active" => return Ok(Value::from(container.drop_active())),
        "drop_inactive" => return Ok(Value::from(container.drop_inactive())),
        "has_item" => return Ok(Value::Bool(container.has_item(name()?))),
        "get" => {
            let name = name()?;
            return container
                .get(name)
                .map(|item| serde_json::to_value(item).unwrap_or(Value::Null))
                .ok_or_else(|| not_found(name));
        }
        other => return Err(format!("Method '{other}' not found")),
    }
    Ok(item_names(container.items()))
}

fn item_names<'i, T: Named + 'i>(items: impl Iterator<Item = &'i T>) -> Value {
    Value::from(items.map(|item| item.name().to_owned()).collect::<Vec<_>>())
}

fn parse_item<T: Named + DeserializeOwned>(params: &ManageParams) -> Result<T, String> {
    let raw = params.item.clone().ok_or_else(|| "Missing 'item'".to_owned())?;
    let item: T = serde_json::from_value(raw).map_err(|e| format!("Invalid item: {e}"))?;
    item.validate().map_err(|e| e.to_string())?;
    Ok(item)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
