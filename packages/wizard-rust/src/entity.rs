//! Domain entities: wizard blocks and code templates.

use std::fmt;
use std::str::FromStr;

use msbwizard_core::{Attributes, Introspect};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::validation::{check_non_empty, ValidationError};

/// Canvas position of a block, `(x, y)`.
pub type Position = (i64, i64);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EntityError {
    #[error("Invalid block_type: {0}")]
    InvalidBlockType(String),

    #[error("Template content cannot be empty")]
    EmptyTemplate,

    #[error("Unknown attribute '{field}' for {entity}")]
    UnknownField { field: String, entity: &'static str },

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

// ---------------------------------------------------------------------------
// BlockType
// ---------------------------------------------------------------------------

/// Kind of a block, which also selects its code template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Entity,
    Container,
    Operation,
    Project,
}

impl BlockType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Container => "container",
            Self::Operation => "operation",
            Self::Project => "project",
        }
    }

    /// Name of the template used to generate code for this kind of block.
    #[must_use]
    pub fn template_name(self) -> String {
        format!("{}_template", self.as_str())
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockType {
    type Err = EntityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entity" => Ok(Self::Entity),
            "container" => Ok(Self::Container),
            "operation" => Ok(Self::Operation),
            "project" => Ok(Self::Project),
            other => Err(EntityError::InvalidBlockType(other.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// Named
// ---------------------------------------------------------------------------

/// An item stored in a `Container`: uniquely named, with an activation flag.
pub trait Named {
    fn name(&self) -> &str;

    fn is_active(&self) -> bool;

    fn set_active(&mut self, active: bool);

    /// Check the item's own invariants. Called when items are loaded.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    fn validate(&self) -> Result<(), EntityError> {
        check_non_empty(self.name(), "name")?;
        Ok(())
    }
}

fn active_by_default() -> bool {
    true
}

// ---------------------------------------------------------------------------
// WizardBlock
// ---------------------------------------------------------------------------

/// A visual block on the design canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WizardBlock {
    pub name: String,
    pub block_type: BlockType,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub position: Position,
    /// Names of the blocks this block connects to.
    #[serde(default)]
    pub connections: Vec<String>,
    #[serde(default = "active_by_default")]
    pub isactive: bool,
}

const BLOCK_METHODS: &[&str] = &[
    "activate",
    "connect_to",
    "deactivate",
    "disconnect_from",
    "get",
    "set",
];

impl WizardBlock {
    /// Active block at the origin with no attributes or connections.
    #[must_use]
    pub fn new(name: impl Into<String>, block_type: BlockType) -> Self {
        let block = Self {
            name: name.into(),
            block_type,
            attributes: Attributes::new(),
            position: (0, 0),
            connections: Vec::new(),
            isactive: true,
        };
        debug!(name = %block.name, block_type = %block_type, "initialized block");
        block
    }

    #[must_use]
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn activate(&mut self) {
        self.isactive = true;
    }

    pub fn deactivate(&mut self) {
        self.isactive = false;
    }

    /// Update known fields from `params`. Either every field is applied or
    /// none is.
    ///
    /// # Errors
    ///
    /// Returns `EntityError::UnknownField` for an unrecognised key and
    /// `EntityError::InvalidValue` for a value of the wrong shape.
    pub fn set(&mut self, params: &Attributes) -> Result<(), EntityError> {
        let mut updated = self.clone();
        for (field, value) in params {
            match field.as_str() {
                "name" => updated.name = field_value(field, value)?,
                "block_type" => updated.block_type = field_value(field, value)?,
                "attributes" => updated.attributes = field_value(field, value)?,
                "position" => updated.position = field_value(field, value)?,
                "connections" => updated.connections = field_value(field, value)?,
                "isactive" => updated.isactive = field_value(field, value)?,
                _ => {
                    return Err(EntityError::UnknownField {
                        field: field.clone(),
                        entity: "WizardBlock",
                    })
                }
            }
        }
        updated.validate()?;
        *self = updated;
        info!(name = %self.name, fields = params.len(), "updated block");
        Ok(())
    }

    /// JSON value of the field `key`, if it exists.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            "name" => Some(Value::from(self.name.clone())),
            "block_type" => Some(Value::from(self.block_type.as_str())),
            "attributes" => Some(Value::Object(self.attributes.clone())),
            "position" => Some(Value::from(vec![self.position.0, self.position.1])),
            "connections" => Some(Value::from(self.connections.clone())),
            "isactive" => Some(Value::Bool(self.isactive)),
            _ => None,
        }
    }

    /// Record an outgoing connection. Returns `false` if it already existed.
    pub fn connect_to(&mut self, target: &str) -> bool {
        if self.connections.iter().any(|c| c == target) {
            return false;
        }
        self.connections.push(target.to_owned());
        true
    }

    /// Drop an outgoing connection. Returns `false` if there was none.
    pub fn disconnect_from(&mut self, target: &str) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c != target);
        self.connections.len() != before
    }

    /// JSON form of the block, as exposed to templates and results.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn field_value<T: serde::de::DeserializeOwned>(field: &str, value: &Value) -> Result<T, EntityError> {
    serde_json::from_value(value.clone()).map_err(|e| EntityError::InvalidValue {
        field: field.to_owned(),
        message: e.to_string(),
    })
}

impl Named for WizardBlock {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_active(&self) -> bool {
        self.isactive
    }

    fn set_active(&mut self, active: bool) {
        self.isactive = active;
    }
}

impl Introspect for WizardBlock {
    fn public_methods() -> &'static [&'static str] {
        BLOCK_METHODS
    }
}

// ---------------------------------------------------------------------------
// CodeTemplate
// ---------------------------------------------------------------------------

/// Named template text used to generate code for one kind of block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeTemplate {
    pub name: String,
    pub template: String,
    pub block_type: BlockType,
    #[serde(default = "active_by_default")]
    pub isactive: bool,
}

impl CodeTemplate {
    /// # Errors
    ///
    /// Returns an error if `name` or `template` is empty.
    pub fn new(
        name: impl Into<String>,
        template: impl Into<String>,
        block_type: BlockType,
    ) -> Result<Self, EntityError> {
        let template = Self {
            name: name.into(),
            template: template.into(),
            block_type,
            isactive: true,
        };
        template.validate()?;
        debug!(name = %template.name, block_type = %block_type, "initialized template");
        Ok(template)
    }
}

impl Named for CodeTemplate {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_active(&self) -> bool {
        self.isactive
    }

    fn set_active(&mut self, active: bool) {
        self.isactive = active;
    }

    fn validate(&self) -> Result<(), EntityError> {
        check_non_empty(&self.name, "name")?;
        if self.template.is_empty() {
            return Err(EntityError::EmptyTemplate);
        }
        Ok(())
    }
}

impl Introspect for CodeTemplate {
    fn public_methods() -> &'static [&'static str] {
        &["activate", "deactivate"]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn attrs(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn block_type_parses_and_displays() {
        assert_eq!("operation".parse::<BlockType>().unwrap(), BlockType::Operation);
        assert_eq!(
            "widget".parse::<BlockType>().unwrap_err().to_string(),
            "Invalid block_type: widget"
        );
        assert_eq!(BlockType::Container.template_name(), "container_template");
        assert_eq!(serde_json::to_value(BlockType::Entity).unwrap(), json!("entity"));
    }

    #[test]
    fn block_deserializes_with_defaults() {
        let block: WizardBlock =
            serde_json::from_value(json!({"name": "B1", "block_type": "entity"})).unwrap();
        assert_eq!(block, WizardBlock::new("B1", BlockType::Entity));
        assert!(block.isactive);

        let err = serde_json::from_value::<WizardBlock>(json!({"name": "B", "block_type": "x"}));
        assert!(err.is_err());
    }

    #[test]
    fn set_applies_known_fields_atomically() {
        let mut block = WizardBlock::new("B1", BlockType::Entity);
        block
            .set(&attrs(json!({"position": [10, 20], "isactive": false})))
            .unwrap();
        assert_eq!(block.position, (10, 20));
        assert!(!block.isactive);

        let before = block.clone();
        let err = block
            .set(&attrs(json!({"position": [1, 1], "colour": "red"})))
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown attribute 'colour' for WizardBlock");
        assert_eq!(block, before);

        let err = block.set(&attrs(json!({"position": "here"}))).unwrap_err();
        assert!(matches!(err, EntityError::InvalidValue { ref field, .. } if field == "position"));

        let err = block.set(&attrs(json!({"name": ""}))).unwrap_err();
        assert_eq!(err.to_string(), "name must not be empty");
    }

    #[test]
    fn get_returns_json_fields() {
        let block = WizardBlock::new("B1", BlockType::Operation).with_position((3, 4));
        assert_eq!(block.get("position"), Some(json!([3, 4])));
        assert_eq!(block.get("block_type"), Some(json!("operation")));
        assert_eq!(block.get("missing"), None);
    }

    #[test]
    fn connections_are_deduplicated() {
        let mut block = WizardBlock::new("A", BlockType::Entity);
        assert!(block.connect_to("B"));
        assert!(!block.connect_to("B"));
        assert_eq!(block.connections, vec!["B"]);
        assert!(block.disconnect_from("B"));
        assert!(!block.disconnect_from("B"));
    }

    #[test]
    fn template_rejects_empty_content() {
        assert_eq!(
            CodeTemplate::new("t", "", BlockType::Entity).unwrap_err(),
            EntityError::EmptyTemplate
        );
        assert!(CodeTemplate::new(" ", "x", BlockType::Entity).is_err());
        let template = CodeTemplate::new("t", "{{ x }}", BlockType::Entity).unwrap();
        assert!(template.is_active());
    }
}
