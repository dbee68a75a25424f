//! Wizard projects: blocks, templates, and the connections between blocks.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use msbwizard_core::Introspect;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::info;

use crate::container::{ContainerError, TemplateContainer, WizardContainer};
use crate::entity::{BlockType, CodeTemplate, WizardBlock};
use crate::validation::{check_non_empty, ValidationError};

pub const DEFAULT_PROJECT_NAME: &str = "WIZARD_PROJECT";
pub const DEFAULT_PROJECT_TEMPLATE: &str = "default_project_template";

const DEFAULT_PROJECT_TEMPLATE_TEXT: &str = "\
# Generated MSB Project: {{ project_name }}
{% for block in blocks %}
class {{ block.name | capitalize }}:
    block_type = \"{{ block.block_type }}\"
{% for attr_name, attr_value in block.attributes %}
    {{ attr_name }} = {{ attr_value }}
{% endfor %}
{% endfor %}
";

/// Source block name -> target block names.
pub type Connections = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProjectError {
    #[error("Source block '{0}' not found")]
    SourceNotFound(String),

    #[error("Target block '{0}' not found")]
    TargetNotFound(String),

    #[error("No connection between '{from}' and '{to}'")]
    NoConnection { from: String, to: String },

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

// ---------------------------------------------------------------------------
// WizardProject
// ---------------------------------------------------------------------------

/// A design project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WizardProject {
    pub name: String,
    #[serde(default)]
    pub blocks: WizardContainer,
    #[serde(default = "default_templates")]
    pub templates: TemplateContainer,
    #[serde(default)]
    pub connections: Connections,
}

fn default_templates() -> TemplateContainer {
    let mut templates = TemplateContainer::new();
    templates.add(WizardProject::default_template()).ok();
    templates
}

const PROJECT_METHODS: &[&str] = &["connect", "create_item", "disconnect", "remove_block"];

impl WizardProject {
    /// Empty project holding only the default project template.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Empty` if `name` is blank.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        check_non_empty(&name, "WizardProject name")?;
        let project = Self {
            name,
            blocks: WizardContainer::new(),
            templates: default_templates(),
            connections: Connections::new(),
        };
        info!(name = %project.name, "initialized project");
        Ok(project)
    }

    /// The template used when generating code for a whole project.
    #[must_use]
    pub fn default_template() -> CodeTemplate {
        CodeTemplate {
            name: DEFAULT_PROJECT_TEMPLATE.to_owned(),
            template: DEFAULT_PROJECT_TEMPLATE_TEXT.to_owned(),
            block_type: BlockType::Project,
            isactive: true,
        }
    }

    /// Add an entity block named `code`.
    ///
    /// # Errors
    ///
    /// Returns a container error for an empty or duplicate name.
    pub fn create_item(&mut self, code: &str, isactive: bool) -> Result<(), ContainerError> {
        let mut block = WizardBlock::new(code, BlockType::Entity);
        block.isactive = isactive;
        self.blocks.add(block)
    }

    /// Remove a block and every connection that mentions it.
    pub fn remove_block(&mut self, name: &str) -> Option<WizardBlock> {
        let removed = self.blocks.remove(name)?;
        self.sync_connections();
        Some(removed)
    }

    /// Make every block's `connections` mirror the project connection map,
    /// dropping entries that name blocks no longer in the project.
    pub fn sync_connections(&mut self) {
        let names: BTreeSet<String> = self.blocks.names().map(str::to_owned).collect();
        self.connections.retain(|source, targets| {
            targets.retain(|t| names.contains(t));
            names.contains(source) && !targets.is_empty()
        });
        for block in self.blocks.items_mut() {
            block.connections = self
                .connections
                .get(&block.name)
                .cloned()
                .unwrap_or_default();
        }
    }

    /// Connect `source` to `target`. Returns `false` if the connection
    /// already existed.
    ///
    /// # Errors
    ///
    /// Fails if either block is missing.
    pub fn connect(&mut self, source: &str, target: &str) -> Result<bool, ProjectError> {
        if !self.blocks.has_item(source) {
            return Err(ProjectError::SourceNotFound(source.to_owned()));
        }
        if !self.blocks.has_item(target) {
            return Err(ProjectError::TargetNotFound(target.to_owned()));
        }
        let targets = self.connections.entry(source.to_owned()).or_default();
        if targets.iter().any(|t| t == target) {
            return Ok(false);
        }
        targets.push(target.to_owned());
        if let Some(block) = self.blocks.get_mut(source) {
            block.connect_to(target);
        }
        info!(source, target, "connected blocks");
        Ok(true)
    }

    /// Remove the connection from `source` to `target`.
    ///
    /// # Errors
    ///
    /// Returns `ProjectError::NoConnection` if there is none.
    pub fn disconnect(&mut self, source: &str, target: &str) -> Result<(), ProjectError> {
        let no_connection = || ProjectError::NoConnection {
            from: source.to_owned(),
            to: target.to_owned(),
        };
        let targets = self.connections.get_mut(source).ok_or_else(no_connection)?;
        let index = targets
            .iter()
            .position(|t| t == target)
            .ok_or_else(no_connection)?;
        targets.remove(index);
        if let Some(block) = self.blocks.get_mut(source) {
            block.disconnect_from(target);
        }
        info!(source, target, "disconnected blocks");
        Ok(())
    }

    /// Read a project from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, is not a valid project, or has a
    /// blank name.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read project {}", path.display()))?;
        let project: Self = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse project {}", path.display()))?;
        check_non_empty(&project.name, "WizardProject name")?;
        info!(
            path = %path.display(),
            blocks = project.blocks.len(),
            templates = project.templates.len(),
            "loaded project"
        );
        Ok(project)
    }

    /// Write the project as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self).context("failed to serialize project")?;
        fs::write(path, text)
            .with_context(|| format!("failed to write project {}", path.display()))?;
        info!(path = %path.display(), "saved project");
        Ok(())
    }
}

impl Default for WizardProject {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROJECT_NAME.to_owned(),
            blocks: WizardContainer::new(),
            templates: default_templates(),
            connections: Connections::new(),
        }
    }
}

impl Introspect for WizardProject {
    fn public_methods() -> &'static [&'static str] {
        PROJECT_METHODS
    }
}

// ---------------------------------------------------------------------------
// SharedProject
// ---------------------------------------------------------------------------

/// Shared, lockable handle to a project.
///
/// Clones point at the same project, so handlers mutate the project the
/// router manages rather than a copy.
#[derive(Debug, Clone, Default)]
pub struct SharedProject(Arc<RwLock<WizardProject>>);

impl SharedProject {
    #[must_use]
    pub fn new(project: WizardProject) -> Self {
        Self(Arc::new(RwLock::new(project)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, WizardProject> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, WizardProject> {
        self.0.write()
    }

    /// Copy of the current project state.
    #[must_use]
    pub fn snapshot(&self) -> WizardProject {
        self.0.read().clone()
    }

    /// Whether both handles point at the same project.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<WizardProject> for SharedProject {
    fn from(project: WizardProject) -> Self {
        Self::new(project)
    }
}

impl PartialEq for SharedProject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.read() == *other.read()
    }
}

impl Serialize for SharedProject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.read().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SharedProject {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        WizardProject::deserialize(deserializer).map(Self::new)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
