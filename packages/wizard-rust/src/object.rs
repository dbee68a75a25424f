use msbwizard_core::{BaseType, Object};
use serde::{Deserialize, Serialize};

use crate::container::{TemplateContainer, WizardContainer};
use crate::entity::{CodeTemplate, WizardBlock};
use crate::project::{SharedProject, WizardProject};

/// Every object a wizard request can target.
///
/// JSON form is tagged by `"type"`, e.g.
/// `{"type": "WizardBlock", "name": "B1", "block_type": "entity"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WizardObject {
    #[serde(rename = "WizardProject")]
    Project(SharedProject),
    #[serde(rename = "WizardBlock")]
    Block(WizardBlock),
    #[serde(rename = "WizardContainer")]
    Blocks(WizardContainer),
    #[serde(rename = "CodeTemplate")]
    Template(CodeTemplate),
    #[serde(rename = "TemplateContainer")]
    Templates(TemplateContainer),
}

impl WizardObject {
    #[must_use]
    pub fn as_project(&self) -> Option<&SharedProject> {
        match self {
            Self::Project(project) => Some(project),
            _ => None,
        }
    }
}

impl Object for WizardObject {
    fn base_type(&self) -> BaseType {
        match self {
            Self::Project(_) => BaseType::of::<WizardProject>(),
            Self::Block(_) => BaseType::of::<WizardBlock>(),
            Self::Blocks(_) => BaseType::of::<WizardContainer>(),
            Self::Template(_) => BaseType::of::<CodeTemplate>(),
            Self::Templates(_) => BaseType::of::<TemplateContainer>(),
        }
    }

    fn label(&self) -> Option<String> {
        match self {
            Self::Project(project) => Some(project.read().name.clone()),
            Self::Block(block) => Some(block.name.clone()),
            Self::Template(template) => Some(template.name.clone()),
            Self::Blocks(_) | Self::Templates(_) => None,
        }
    }
}

impl From<SharedProject> for WizardObject {
    fn from(project: SharedProject) -> Self {
        Self::Project(project)
    }
}

impl From<WizardBlock> for WizardObject {
    fn from(block: WizardBlock) -> Self {
        Self::Block(block)
    }
}

impl From<CodeTemplate> for WizardObject {
    fn from(template: CodeTemplate) -> Self {
        Self::Template(template)
    }
}
