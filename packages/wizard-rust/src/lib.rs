//! `MSBWizard`: block-based projects driven through the operation router.
//!
//! A [`WizardProject`] holds named blocks, code templates and the
//! connections between blocks. [`Wizard`] wraps a project in a
//! [`msbwizard_core::Router`] with three operations registered:
//! `manage` (block and connection editing), `generate` (template
//! rendering) and `render` (a headless canvas scene).

pub mod commands;
pub mod config;
pub mod container;
pub mod entity;
pub mod handlers;
pub mod logging;
pub mod object;
pub mod project;
pub mod template;
pub mod validation;
pub mod wizard;

pub use config::WizardSettings;
pub use container::{Container, ContainerError, TemplateContainer, WizardContainer};
pub use entity::{BlockType, CodeTemplate, EntityError, Named, Position, WizardBlock};
pub use logging::init_logging;
pub use object::WizardObject;
pub use project::{ProjectError, SharedProject, WizardProject};
pub use template::{TemplateEngine, TemplateError};
pub use validation::ValidationError;
pub use wizard::{base_types, wizard_router, Wizard, WizardError};
