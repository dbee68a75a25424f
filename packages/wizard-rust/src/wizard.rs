//! Assembly of the wizard router around a project.

use std::sync::Arc;

use msbwizard_core::{BaseType, RegistrationError, Response, Router};
use serde_json::Value;
use tracing::info;

use crate::config::WizardSettings;
use crate::container::{TemplateContainer, WizardContainer};
use crate::entity::WizardBlock;
use crate::handlers::{BlockManager, CanvasRenderer, CodeGenerator};
use crate::object::WizardObject;
use crate::project::{SharedProject, WizardProject};
use crate::template::TemplateError;

/// Errors raised while assembling a wizard router.
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

/// Types every wizard router declares up front.
#[must_use]
pub fn base_types() -> [BaseType; 4] {
    [
        BaseType::of::<WizardBlock>(),
        BaseType::of::<WizardContainer>(),
        BaseType::of::<WizardProject>(),
        BaseType::of::<TemplateContainer>(),
    ]
}

/// Router over `project` with the `manage`, `generate` and `render`
/// operations registered.
///
/// # Errors
///
/// Fails if the code generator's template engine cannot be built or an
/// operation cannot be registered.
pub fn wizard_router(
    project: SharedProject,
    settings: &WizardSettings,
) -> Result<Router<WizardObject>, WizardError> {
    let canvas = Arc::new(CanvasRenderer::new(settings.block_width, settings.block_height));
    build_router(project, settings, canvas)
}

fn build_router(
    project: SharedProject,
    settings: &WizardSettings,
    canvas: Arc<CanvasRenderer>,
) -> Result<Router<WizardObject>, WizardError> {
    let mut router = Router::with_base_types(settings.router_config(), base_types());
    router.set_managing_object(WizardObject::Project(project));
    router.register_operation("manage", BlockManager)?;
    router.register_operation("generate", CodeGenerator::new()?)?;
    router.register_operation("render", canvas)?;

    info!(operations = ?router.get_supported_operations(), "wizard router ready");
    Ok(router)
}

// ---------------------------------------------------------------------------
// Wizard
// ---------------------------------------------------------------------------

/// A project together with the router managing it and its canvas.
#[derive(Debug)]
pub struct Wizard {
    project: SharedProject,
    canvas: Arc<CanvasRenderer>,
    router: Router<WizardObject>,
}

impl Wizard {
    /// # Errors
    ///
    /// Fails if the router cannot be built.
    pub fn new(project: WizardProject, settings: &WizardSettings) -> Result<Self, WizardError> {
        let project = SharedProject::new(project);
        let canvas = Arc::new(CanvasRenderer::new(settings.block_width, settings.block_height));
        let router = build_router(project.clone(), settings, canvas.clone())?;
        Ok(Self {
            project,
            canvas,
            router,
        })
    }

    /// Dispatch a JSON request or batch against the project.
    pub fn process_request(&self, request: &Value) -> Response {
        self.router.process_request(request)
    }

    #[must_use]
    pub fn project(&self) -> &SharedProject {
        &self.project
    }

    #[must_use]
    pub fn canvas(&self) -> &CanvasRenderer {
        &self.canvas
    }

    #[must_use]
    pub fn router(&self) -> &Router<WizardObject> {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router<WizardObject> {
        &mut self.router
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use msbwizard_core::TypeKey;
    use serde_json::json;

    use super::*;
    use crate::entity::CodeTemplate;

    fn wizard() -> Wizard {
        Wizard::new(WizardProject::new("Untitled Project").unwrap(), &WizardSettings::default())
            .unwrap()
    }

    #[test]
    fn registers_wizard_operations_and_types() {
        let router =
            wizard_router(SharedProject::default(), &WizardSettings::default()).unwrap();
        assert_eq!(router.get_supported_operations(), vec!["manage", "generate", "render"]);
        for name in ["WizardBlock", "WizardContainer", "WizardProject", "TemplateContainer"] {
            assert!(router.registry().type_names().contains(&name), "{name}");
        }
        let methods = router.get_methods_for_type(&TypeKey::of::<CodeGenerator>()).unwrap();
        assert!(methods.contains("execute") && methods.contains("generate_project"));
        assert!(router.methods_of::<CanvasRenderer>().is_ok());
    }

    #[test]
    fn end_to_end_batch() {
        let wizard = wizard();
        let response = wizard.process_request(&json!({
            "create_a": {
                "operation": "manage",
                "obj": {"type": "WizardBlock", "name": "order", "block_type": "entity"},
                "attributes": {"action": "create"}
            },
            "create_b": {
                "operation": "manage",
                "obj": {"type": "WizardBlock", "name": "customer", "block_type": "entity",
                        "position": [200, 0]},
                "attributes": {"action": "create"}
            },
            "link": {
                "operation": "manage",
                "attributes": {"action": "connect", "source": "order", "target": "customer"}
            },
            "draw": {"operation": "render"},
            "code": {"operation": "generate"},
            "bogus": {"operation": "teleport"}
        }));

        assert!(response.get("create_a").unwrap().status);
        assert!(response.get("link").unwrap().status);
        assert_eq!(wizard.canvas().scene().lines().count(), 1);

        let code = response.get("code").unwrap();
        assert_eq!(code.object.as_deref(), Some("Untitled Project"));
        let text = code.result.as_str().unwrap();
        assert!(text.contains("class Order:") && text.contains("class Customer:"), "{text}");

        let bogus = response.get("bogus").unwrap();
        assert_eq!(bogus.error.as_deref(), Some("Operation 'teleport' not registered"));
        assert!(!response.all_succeeded());
        assert_eq!(wizard.project().read().connections["order"], vec!["customer"]);
    }

    #[test]
    fn strict_settings_reject_template_targets() {
        let settings = WizardSettings {
            strict_type_check: true,
            ..WizardSettings::default()
        };
        let wizard = Wizard::new(WizardProject::default(), &settings).unwrap();
        assert!(wizard.router().is_strict());

        let template = CodeTemplate::new("t", "x", crate::entity::BlockType::Entity).unwrap();
        let response = wizard.process_request(&json!({
            "operation": "manage",
            "obj": serde_json::to_value(WizardObject::from(template)).unwrap()
        }));
        let envelope = response.as_single().unwrap();
        assert_eq!(
            envelope.error.as_deref(),
            Some("Unsupported object type: CodeTemplate")
        );

        let response = wizard.process_request(&json!({
            "operation": "manage",
            "obj": {"type": "WizardBlock", "name": "b", "block_type": "entity"},
            "attributes": {"action": "create"}
        }));
        assert!(response.as_single().unwrap().status);
    }

    #[test]
    fn operations_can_be_extended() {
        let mut wizard = wizard();
        wizard
            .router_mut()
            .register_operation("manage_again", BlockManager)
            .unwrap();
        assert_eq!(wizard.router().get_supported_operations().len(), 4);
    }
}
