//! `generate`: render code templates for a project or a single block.

use msbwizard_core::{Call, Envelope, Handler};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::entity::WizardBlock;
use crate::object::WizardObject;
use crate::project::{SharedProject, DEFAULT_PROJECT_TEMPLATE};
use crate::template::{TemplateEngine, TemplateError};

use super::{handler_method, live_project, managing_project, method_mismatch, unsupported};

const GENERATE_METHODS: &[&str] = &["generate_block", "generate_project"];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GenerateParams {
    /// Template name overriding the default for the target.
    pub template: Option<String>,
}

/// Generates source code from the project's templates.
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    engine: TemplateEngine,
}

impl CodeGenerator {
    /// # Errors
    ///
    /// Fails if the template engine cannot be built.
    pub fn new() -> Result<Self, TemplateError> {
        Ok(Self {
            engine: TemplateEngine::new()?,
        })
    }

    fn generate_project(&self, project: &SharedProject, params: &GenerateParams) -> Envelope {
        const METHOD: Option<&str> = Some("generate_project");
        let project = project.read();
        let label = Some(project.name.clone());
        let template_name = params
            .template
            .clone()
            .unwrap_or_else(|| DEFAULT_PROJECT_TEMPLATE.to_owned());

        let Some(template) = project.templates.get(&template_name) else {
            error!(template = %template_name, "template not found");
            return Envelope::failure(label, METHOD, format!("Template '{template_name}' not found"));
        };

        let blocks: Vec<Value> = project.blocks.items().map(block_context).collect();
        let context = json!({
            "project_name": project.name,
            "blocks": blocks,
            "connections": project.connections,
        });

        match self.engine.render(&template.template, &context) {
            Ok(code) => {
                info!(project = %project.name, blocks = blocks.len(), "generated project code");
                Envelope::success(label, METHOD, Value::String(code))
            }
            Err(e) => {
                error!(template = %template_name, error = %e, "failed to render template");
                Envelope::failure(label, METHOD, e.to_string())
            }
        }
    }

    fn generate_block(
        &self,
        block: &WizardBlock,
        project: Option<&SharedProject>,
        params: &GenerateParams,
    ) -> Envelope {
        const METHOD: Option<&str> = Some("generate_block");
        let label = Some(block.name.clone());
        let template_name = params
            .template
            .clone()
            .unwrap_or_else(|| block.block_type.template_name());

        let project = project.map(SharedProject::read);
        let Some(template) = project
            .as_ref()
            .and_then(|p| p.templates.get(&template_name))
        else {
            error!(template = %template_name, "template not found");
            return Envelope::failure(label, METHOD, format!("Template '{template_name}' not found"));
        };

        let context = json!({
            "block_name": block.name,
            "block_type": block.block_type,
            "position": [block.position.0, block.position.1],
            "connections": block.connections,
            "attributes": block.attributes,
        });

        match self.engine.render(&template.template, &context) {
            Ok(code) => {
                info!(block = %block.name, template = %template_name, "generated block code");
                Envelope::success(label, METHOD, Value::String(code))
            }
            Err(e) => {
                error!(template = %template_name, error = %e, "failed to render template");
                Envelope::failure(label, METHOD, e.to_string())
            }
        }
    }
}

/// Per-block entry of the project template context.
fn block_context(block: &WizardBlock) -> Value {
    json!({
        "name": block.name,
        "block_type": block.block_type,
        "position": [block.position.0, block.position.1],
        "connections": block.connections,
        "attributes": block.attributes,
        "isactive": block.isactive,
    })
}

impl Handler<WizardObject> for CodeGenerator {
    type Params = GenerateParams;

    fn public_methods(&self) -> &'static [&'static str] {
        GENERATE_METHODS
    }

    fn execute(&self, call: Call<'_, WizardObject, GenerateParams>) -> anyhow::Result<Envelope> {
        let method = match handler_method(&call, GENERATE_METHODS) {
            Ok(method) => method,
            Err(envelope) => return Ok(envelope),
        };
        Ok(match (&call.object, method) {
            (WizardObject::Project(project), None | Some("generate_project")) => {
                match live_project(project, &call) {
                    Ok(project) => self.generate_project(project, &call.params),
                    Err(envelope) => envelope,
                }
            }
            (WizardObject::Block(block), None | Some("generate_block")) => {
                self.generate_block(block, managing_project(&call), &call.params)
            }
            (other, Some(method)) => method_mismatch(other, method),
            (other, None) => unsupported(other),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use msbwizard_core::{Request, Router, RouterConfig};
    use serde_json::json;

    use super::*;
    use crate::entity::{BlockType, CodeTemplate};
    use crate::handlers::tests::attrs;
    use crate::project::WizardProject;

    fn router(project: WizardProject) -> (Router<WizardObject>, SharedProject) {
        let project = SharedProject::new(project);
        let mut router = Router::new(RouterConfig::default());
        router.set_managing_object(WizardObject::Project(project.clone()));
        router.register_operation("generate", CodeGenerator::new().unwrap()).unwrap();
        (router, project)
    }

    fn sample_project() -> WizardProject {
        let mut project = WizardProject::new("shop").unwrap();
        let order = WizardBlock::new("order", BlockType::Entity)
            .with_attributes(attrs(json!({"total": 0, "currency": "EUR"})));
        project.blocks.add(order).unwrap();
        project
            .blocks
            .add(WizardBlock::new("customer", BlockType::Entity))
            .unwrap();
        project.connect("order", "customer").unwrap();
        project
    }

    #[test]
    fn generates_project_with_default_template() {
        let (router, _) = router(sample_project());
        let envelope = router.process(&Request::new("generate"));
        assert!(envelope.status, "{envelope:?}");
        assert_eq!(envelope.object.as_deref(), Some("shop"));
        assert_eq!(envelope.method.as_deref(), Some("generate_project"));
        let code = envelope.result.as_str().unwrap();
        assert!(code.starts_with("# Generated MSB Project: shop\n"), "{code}");
        assert!(code.contains("class Order:\n    block_type = \"entity\"\n"), "{code}");
        assert!(code.contains("    total = 0\n    currency = EUR\n"), "{code}");
        assert!(code.contains("class Customer:"), "{code}");
    }

    #[test]
    fn generates_project_with_named_template() {
        let mut project = sample_project();
        project
            .templates
            .add(
                CodeTemplate::new(
                    "links",
                    "{% for source, targets in connections %}{{ source }}->{% for t in targets %}{{ t | upper }}{% endfor %};{% endfor %}",
                    BlockType::Project,
                )
                .unwrap(),
            )
            .unwrap();
        let (router, _) = router(project);
        let envelope = router.process(
            &Request::new("generate").with_attributes(attrs(json!({"template": "links"}))),
        );
        assert_eq!(envelope.result, json!("order->CUSTOMER;"));
    }

    #[test]
    fn generates_block_with_its_type_template() {
        let mut project = sample_project();
        project
            .templates
            .add(
                CodeTemplate::new(
                    "entity_template",
                    "class {{ block_name | capitalize }} at {{ position.0 }}/{{ position.1 }}",
                    BlockType::Entity,
                )
                .unwrap(),
            )
            .unwrap();
        let (router, _) = router(project);
        let block = WizardBlock::new("invoice", BlockType::Entity).with_position((4, 2));
        let envelope = router.process(&Request::new("generate").with_object(block.into()));
        assert!(envelope.status, "{envelope:?}");
        assert_eq!(envelope.method.as_deref(), Some("generate_block"));
        assert_eq!(envelope.result, json!("class Invoice at 4/2"));
    }

    #[test]
    fn missing_template_is_reported() {
        let (router, _) = router(sample_project());
        let block = WizardBlock::new("op", BlockType::Operation);
        let envelope = router.process(&Request::new("generate").with_object(block.into()));
        assert_eq!(
            envelope.error.as_deref(),
            Some("Template 'operation_template' not found")
        );

        let envelope = router.process(
            &Request::new("generate").with_attributes(attrs(json!({"template": "nope"}))),
        );
        assert_eq!(envelope.error.as_deref(), Some("Template 'nope' not found"));
    }

    #[test]
    fn method_selects_the_generator() {
        let (router, _) = router(sample_project());
        let envelope = router.process(&Request::new("generate").with_method("generate_project"));
        assert!(envelope.status, "{envelope:?}");
        assert_eq!(envelope.method.as_deref(), Some("generate_project"));

        let envelope = router.process(
            &Request::new("generate").with_attributes(attrs(json!({"method": "project"}))),
        );
        assert!(envelope.status, "{envelope:?}");

        let envelope = router.process(&Request::new("generate").with_method("generate_block"));
        assert_eq!(
            envelope.error.as_deref(),
            Some("Method 'generate_block' does not apply to WizardProject")
        );
    }

    #[test]
    fn unknown_method_is_reported() {
        let (router, _) = router(sample_project());
        let envelope = router.process(&Request::new("generate").with_method("no_such_method"));
        assert!(!envelope.status);
        assert_eq!(envelope.object.as_deref(), Some("shop"));
        assert_eq!(envelope.method.as_deref(), Some("no_such_method"));
        assert_eq!(envelope.error.as_deref(), Some("Method 'no_such_method' not found"));
    }

    #[test]
    fn explicit_project_target_reads_the_managed_project() {
        let (router, _) = router(sample_project());
        let envelope = router.process(&Request::new("generate").with_object(
            serde_json::from_value(json!({"type": "WizardProject", "name": "shop"})).unwrap(),
        ));
        assert!(envelope.result.as_str().unwrap().contains("class Order:"), "{envelope:?}");

        let envelope = router.process(&Request::new("generate").with_object(
            serde_json::from_value(json!({"type": "WizardProject", "name": "other"})).unwrap(),
        ));
        assert_eq!(
            envelope.error.as_deref(),
            Some("Project 'other' is not the managed project")
        );
    }

    #[test]
    fn broken_template_is_reported() {
        let mut project = sample_project();
        project
            .templates
            .add(CodeTemplate::new("broken", "{% for x in blocks %}", BlockType::Project).unwrap())
            .unwrap();
        let (router, _) = router(project);
        let envelope = router.process(
            &Request::new("generate").with_attributes(attrs(json!({"template": "broken"}))),
        );
        assert!(!envelope.status);
        assert_eq!(
            envelope.error.as_deref(),
            Some("Unclosed for loop over 'blocks'")
        );
    }
}
