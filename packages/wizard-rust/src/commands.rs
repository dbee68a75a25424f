//! Command implementations behind the `msbwizard` binary.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context as _};
use serde_json::{json, Value};
use tracing::info;

use crate::config::WizardSettings;
use crate::object::WizardObject;
use crate::project::WizardProject;
use crate::wizard::Wizard;

/// Write a new project file.
///
/// # Errors
///
/// Fails on a blank name or if the file cannot be written.
pub fn create_project(path: &Path, name: Option<&str>) -> anyhow::Result<WizardProject> {
    let project = match name {
        Some(name) => WizardProject::new(name)?,
        None => WizardProject::default(),
    };
    project.save(path)?;
    info!(path = %path.display(), name = %project.name, "project created");
    Ok(project)
}

/// Apply the JSON request in `request_path` to the project in
/// `project_path` and write the response to `out`.
///
/// The project is saved unless `dry_run`, even when some operations fail.
///
/// # Errors
///
/// Fails if a file cannot be read, parsed or written, or if any operation
/// in the response failed.
pub fn apply(
    settings: &WizardSettings,
    project_path: &Path,
    request_path: &Path,
    dry_run: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let project = WizardProject::load(project_path)?;
    let text = fs::read_to_string(request_path)
        .with_context(|| format!("failed to read request {}", request_path.display()))?;
    let request: Value = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse request {}", request_path.display()))?;

    let wizard = Wizard::new(project, settings)?;
    let response = wizard.process_request(&request);
    writeln!(out, "{}", serde_json::to_string_pretty(&response)?)?;

    if dry_run {
        info!("dry run, project not saved");
    } else {
        wizard.project().read().save(project_path)?;
    }
    if !response.all_succeeded() {
        bail!("one or more operations failed");
    }
    Ok(())
}

/// Generate code for the project, or for one of its blocks, and write it
/// to `output` or else to `out`.
///
/// # Errors
///
/// Fails if the project cannot be loaded, the block does not exist,
/// generation fails or the output cannot be written.
pub fn generate(
    settings: &WizardSettings,
    project_path: &Path,
    block: Option<&str>,
    template: Option<&str>,
    output: Option<&Path>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let project = WizardProject::load(project_path)?;
    let mut request = json!({"operation": "generate"});
    if let Some(name) = block {
        let Some(block) = project.blocks.get(name) else {
            bail!("block '{name}' not found in {}", project_path.display());
        };
        request["obj"] = serde_json::to_value(WizardObject::Block(block.clone()))?;
    }
    if let Some(template) = template {
        request["attributes"] = json!({"template": template});
    }

    let wizard = Wizard::new(project, settings)?;
    let response = wizard.process_request(&request);
    let Some(envelope) = response.as_single() else {
        bail!("unexpected batch response");
    };
    let code = match (&envelope.result, &envelope.error) {
        (Value::String(code), None) => code,
        (_, Some(error)) => bail!("{error}"),
        (other, None) => bail!("unexpected generator result: {other}"),
    };

    match output {
        Some(path) => {
            fs::write(path, code)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "code written");
        }
        None => write!(out, "{code}")?,
    }
    Ok(())
}

/// Registered operations, then each registry entry with its methods.
///
/// # Errors
///
/// Fails if the router cannot be built.
pub fn operations(settings: &WizardSettings, out: &mut impl Write) -> anyhow::Result<()> {
    let wizard = Wizard::new(WizardProject::default(), settings)?;
    let router = wizard.router();
    for operation in router.get_supported_operations() {
        writeln!(out, "{operation}")?;
    }
    let mut entries: Vec<_> = router.registry().iter().collect();
    entries.sort_by_key(|(key, _)| key.name());
    for (key, methods) in entries {
        let methods: Vec<_> = methods.iter().copied().collect();
        writeln!(out, "  {}: {}", key.name(), methods.join(", "))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;

    fn workspace() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.json");
        let mut project = WizardProject::new("shop").unwrap();
        project.create_item("order", true).unwrap();
        project.save(&path).unwrap();
        (dir, path)
    }

    fn write_request(dir: &TempDir, request: &Value) -> PathBuf {
        let path = dir.path().join("request.json");
        fs::write(&path, request.to_string()).unwrap();
        path
    }

    fn create_customer() -> Value {
        json!({
            "operation": "manage",
            "obj": {"type": "WizardBlock", "name": "customer", "block_type": "entity"},
            "attributes": {"action": "create"}
        })
    }

    #[test]
    fn create_project_writes_a_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.json");
        create_project(&path, Some("billing")).unwrap();
        assert_eq!(WizardProject::load(&path).unwrap().name, "billing");

        assert!(create_project(&path, Some(" ")).is_err());
    }

    #[test]
    fn apply_saves_the_project() {
        let (dir, project) = workspace();
        let request = write_request(&dir, &create_customer());

        let mut out = Vec::new();
        apply(&WizardSettings::default(), &project, &request, false, &mut out).unwrap();

        let printed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(printed["status"], json!(true));
        assert!(WizardProject::load(&project).unwrap().blocks.has_item("customer"));
    }

    #[test]
    fn dry_run_leaves_the_project_untouched() {
        let (dir, project) = workspace();
        let request = write_request(&dir, &create_customer());
        let before = fs::read_to_string(&project).unwrap();

        let mut out = Vec::new();
        apply(&WizardSettings::default(), &project, &request, true, &mut out).unwrap();

        assert!(!out.is_empty());
        assert_eq!(fs::read_to_string(&project).unwrap(), before);
    }

    #[test]
    fn apply_fails_when_an_operation_fails() {
        let (dir, project) = workspace();
        let request = write_request(&dir, &json!({
            "create": create_customer(),
            "bogus": {"operation": "teleport"}
        }));

        let mut out = Vec::new();
        let err = apply(&WizardSettings::default(), &project, &request, false, &mut out)
            .unwrap_err();
        assert_eq!(err.to_string(), "one or more operations failed");

        let printed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(printed["bogus"]["error"], json!("Operation 'teleport' not registered"));
        assert!(WizardProject::load(&project).unwrap().blocks.has_item("customer"));
    }

    #[test]
    fn generate_writes_project_code() {
        let (dir, project) = workspace();
        let output = dir.path().join("shop.py");

        let mut out = Vec::new();
        generate(&WizardSettings::default(), &project, None, None, Some(&output), &mut out)
            .unwrap();

        assert!(out.is_empty());
        let code = fs::read_to_string(&output).unwrap();
        assert!(code.contains("class Order:"), "{code}");
    }

    #[test]
    fn generate_reports_unknown_blocks_and_templates() {
        let (_dir, project) = workspace();
        let settings = WizardSettings::default();
        let mut out = Vec::new();

        let err = generate(&settings, &project, Some("ghost"), None, None, &mut out).unwrap_err();
        assert!(err.to_string().starts_with("block 'ghost' not found"), "{err}");

        let err = generate(&settings, &project, Some("order"), None, None, &mut out).unwrap_err();
        assert_eq!(err.to_string(), "Template 'entity_template' not found");

        let err =
            generate(&settings, &project, None, Some("missing"), None, &mut out).unwrap_err();
        assert_eq!(err.to_string(), "Template 'missing' not found");
        assert!(out.is_empty());
    }

    #[test]
    fn operations_lists_registered_names() {
        let mut out = Vec::new();
        operations(&WizardSettings::default(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("manage\ngenerate\nrender\n"), "{text}");
        assert!(text.contains("  WizardBlock: activate, connect_to"), "{text}");
    }
}
