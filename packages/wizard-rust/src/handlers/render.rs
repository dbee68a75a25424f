//! `render`: lays blocks and connection lines out on a headless canvas.

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use msbwizard_core::{Call, Envelope, Handler};

use crate::entity::{Position, WizardBlock};
use crate::object::WizardObject;
use crate::project::{Connections, SharedProject};
use crate::validation::check_positive;

use super::{handler_method, live_project, managing_project, method_mismatch, unsupported};

const RENDER_METHODS: &[&str] = &[
    "add_block",
    "refresh_block",
    "remove_block",
    "render_block",
    "render_project",
    "update_position",
];

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// A block drawn on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockItem {
    pub name: String,
    pub tooltip: String,
    pub rect: Rect,
}

/// A line between the centers of two drawn blocks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionLine {
    pub source: String,
    pub target: String,
    pub from: (f64, f64),
    pub to: (f64, f64),
}

/// Items currently drawn on the canvas.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Scene {
    blocks: Vec<BlockItem>,
    lines: Vec<ConnectionLine>,
}

impl Scene {
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.lines.clear();
    }

    #[must_use]
    pub fn block(&self, name: &str) -> Option<&BlockItem> {
        self.blocks.iter().find(|item| item.name == name)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BlockItem> {
        self.blocks.iter()
    }

    pub fn lines(&self) -> impl Iterator<Item = &ConnectionLine> {
        self.lines.iter()
    }

    /// Draw `block`, replacing an existing drawing of the same name.
    pub fn add_block(&mut self, block: &WizardBlock, size: (f64, f64)) -> BlockItem {
        self.remove_block(&block.name);
        let item = BlockItem {
            name: block.name.clone(),
            tooltip: format!("{} ({})", block.name, block.block_type),
            rect: Rect {
                x: coord(block.position.0),
                y: coord(block.position.1),
                width: size.0,
                height: size.1,
            },
        };
        self.blocks.push(item.clone());
        item
    }

    /// Erase a block and every line touching it. Returns `false` if the
    /// block was not drawn.
    pub fn remove_block(&mut self, name: &str) -> bool {
        let before = self.blocks.len();
        self.blocks.retain(|item| item.name != name);
        self.lines
            .retain(|line| line.source != name && line.target != name);
        self.blocks.len() != before
    }

    /// Draw a line between two drawn blocks. Does nothing if either is
    /// missing.
    pub fn connect(&mut self, source: &str, target: &str) {
        let (Some(from), Some(to)) = (self.block(source), self.block(target)) else {
            debug!(source, target, "cannot draw connection: block not drawn");
            return;
        };
        let line = ConnectionLine {
            source: source.to_owned(),
            target: target.to_owned(),
            from: from.rect.center(),
            to: to.rect.center(),
        };
        self.lines
            .retain(|l| !(l.source == source && l.target == target));
        self.lines.push(line);
    }

    /// Draw every connection of `connections` that touches `name`.
    pub fn connect_block(&mut self, name: &str, connections: &Connections) {
        for (source, targets) in connections {
            for target in targets {
                if source == name || target == name {
                    self.connect(source, target);
                }
            }
        }
    }

    /// Move a drawn block. Returns `false` if the block was not drawn.
    pub fn move_block(&mut self, name: &str, position: Position) -> bool {
        let Some(item) = self.blocks.iter_mut().find(|item| item.name == name) else {
            return false;
        };
        item.rect.x = coord(position.0);
        item.rect.y = coord(position.1);
        let touching: Vec<(String, String)> = self
            .lines
            .iter()
            .filter(|line| line.source == name || line.target == name)
            .map(|line| (line.source.clone(), line.target.clone()))
            .collect();
        for (source, target) in touching {
            self.connect(&source, &target);
        }
        true
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[allow(clippy::cast_precision_loss)]
fn coord(value: i64) -> f64 {
    value as f64
}

// ---------------------------------------------------------------------------
// CanvasRenderer
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RenderParams {
    pub action: Option<String>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub position: Option<Value>,
}

/// Keeps a headless scene in sync with the project.
#[derive(Debug)]
pub struct CanvasRenderer {
    scene: Mutex<Scene>,
    default_size: (f64, f64),
}

impl CanvasRenderer {
    #[must_use]
    pub fn new(block_width: f64, block_height: f64) -> Self {
        Self {
            scene: Mutex::new(Scene::default()),
            default_size: (block_width, block_height),
        }
    }

    /// Lock the scene for inspection.
    pub fn scene(&self) -> MutexGuard<'_, Scene> {
        self.scene.lock()
    }

    fn size(&self, params: &RenderParams) -> Result<(f64, f64), String> {
        let width = params.width.unwrap_or(self.default_size.0);
        let height = params.height.unwrap_or(self.default_size.1);
        check_positive(width, "width").map_err(|e| e.to_string())?;
        check_positive(height, "height").map_err(|e| e.to_string())?;
        Ok((width, height))
    }

    fn render_project(&self, project: &SharedProject, params: &RenderParams) -> Envelope {
        const METHOD: Option<&str> = Some("render_project");
        let project = project.read();
        let label = Some(project.name.clone());
        let size = match self.size(params) {
            Ok(size) => size,
            Err(message) => return Envelope::failure(label, METHOD, message),
        };

        let mut scene = self.scene.lock();
        scene.clear();
        for block in project.blocks.items() {
            scene.add_block(block, size);
        }
        for (source, targets) in &project.connections {
            for target in targets {
                scene.connect(source, target);
            }
        }
        info!(project = %project.name, blocks = project.blocks.len(), "rendered project");
        Envelope::success(label, METHOD, scene.to_value())
    }

    fn render_block(
        &self,
        block: &WizardBlock,
        project: Option<&SharedProject>,
        params: &RenderParams,
        action: &str,
    ) -> Envelope {
        debug!(block = %block.name, action, "processing render action");
        match action {
            "add" => self.add_block(block, project, params),
            "remove" => self.remove_block(block),
            "refresh" => {
                let removed = self.remove_block(block);
                if !removed.status {
                    return removed;
                }
                let mut added = self.add_block(block, project, params);
                added.method = Some("refresh_block".to_owned());
                added
            }
            "move" => self.move_block(block, project, params),
            other => {
                error!(action = other, "unsupported render action");
                Envelope::failure(
                    Some(block.name.clone()),
                    Some("render_block"),
                    format!("Unsupported action: {other}"),
                )
            }
        }
    }

    fn add_block(
        &self,
        block: &WizardBlock,
        project: Option<&SharedProject>,
        params: &RenderParams,
    ) -> Envelope {
        const METHOD: Option<&str> = Some("add_block");
        let label = Some(block.name.clone());
        let size = match self.size(params) {
            Ok(size) => size,
            Err(message) => return Envelope::failure(label, METHOD, message),
        };

        let connections = project.map(|p| p.read().connections.clone());
        let mut scene = self.scene.lock();
        let item = scene.add_block(block, size);
        if let Some(connections) = &connections {
            scene.connect_block(&block.name, connections);
        }
        info!(block = %block.name, position = ?block.position, "added block to canvas");
        Envelope::success(label, METHOD, serde_json::to_value(item).unwrap_or(Value::Null))
    }

    fn remove_block(&self, block: &WizardBlock) -> Envelope {
        const METHOD: Option<&str> = Some("remove_block");
        let label = Some(block.name.clone());
        if !self.scene.lock().remove_block(&block.name) {
            error!(block = %block.name, "block not rendered");
            return Envelope::failure(label, METHOD, format!("Block '{}' not rendered", block.name));
        }
        info!(block = %block.name, "removed block from canvas");
        Envelope::success(label, METHOD, Value::Null)
    }

    fn move_block(
        &self,
        block: &WizardBlock,
        project: Option<&SharedProject>,
        params: &RenderParams,
    ) -> Envelope {
        const METHOD: Option<&str> = Some("update_position");
        let label = Some(block.name.clone());
        let Some(raw) = params.position.as_ref() else {
            error!(block = %block.name, "position not provided");
            return Envelope::failure(label, METHOD, "Position not provided");
        };
        let Ok(position) = serde_json::from_value::<Position>(raw.clone()) else {
            return Envelope::failure(label, METHOD, "Position must be a pair of [x, y]");
        };

        self.scene.lock().move_block(&block.name, position);
        if let Some(project) = project {
            if let Some(stored) = project.write().blocks.get_mut(&block.name) {
                stored.position = position;
            }
        }
        info!(block = %block.name, ?position, "moved block");
        Envelope::success(label, METHOD, serde_json::json!([position.0, position.1]))
    }
}

impl Handler<WizardObject> for CanvasRenderer {
    type Params = RenderParams;

    fn public_methods(&self) -> &'static [&'static str] {
        RENDER_METHODS
    }

    fn execute(&self, call: Call<'_, WizardObject, RenderParams>) -> anyhow::Result<Envelope> {
        let method = match handler_method(&call, RENDER_METHODS) {
            Ok(method) => method,
            Err(envelope) => return Ok(envelope),
        };
        Ok(match (&call.object, method) {
            (WizardObject::Project(project), None | Some("render_project")) => {
                match live_project(project, &call) {
                    Ok(project) => self.render_project(project, &call.params),
                    Err(envelope) => envelope,
                }
            }
            (WizardObject::Block(block), method) => {
                let action = match method {
                    None | Some("render_block") => {
                        call.params.action.as_deref().unwrap_or("add")
                    }
                    Some("add_block") => "add",
                    Some("remove_block") => "remove",
                    Some("refresh_block") => "refresh",
                    Some("update_position") => "move",
                    Some(other) => return Ok(method_mismatch(&call.object, other)),
                };
                self.render_block(block, managing_project(&call), &call.params, action)
            }
            (other, Some(method)) => method_mismatch(other, method),
            (other, None) => unsupported(other),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
