//! Scripted multi-viewer sessions on the headless engine.
//!
//! A scenario lists the viewer panels at startup (id, camera, sync flag)
//! and a sequence of shell/user steps. The runner plays the steps against
//! a `HeadlessEngine` + `SyncCoordinator` and reports every panel's final
//! camera and sync state.
//!
//! ```json
//! {
//!   "viewports": [ { "id": "v1", "zoom": 1.0, "sync": true }, { "id": "v2", "sync": true } ],
//!   "steps": [ { "op": "zoom", "id": "v1", "delta": 1.0 }, { "op": "turn" } ]
//! }
//! ```

use anyhow::{Context, Result, bail};
use glam::Vec2;
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::SyncSettings;
use crate::core::camera::CameraState;
use crate::core::context::{ContextSlot, ViewportId};
use crate::core::lifecycle::{SyncCoordinator, SyncState};
use crate::headless::{HeadlessEngine, HeadlessViewport};

/// Largest wheel-step count a single `zoom` step may ask for
pub const MAX_ZOOM_STEPS: usize = 1000;

fn default_true() -> bool {
    true
}

/// One viewer panel present at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewportSpec {
    pub id: ViewportId,
    #[serde(flatten)]
    pub camera: CameraState,
    #[serde(default)]
    pub sync: bool,
    /// Whether the viewport's surface is set up immediately
    #[serde(default = "default_true")]
    pub ready: bool,
}

/// One shell or user action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Add a viewer panel
    Create {
        id: ViewportId,
        #[serde(default)]
        zoom: Option<f32>,
        #[serde(default = "default_true")]
        ready: bool,
    },
    /// Panel's surface finished setting up
    Ready { id: ViewportId },
    Enable { id: ViewportId },
    Disable { id: ViewportId },
    /// Mouse-wheel zoom steps (sign = direction), centered on `cursor` or the panel center
    Zoom {
        id: ViewportId,
        delta: f32,
        #[serde(default)]
        cursor: Option<Vec2>,
    },
    Pan { id: ViewportId, dx: f32, dy: f32 },
    /// "Reset view" on one panel
    Reset { id: ViewportId },
    /// Apply a camera preset as user input
    Set { id: ViewportId, camera: CameraState },
    /// Remove the panel from the UI (tears down its surface)
    Remove { id: ViewportId },
    /// Engine tears the surface down, panel stays
    Destroy { id: ViewportId },
    /// Surface setup failed
    Fail { id: ViewportId, reason: String },
    /// Next scheduling turn (frame)
    Turn,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub viewports: Vec<ViewportSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario: {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Failed to parse scenario: {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Built-in session: three linked viewers, a late one, removals.
    pub fn demo() -> Self {
        let v = |s: &str| ViewportId::from(s);
        let spec = |id: &str, zoom: f32, sync: bool| ViewportSpec {
            id: v(id),
            camera: CameraState::new(zoom),
            sync,
            ready: true,
        };
        Self {
            viewports: vec![
                spec("v1", 1.0, true),
                spec("v2", 1.0, true),
                spec("v3", 0.5, false),
            ],
            steps: vec![
                Step::Zoom { id: v("v1"), delta: 1.0, cursor: None },
                Step::Zoom { id: v("v1"), delta: 1.0, cursor: None },
                Step::Pan { id: v("v2"), dx: 40.0, dy: -10.0 },
                Step::Create { id: v("v4"), zoom: Some(1.0), ready: false },
                Step::Enable { id: v("v4") },
                Step::Enable { id: v("v3") },
                Step::Turn,
                Step::Ready { id: v("v4") },
                Step::Turn,
                Step::Set { id: v("v3"), camera: CameraState::new(2.0) },
                Step::Disable { id: v("v2") },
                Step::Zoom { id: v("v4"), delta: -1.0, cursor: None },
                Step::Remove { id: v("v3") },
                Step::Zoom { id: v("v1"), delta: 1.0, cursor: None },
            ],
        }
    }
}

/// Final state of one panel.
#[derive(Debug, Clone, Serialize)]
pub struct ViewportReport {
    pub id: ViewportId,
    pub live: bool,
    pub state: SyncState,
    pub camera: Option<CameraState>,
    pub writes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub steps: usize,
    pub renders: usize,
    pub viewports: Vec<ViewportReport>,
}

impl ScenarioReport {
    pub fn viewport(&self, id: &ViewportId) -> Option<&ViewportReport> {
        self.viewports.iter().find(|v| &v.id == id)
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<12} {:>8} {:>18} {:>8} {:<12} {:>6}", "VIEWPORT", "ZOOM", "PAN", "ROT", "SYNC", "WRITES")?;
        for v in &self.viewports {
            let state = match v.state {
                SyncState::Member => "synced",
                SyncState::Joining => "joining",
                SyncState::Unregistered => "-",
            };
            match v.camera {
                Some(cam) => writeln!(
                    f,
                    "{:<12} {:>7.3}x {:>18} {:>8.1} {:<12} {:>6}",
                    v.id.as_str(),
                    cam.zoom,
                    format!("({:.1}, {:.1})", cam.pan.x, cam.pan.y),
                    cam.rotation,
                    state,
                    v.writes
                )?,
                None => writeln!(
                    f,
                    "{:<12} {:>8} {:>18} {:>8} {:<12} {:>6}",
                    v.id.as_str(),
                    "-",
                    "(no surface)",
                    "-",
                    state,
                    v.writes
                )?,
            }
        }
        write!(f, "{} steps, {} render requests", self.steps, self.renders)
    }
}

/// Plays a scenario against a headless engine.
pub struct ScenarioRunner {
    engine: Arc<HeadlessEngine>,
    sync: SyncCoordinator,
    /// Panels in the UI, with the camera their surface starts with
    panels: IndexMap<ViewportId, CameraState>,
    steps: usize,
}

impl ScenarioRunner {
    pub fn new(settings: SyncSettings) -> Result<Self> {
        settings.validate()?;
        let engine = Arc::new(HeadlessEngine::with_zoom_limits(settings.zoom_limits));
        let sync = SyncCoordinator::new(ContextSlot::with(engine.clone()), settings);
        Ok(Self {
            engine,
            sync,
            panels: IndexMap::new(),
            steps: 0,
        })
    }

    /// Set up the startup panels, play every step, report, shut down.
    pub fn run(mut self, scenario: &Scenario) -> Result<ScenarioReport> {
        for spec in &scenario.viewports {
            self.add_panel(&spec.id, spec.camera, spec.ready)?;
            if spec.sync {
                self.sync.enable_sync(&spec.id);
            }
        }
        // First frame
        self.sync.run_turn();

        for (index, step) in scenario.steps.iter().enumerate() {
            self.apply(step)
                .with_context(|| format!("Step {} ({:?}) failed", index + 1, step))?;
        }

        let report = self.report();
        self.sync.shutdown();
        Ok(report)
    }

    /// Apply one step.
    pub fn apply(&mut self, step: &Step) -> Result<()> {
        self.steps += 1;
        debug!("Scenario step: {:?}", step);
        match step {
            Step::Create { id, zoom, ready } => {
                let camera = zoom.map(CameraState::new).unwrap_or_default();
                self.add_panel(id, camera, *ready)?;
            }
            Step::Ready { id } => {
                let camera = self.panel(id)?;
                if self.engine.headless_viewport(id).is_none() {
                    self.engine.create_viewport(id.clone(), camera)?;
                }
                self.sync.viewport_ready(id);
            }
            Step::Enable { id } => {
                self.panel(id)?;
                self.sync.enable_sync(id);
            }
            Step::Disable { id } => {
                self.panel(id)?;
                self.sync.disable_sync(id);
            }
            Step::Zoom { id, delta, cursor } => {
                self.panel(id)?;
                if !delta.is_finite() {
                    bail!("zoom delta {} is not finite", delta);
                }
                let steps = delta.abs().round().max(1.0);
                if steps > MAX_ZOOM_STEPS as f32 {
                    bail!("zoom delta {} exceeds {} steps", delta, MAX_ZOOM_STEPS);
                }
                if let Some(viewport) = self.live(id) {
                    let cursor = cursor.unwrap_or(viewport.viewport_size() * 0.5);
                    for _ in 0..steps as usize {
                        viewport.user_zoom(delta.signum(), cursor);
                    }
                }
            }
            Step::Pan { id, dx, dy } => {
                self.panel(id)?;
                if let Some(viewport) = self.live(id) {
                    viewport.user_pan(Vec2::new(*dx, *dy));
                }
            }
            Step::Reset { id } => {
                self.panel(id)?;
                if let Some(viewport) = self.live(id) {
                    viewport.user_reset();
                }
            }
            Step::Set { id, camera } => {
                self.panel(id)?;
                if let Some(viewport) = self.live(id) {
                    viewport.user_set_camera(*camera);
                }
            }
            Step::Remove { id } => {
                self.panel(id)?;
                self.panels.shift_remove(id);
                self.sync.viewport_removed(id);
                self.engine.destroy_viewport(id);
                info!("Viewer {} removed", id);
            }
            Step::Destroy { id } => {
                self.panel(id)?;
                if !self.engine.destroy_viewport(id) {
                    warn!("Viewport {} has no surface to destroy", id);
                }
            }
            Step::Fail { id, reason } => {
                self.panel(id)?;
                self.sync.viewport_failed(id, reason);
                self.engine.destroy_viewport(id);
            }
            Step::Turn => {
                let ran = self.sync.run_turn();
                debug!("Turn ran {} deferred tasks", ran);
            }
        }
        Ok(())
    }

    /// Snapshot of every panel.
    pub fn report(&self) -> ScenarioReport {
        let viewports = self
            .panels
            .keys()
            .map(|id| {
                let viewport = self.engine.headless_viewport(id);
                ViewportReport {
                    id: id.clone(),
                    live: viewport.is_some(),
                    state: self.sync.sync_state(id),
                    camera: viewport.as_ref().map(|v| v.current_camera()),
                    writes: viewport.as_ref().map(|v| v.writes()).unwrap_or(0),
                }
            })
            .collect();
        ScenarioReport {
            steps: self.steps,
            renders: self.engine.render_log().len(),
            viewports,
        }
    }

    fn add_panel(&mut self, id: &ViewportId, camera: CameraState, ready: bool) -> Result<()> {
        if self.panels.contains_key(id) {
            bail!("viewer {} already exists", id);
        }
        self.panels.insert(id.clone(), camera);
        if ready {
            self.engine.create_viewport(id.clone(), camera)?;
            self.sync.viewport_ready(id);
        }
        Ok(())
    }

    fn panel(&self, id: &ViewportId) -> Result<CameraState> {
        match self.panels.get(id) {
            Some(camera) => Ok(*camera),
            None => bail!("unknown viewer {}", id),
        }
    }

    fn live(&self, id: &ViewportId) -> Option<Arc<HeadlessViewport>> {
        let viewport = self.engine.headless_viewport(id);
        if viewport.is_none() {
            warn!("Viewer {} has no live surface, input ignored", id);
        }
        viewport
    }
}
