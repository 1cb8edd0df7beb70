//! Headless rendering engine - in-memory viewports with no pixels.
//!
//! Implements the `RenderingContext` / `ViewportHandle` boundary the
//! coordinator consumes. Used by the scenario runner and as the test
//! double throughout the crate. Render requests are recorded instead of
//! drawn; read/write/render failures can be injected per viewport.

use anyhow::{Result, bail};
use glam::Vec2;
use indexmap::IndexMap;
use log::{debug, trace};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::core::camera::{CameraState, ZoomLimits};
use crate::core::context::{RenderingContext, ViewportHandle, ViewportId};
use crate::core::event_bus::EventBus;
use crate::core::viewport_events::{CameraModifiedEvent, ViewportDestroyedEvent};

/// Default surface size of a headless viewport (matches the demo panels)
pub const DEFAULT_VIEWPORT_SIZE: Vec2 = Vec2::new(400.0, 400.0);

/// One in-memory viewport.
pub struct HeadlessViewport {
    id: ViewportId,
    camera: Mutex<CameraState>,
    events: EventBus,
    viewport_size: Vec2,
    zoom_limits: ZoomLimits,
    writes: AtomicUsize,
    emitted: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl std::fmt::Debug for HeadlessViewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessViewport")
            .field("id", &self.id)
            .field("camera", &self.current_camera())
            .field("writes", &self.writes())
            .finish()
    }
}

impl HeadlessViewport {
    pub fn new(id: ViewportId, camera: CameraState) -> Self {
        Self {
            id,
            camera: Mutex::new(camera),
            events: EventBus::new(),
            viewport_size: DEFAULT_VIEWPORT_SIZE,
            zoom_limits: ZoomLimits::default(),
            writes: AtomicUsize::new(0),
            emitted: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn with_zoom_limits(mut self, limits: ZoomLimits) -> Self {
        self.zoom_limits = limits;
        self
    }

    pub fn viewport_size(&self) -> Vec2 {
        self.viewport_size
    }

    /// Camera as stored, bypassing failure injection
    pub fn current_camera(&self) -> CameraState {
        *self.camera.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Simulate the user dropping a camera onto the viewport (e.g. a preset)
    pub fn user_set_camera(&self, camera: CameraState) {
        self.store_and_notify(camera);
    }

    /// Simulate one mouse-wheel zoom step at `cursor` (screen space)
    pub fn user_zoom(&self, delta: f32, cursor: Vec2) {
        let mut camera = self.current_camera();
        if camera.zoom_step(delta, cursor, self.viewport_size, self.zoom_limits) {
            self.store_and_notify(camera);
        }
    }

    /// Simulate the "reset view" shortcut
    pub fn user_reset(&self) {
        let mut camera = self.current_camera();
        camera.reset();
        self.store_and_notify(camera);
    }

    /// Simulate a pan drag by `delta` pixels
    pub fn user_pan(&self, delta: Vec2) {
        let mut camera = self.current_camera();
        camera.pan_by(delta);
        self.store_and_notify(camera);
    }

    /// Programmatic `set_camera` calls that succeeded
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Camera-modified notifications fired so far
    pub fn events_emitted(&self) -> usize {
        self.emitted.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn store_and_notify(&self, camera: CameraState) {
        *self.camera.lock().unwrap_or_else(|e| e.into_inner()) = camera;
        self.emitted.fetch_add(1, Ordering::SeqCst);
        self.events.emit(CameraModifiedEvent {
            viewport: self.id.clone(),
        });
    }
}

impl ViewportHandle for HeadlessViewport {
    fn id(&self) -> &ViewportId {
        &self.id
    }

    fn camera(&self) -> Result<CameraState> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("camera of {} is unreadable", self.id);
        }
        Ok(self.current_camera())
    }

    fn set_camera(&self, camera: &CameraState) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("viewport {} rejected camera update", self.id);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.store_and_notify(*camera);
        Ok(())
    }

    fn events(&self) -> &EventBus {
        &self.events
    }
}

/// In-memory rendering engine.
#[derive(Default)]
pub struct HeadlessEngine {
    viewports: RwLock<IndexMap<ViewportId, Arc<HeadlessViewport>>>,
    renders: Mutex<Vec<Vec<ViewportId>>>,
    failing_renders: Mutex<HashSet<ViewportId>>,
    zoom_limits: ZoomLimits,
}

impl std::fmt::Debug for HeadlessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessEngine")
            .field("viewports", &self.viewport_ids())
            .finish()
    }
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine whose viewports clamp interactive zoom to `limits`
    pub fn with_zoom_limits(limits: ZoomLimits) -> Self {
        Self {
            zoom_limits: limits,
            ..Self::default()
        }
    }

    /// Create a live viewport. Fails if `id` is taken.
    pub fn create_viewport(
        &self,
        id: impl Into<ViewportId>,
        camera: CameraState,
    ) -> Result<Arc<HeadlessViewport>> {
        let id = id.into();
        let mut viewports = self.viewports.write().unwrap_or_else(|e| e.into_inner());
        if viewports.contains_key(&id) {
            bail!("viewport {} already exists", id);
        }
        let viewport =
            Arc::new(HeadlessViewport::new(id.clone(), camera).with_zoom_limits(self.zoom_limits));
        viewports.insert(id.clone(), Arc::clone(&viewport));
        debug!("Headless: created viewport {} (zoom {:.2})", id, camera.zoom);
        Ok(viewport)
    }

    /// Create a viewport under a fresh generated id
    pub fn generate_viewport(&self, camera: CameraState) -> Arc<HeadlessViewport> {
        loop {
            if let Ok(viewport) = self.create_viewport(ViewportId::generate(), camera) {
                return viewport;
            }
        }
    }

    /// Tear down a viewport: announce destruction, then drop all its listeners.
    pub fn destroy_viewport(&self, id: &ViewportId) -> bool {
        let removed = self
            .viewports
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .shift_remove(id);
        let Some(viewport) = removed else {
            return false;
        };
        viewport.events.emit(ViewportDestroyedEvent {
            viewport: id.clone(),
        });
        viewport.events.clear();
        debug!("Headless: destroyed viewport {}", id);
        true
    }

    pub fn headless_viewport(&self, id: &ViewportId) -> Option<Arc<HeadlessViewport>> {
        self.viewports
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Live viewport ids in creation order
    pub fn viewport_ids(&self) -> Vec<ViewportId> {
        self.viewports
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Make render requests that include `id` fail (or succeed again)
    pub fn fail_render(&self, id: &ViewportId, fail: bool) {
        let mut failing = self.failing_renders.lock().unwrap_or_else(|e| e.into_inner());
        if fail {
            failing.insert(id.clone());
        } else {
            failing.remove(id);
        }
    }

    /// Successful render requests, oldest first
    pub fn render_log(&self) -> Vec<Vec<ViewportId>> {
        self.renders.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl RenderingContext for HeadlessEngine {
    fn viewport(&self, id: &ViewportId) -> Option<Arc<dyn ViewportHandle>> {
        self.headless_viewport(id)
            .map(|viewport| viewport as Arc<dyn ViewportHandle>)
    }

    fn render(&self, ids: &[ViewportId]) -> Result<()> {
        {
            let failing = self.failing_renders.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(id) = ids.iter().find(|id| failing.contains(*id)) {
                bail!("render of {} failed", id);
            }
        }
        for id in ids {
            if self.headless_viewport(id).is_none() {
                bail!("cannot render destroyed viewport {}", id);
            }
        }
        trace!("Headless: render {:?}", ids);
        self.renders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ids.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn test_create_duplicate_fails() {
        let engine = HeadlessEngine::new();
        engine.create_viewport("A", CameraState::default()).unwrap();
        assert!(engine.create_viewport("A", CameraState::default()).is_err());
        assert_eq!(engine.viewport_ids(), vec![ViewportId::from("A")]);
    }

    #[test]
    fn test_generate_viewport_ids() {
        let engine = HeadlessEngine::new();
        let a = engine.generate_viewport(CameraState::default());
        let b = engine.generate_viewport(CameraState::default());
        assert_ne!(a.id(), b.id());
        assert_eq!(engine.viewport_ids().len(), 2);
    }

    #[test]
    fn test_set_camera_notifies_and_counts() {
        let engine = HeadlessEngine::new();
        let a = engine.create_viewport("A", CameraState::default()).unwrap();
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        let _sub = a.events().subscribe::<CameraModifiedEvent, _>(move |e| {
            assert_eq!(e.viewport, ViewportId::from("A"));
            c.fetch_add(1, Ordering::SeqCst);
        });

        a.set_camera(&CameraState::new(2.0)).unwrap();
        a.user_pan(Vec2::new(1.0, 1.0));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(a.writes(), 1);
        assert_eq!(a.events_emitted(), 2);
        assert_eq!(a.camera().unwrap().zoom, 2.0);
    }

    #[test]
    fn test_user_zoom_respects_engine_limits() {
        let engine = HeadlessEngine::with_zoom_limits(ZoomLimits { min: 0.5, max: 1.01 });
        let a = engine.create_viewport("A", CameraState::default()).unwrap();
        a.user_zoom(1.0, DEFAULT_VIEWPORT_SIZE * 0.5);
        assert_eq!(a.current_camera().zoom, 1.01);
        // Tiny delta is not a step and fires nothing
        a.user_zoom(0.0, DEFAULT_VIEWPORT_SIZE * 0.5);
        assert_eq!(a.events_emitted(), 1);
    }

    #[test]
    fn test_failure_injection() {
        let engine = HeadlessEngine::new();
        let a = engine.create_viewport("A", CameraState::default()).unwrap();
        a.fail_writes(true);
        assert!(a.set_camera(&CameraState::new(2.0)).is_err());
        assert_eq!(a.writes(), 0);
        a.fail_reads(true);
        assert!(a.camera().is_err());

        engine.fail_render(&ViewportId::from("A"), true);
        assert!(engine.render(&[ViewportId::from("A")]).is_err());
        engine.fail_render(&ViewportId::from("A"), false);
        engine.render(&[ViewportId::from("A")]).unwrap();
        assert_eq!(engine.render_log(), vec![vec![ViewportId::from("A")]]);
    }

    #[test]
    fn test_destroy_announces_and_clears_listeners() {
        let engine = HeadlessEngine::new();
        let a = engine.create_viewport("A", CameraState::default()).unwrap();
        let destroyed = Arc::new(AtomicI32::new(0));
        let d = Arc::clone(&destroyed);
        let _watch = a.events().subscribe::<ViewportDestroyedEvent, _>(move |_| {
            d.fetch_add(1, Ordering::SeqCst);
        });
        let _cam = a.events().subscribe::<CameraModifiedEvent, _>(|_| {});

        assert!(engine.destroy_viewport(&ViewportId::from("A")));
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert!(!a.events().has_subscribers::<CameraModifiedEvent>());
        assert!(engine.viewport(&ViewportId::from("A")).is_none());
        assert!(engine.render(&[ViewportId::from("A")]).is_err());

        assert!(!engine.destroy_viewport(&ViewportId::from("A")));
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }
}
