//! Rendering-engine boundary: viewport ids, viewport handles and the
//! injected rendering context.
//!
//! The coordinator never owns viewports. It resolves them by id through a
//! `RenderingContext` held in a `ContextSlot`, which is installed at startup
//! and taken out at shutdown. Everything that needs the context treats an
//! empty slot as "nothing to do".

use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use super::camera::CameraState;
use super::event_bus::EventBus;

/// Opaque viewport identifier, stable for the lifetime of the viewport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewportId(String);

impl ViewportId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh unique id (`viewport-<uuid>`)
    pub fn generate() -> Self {
        Self(format!("viewport-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ViewportId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ViewportId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Capability interface of one live viewport.
///
/// Implementations must emit `CameraModifiedEvent` on `events()` whenever the
/// camera changes, including changes made through `set_camera`, and
/// `ViewportDestroyedEvent` when the surface is torn down.
pub trait ViewportHandle: Send + Sync {
    fn id(&self) -> &ViewportId;
    fn camera(&self) -> Result<CameraState>;
    fn set_camera(&self, camera: &CameraState) -> Result<()>;
    fn events(&self) -> &EventBus;
}

/// The active set of viewports, as seen by the coordinator.
pub trait RenderingContext: Send + Sync {
    /// Resolve a live viewport. `None` once it has been destroyed.
    fn viewport(&self, id: &ViewportId) -> Option<Arc<dyn ViewportHandle>>;
    /// Request a redraw of the given viewports.
    fn render(&self, ids: &[ViewportId]) -> Result<()>;
}

/// Injected holder for the rendering context.
///
/// Clones share the slot, so the shell can install the engine after the
/// coordinator was built.
#[derive(Clone, Default)]
pub struct ContextSlot {
    inner: Arc<RwLock<Option<Arc<dyn RenderingContext>>>>,
}

impl fmt::Debug for ContextSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSlot")
            .field("installed", &self.is_installed())
            .finish()
    }
}

impl ContextSlot {
    /// Empty slot (context not initialized yet)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Slot pre-filled with `context`
    pub fn with(context: Arc<dyn RenderingContext>) -> Self {
        let slot = Self::default();
        slot.install(context);
        slot
    }

    /// Install the context, returning the one it replaces (if any).
    pub fn install(&self, context: Arc<dyn RenderingContext>) -> Option<Arc<dyn RenderingContext>> {
        let previous = self
            .inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .replace(context);
        if previous.is_some() {
            warn!("Rendering context replaced while another was installed");
        } else {
            info!("Rendering context installed");
        }
        previous
    }

    /// Remove the context. Safe to call on an empty slot.
    pub fn take(&self) -> Option<Arc<dyn RenderingContext>> {
        let taken = self.inner.write().unwrap_or_else(|e| e.into_inner()).take();
        if taken.is_some() {
            info!("Rendering context released");
        }
        taken
    }

    pub fn get(&self) -> Option<Arc<dyn RenderingContext>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_installed(&self) -> bool {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Resolve a viewport through the installed context.
    pub fn viewport(&self, id: &ViewportId) -> Option<Arc<dyn ViewportHandle>> {
        self.get()?.viewport(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessEngine;

    #[test]
    fn test_viewport_id_display_and_serde() {
        let id = ViewportId::from("viewer-1");
        assert_eq!(id.to_string(), "viewer-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"viewer-1\"");
        let back: ViewportId = serde_json::from_str("\"viewer-1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = ViewportId::generate();
        let b = ViewportId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("viewport-"));
    }

    #[test]
    fn test_empty_slot_resolves_nothing() {
        let slot = ContextSlot::empty();
        assert!(!slot.is_installed());
        assert!(slot.get().is_none());
        assert!(slot.viewport(&ViewportId::from("A")).is_none());
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_install_take_shared_between_clones() {
        let engine = Arc::new(HeadlessEngine::new());
        engine.create_viewport("A", CameraState::default()).unwrap();

        let slot = ContextSlot::empty();
        let clone = slot.clone();
        assert!(clone.install(engine).is_none());

        assert!(slot.is_installed());
        assert!(slot.viewport(&ViewportId::from("A")).is_some());
        assert!(slot.viewport(&ViewportId::from("B")).is_none());

        assert!(slot.take().is_some());
        assert!(!clone.is_installed());
    }

    #[test]
    fn test_install_returns_replaced_context() {
        let slot = ContextSlot::with(Arc::new(HeadlessEngine::new()));
        assert!(slot.install(Arc::new(HeadlessEngine::new())).is_some());
    }
}
