//! Core synchronization modules - camera state, events, registry,
//! propagation, lifecycle.
//!
//! These modules form the coordinator, independent of any rendering engine.

pub mod camera;
pub mod context;
pub mod event_bus;
pub mod lifecycle;
pub mod propagation;
pub mod registry;
pub mod scheduler;
pub mod viewport_events;

// Re-exports for convenience
pub use camera::{CameraState, ZoomLimits, DEFAULT_TOLERANCE};
pub use context::{ContextSlot, RenderingContext, ViewportHandle, ViewportId};
pub use event_bus::{EventBus, Subscription};
pub use lifecycle::{SyncCoordinator, SyncState};
pub use propagation::{Propagation, PropagationReport, Propagator};
pub use registry::SyncRegistry;
pub use scheduler::TurnQueue;
pub use viewport_events::{CameraModifiedEvent, ViewportDestroyedEvent};
