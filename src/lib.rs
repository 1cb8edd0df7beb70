//! VIEWSYNC - camera synchronization for linked image viewports
//!
//! Re-exports all modules for use by the binary target.

// Core coordinator (camera, events, registry, propagation, lifecycle)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod headless;
pub mod scenario;

// Re-export commonly used types from core
pub use crate::core::camera::CameraState;
pub use crate::core::context::{ContextSlot, RenderingContext, ViewportHandle, ViewportId};
pub use crate::core::event_bus::{EventBus, Subscription};
pub use crate::core::lifecycle::{SyncCoordinator, SyncState};

pub use config::SyncSettings;
pub use headless::{HeadlessEngine, HeadlessViewport};
