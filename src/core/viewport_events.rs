//! Viewport notification events, emitted on each viewport's own `EventBus`.

use super::context::ViewportId;

/// Camera of `viewport` changed, from user input or a programmatic `set_camera`.
#[derive(Clone, Debug)]
pub struct CameraModifiedEvent {
    pub viewport: ViewportId,
}

/// Rendering surface of `viewport` is being torn down.
#[derive(Clone, Debug)]
pub struct ViewportDestroyedEvent {
    pub viewport: ViewportId,
}
