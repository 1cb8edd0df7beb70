//! Lifecycle adapter - the coordinator API used by the UI shell.
//!
//! Reconciles shell events (sync toggled, viewport ready, removed,
//! destroyed, setup failed) with registry membership:
//!
//! ```text
//! Unregistered --enable, adapter missing--> Joining --ready--> Member
//! Unregistered --enable, adapter live-----------------------> Member
//! Joining | Member --disable / remove / destroy / fail-----> Unregistered
//! ```
//!
//! A member also holds a teardown watch on its `ViewportDestroyedEvent`, so
//! it leaves even when the engine tears the surface down on its own.
//!
//! Joining a non-empty group defers a one-shot catch-up copy to the next
//! turn: the newcomer adopts the camera of the earliest-joined other member.

use indexmap::IndexSet;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use super::context::{ContextSlot, RenderingContext, ViewportHandle, ViewportId};
use super::event_bus::Subscription;
use super::propagation::{Applied, Propagator};
use super::registry::SyncRegistry;
use super::scheduler::TurnQueue;
use super::viewport_events::{CameraModifiedEvent, ViewportDestroyedEvent};
use crate::config::SyncSettings;

/// Per-viewport sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    Unregistered,
    /// Sync requested, adapter not ready yet
    Joining,
    Member,
}

#[derive(Default)]
struct LifecycleState {
    joining: IndexSet<ViewportId>,
    teardown: HashMap<ViewportId, Subscription>,
}

struct Shared {
    settings: SyncSettings,
    context: ContextSlot,
    registry: SyncRegistry,
    propagator: Propagator,
    turns: TurnQueue,
    state: Mutex<LifecycleState>,
}

/// Viewport synchronization coordinator.
///
/// Cheap to clone; clones drive the same membership.
#[derive(Clone)]
pub struct SyncCoordinator {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("members", &self.shared.registry.members())
            .field("joining", &self.joining())
            .field("context", &self.shared.context)
            .finish()
    }
}

impl SyncCoordinator {
    pub fn new(context: ContextSlot, settings: SyncSettings) -> Self {
        let registry = SyncRegistry::new();
        let propagator = Propagator::new(registry.clone(), context.clone(), settings.tolerance);
        debug!(
            "SyncCoordinator: tolerance {}, catch-up {}",
            settings.tolerance, settings.catch_up
        );
        Self {
            shared: Arc::new(Shared {
                settings,
                context,
                registry,
                propagator,
                turns: TurnQueue::new(),
                state: Mutex::new(LifecycleState::default()),
            }),
        }
    }

    pub fn context(&self) -> &ContextSlot {
        &self.shared.context
    }

    /// Install the rendering context and retry all deferred joins.
    pub fn install_context(&self, context: Arc<dyn RenderingContext>) {
        self.shared.context.install(context);
        for id in self.joining() {
            self.shared.try_join(&id);
        }
    }

    /// Link `id`. Defers the join if its adapter does not exist yet.
    pub fn enable_sync(&self, id: &ViewportId) {
        self.shared.enable(id);
    }

    /// Unlink `id` (also cancels a deferred join).
    pub fn disable_sync(&self, id: &ViewportId) {
        if self.shared.detach(id) {
            debug!("Sync: disabled for {}", id);
        }
    }

    /// Shell notification: the viewport's adapter is now live.
    pub fn viewport_ready(&self, id: &ViewportId) {
        if self.shared.is_joining(id) {
            self.shared.try_join(id);
        }
    }

    /// Shell notification: the viewport panel was removed.
    pub fn viewport_removed(&self, id: &ViewportId) {
        if self.shared.detach(id) {
            debug!("Sync: {} removed from UI", id);
        }
    }

    /// Shell notification: the viewport's rendering surface was destroyed.
    pub fn viewport_destroyed(&self, id: &ViewportId) {
        self.shared.on_destroyed(id);
    }

    /// Shell notification: viewport setup failed after sync was requested.
    pub fn viewport_failed(&self, id: &ViewportId, reason: &str) {
        warn!("Sync: setup of {} failed: {}", id, reason);
        self.shared.detach(id);
    }

    pub fn is_synced(&self, id: &ViewportId) -> bool {
        self.shared.registry.is_member(id)
    }

    pub fn sync_state(&self, id: &ViewportId) -> SyncState {
        if self.shared.registry.is_member(id) {
            SyncState::Member
        } else if self.shared.is_joining(id) {
            SyncState::Joining
        } else {
            SyncState::Unregistered
        }
    }

    /// Linked viewports, in join order.
    pub fn list_synced(&self) -> Vec<ViewportId> {
        self.shared.registry.members()
    }

    /// Viewports waiting for their adapter.
    pub fn joining(&self) -> Vec<ViewportId> {
        self.shared.lock_state().joining.iter().cloned().collect()
    }

    /// Run deferred continuations (catch-up copies). Call once per frame.
    pub fn run_turn(&self) -> usize {
        self.shared.turns.run_turn()
    }

    /// Continuations waiting for the next turn
    pub fn pending_turns(&self) -> usize {
        self.shared.turns.pending()
    }

    /// Release every subscription, clear membership, drop the rendering context.
    ///
    /// Safe to call repeatedly or with nothing registered.
    pub fn shutdown(&self) {
        let dropped = self.shared.turns.clear();
        let members = self.shared.registry.clear();
        let watches: Vec<Subscription> = {
            let mut state = self.shared.lock_state();
            state.joining.clear();
            state.teardown.drain().map(|(_, sub)| sub).collect()
        };
        drop(watches);
        let had_context = self.shared.context.take().is_some();
        if members > 0 || dropped > 0 || had_context {
            info!(
                "Sync shutdown: {} members released, {} pending tasks dropped",
                members, dropped
            );
        }
    }
}

impl Shared {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_joining(&self, id: &ViewportId) -> bool {
        self.lock_state().joining.contains(id)
    }

    fn enable(self: &Arc<Self>, id: &ViewportId) {
        if self.registry.is_member(id) {
            trace!("Sync: {} already a member", id);
            return;
        }
        self.lock_state().joining.insert(id.clone());
        self.try_join(id);
    }

    /// Join `id` if its adapter resolves, otherwise leave it in `joining`.
    fn try_join(self: &Arc<Self>, id: &ViewportId) {
        let Some(handle) = self.context.viewport(id) else {
            debug!("Sync: {} not ready, join deferred", id);
            return;
        };
        self.lock_state().joining.shift_remove(id);
        self.join(id, handle);
    }

    fn join(self: &Arc<Self>, id: &ViewportId, handle: Arc<dyn ViewportHandle>) {
        let group_before = self.registry.len();

        let weak = Arc::downgrade(self);
        let source = id.clone();
        let joined = self
            .registry
            .join(id, handle.as_ref(), move |_: &CameraModifiedEvent| {
                if let Some(shared) = weak.upgrade() {
                    shared.propagator.on_camera_modified(&source);
                }
            });
        if !joined {
            return;
        }

        let weak = Arc::downgrade(self);
        let watched = id.clone();
        let watch = handle
            .events()
            .subscribe::<ViewportDestroyedEvent, _>(move |_| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_destroyed(&watched);
                }
            });
        let replaced = self.lock_state().teardown.insert(id.clone(), watch);
        drop(replaced);

        if self.settings.catch_up && group_before > 0 {
            self.schedule_catch_up(id);
        }
    }

    fn schedule_catch_up(self: &Arc<Self>, id: &ViewportId) {
        let Some(epoch) = self.registry.epoch_of(id) else {
            return;
        };
        let weak: Weak<Shared> = Arc::downgrade(self);
        let target = id.clone();
        self.turns.defer(format!("catch-up {}", id), move || {
            if let Some(shared) = weak.upgrade() {
                shared.catch_up(&target, epoch);
            }
        });
    }

    /// One-shot alignment of a newcomer to the earliest other member.
    fn catch_up(&self, id: &ViewportId, epoch: u64) -> Option<Applied> {
        if self.registry.epoch_of(id) != Some(epoch) {
            trace!("Sync: catch-up for {} is stale, skipped", id);
            return None;
        }
        let context = self.context.get()?;
        let reference = self.registry.first_other(id)?;
        let Some(handle) = context.viewport(&reference) else {
            warn!("Sync: catch-up reference {} is gone", reference);
            return None;
        };
        let camera = match handle.camera() {
            Ok(camera) => camera,
            Err(e) => {
                warn!("Sync: failed to read camera of {}: {:#}", reference, e);
                return None;
            }
        };
        drop(handle);

        let applied = self.propagator.apply(context.as_ref(), &camera, id);
        debug!("Sync: {} caught up with {} ({:?})", id, reference, applied);
        Some(applied)
    }

    /// Cancel a deferred join and leave. Returns true if anything changed.
    fn detach(&self, id: &ViewportId) -> bool {
        let (was_joining, watch) = {
            let mut state = self.lock_state();
            (state.joining.shift_remove(id), state.teardown.remove(id))
        };
        drop(watch);
        let left = self.registry.leave(id);
        was_joining || left
    }

    fn on_destroyed(&self, id: &ViewportId) {
        if self.detach(id) {
            debug!("Sync: {} destroyed, unlinked", id);
        }
    }
}
