//! Propagation engine - replicates a member's camera to the other members.
//!
//! On `CameraModifiedEvent` from member S:
//! 1. Ignore if S is not a member (stale notification) or S is currently
//!    being written by us (echo of our own `set_camera`)
//! 2. Read camera(S) once
//! 3. For every other member T: read camera(T); if it differs beyond the
//!    tolerance, write camera(S) into T and render T only
//!
//! Termination: T is marked as "applying" for the duration of its
//! `set_camera`, so the echo T emits is dropped. A target already within
//! tolerance is never written. One trigger therefore costs at most one
//! write per other member.
//!
//! Nothing here fails the caller: unresolvable viewports and adapter
//! errors are logged and the remaining targets are still processed.

use log::{trace, warn};
use std::collections::HashSet;
use std::sync::Mutex;

use super::camera::CameraState;
use super::context::{ContextSlot, RenderingContext, ViewportId};
use super::registry::SyncRegistry;

/// Why a notification produced no propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    /// Source is not (or no longer) a member
    NotMember,
    /// Source is being written by the engine itself
    Echo,
    /// No rendering context installed
    NoContext,
    /// Source viewport could not be resolved or read
    SourceUnavailable,
}

/// Result of applying a camera to one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Camera written and render requested
    Written,
    /// Target already within tolerance
    InSync,
    /// Target viewport no longer resolvable
    Stale,
    /// Target read/write failed
    Failed,
}

/// Per-trigger summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropagationReport {
    pub written: Vec<ViewportId>,
    pub in_sync: Vec<ViewportId>,
    pub skipped: Vec<ViewportId>,
    pub failed: Vec<ViewportId>,
}

impl PropagationReport {
    fn record(&mut self, target: ViewportId, applied: Applied) {
        match applied {
            Applied::Written => self.written.push(target),
            Applied::InSync => self.in_sync.push(target),
            Applied::Stale => self.skipped.push(target),
            Applied::Failed => self.failed.push(target),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Propagation {
    Ignored(Ignored),
    Done(PropagationReport),
}

impl Propagation {
    /// Targets written by this propagation (empty if ignored)
    pub fn written(&self) -> &[ViewportId] {
        match self {
            Propagation::Done(report) => &report.written,
            Propagation::Ignored(_) => &[],
        }
    }
}

/// Marks a viewport as "being written" until dropped.
struct ApplyGuard<'a> {
    applying: &'a Mutex<HashSet<ViewportId>>,
    id: ViewportId,
    inserted: bool,
}

impl<'a> ApplyGuard<'a> {
    fn new(applying: &'a Mutex<HashSet<ViewportId>>, id: &ViewportId) -> Self {
        let inserted = applying
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone());
        Self {
            applying,
            id: id.clone(),
            inserted,
        }
    }
}

impl Drop for ApplyGuard<'_> {
    fn drop(&mut self) {
        // A nested guard on the same id leaves the outer mark in place
        if self.inserted {
            self.applying
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&self.id);
        }
    }
}

#[derive(Debug)]
pub struct Propagator {
    registry: SyncRegistry,
    context: ContextSlot,
    tolerance: f32,
    applying: Mutex<HashSet<ViewportId>>,
}

impl Propagator {
    pub fn new(registry: SyncRegistry, context: ContextSlot, tolerance: f32) -> Self {
        Self {
            registry,
            context,
            tolerance,
            applying: Mutex::new(HashSet::new()),
        }
    }

    /// True while `id` is inside one of our `set_camera` calls
    pub fn is_applying(&self, id: &ViewportId) -> bool {
        self.applying
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
    }

    /// Handle a camera change on `source`.
    pub fn on_camera_modified(&self, source: &ViewportId) -> Propagation {
        if !self.registry.is_member(source) {
            trace!("Propagate: {} is not a member, ignored", source);
            return Propagation::Ignored(Ignored::NotMember);
        }
        if self.is_applying(source) {
            trace!("Propagate: echo from {}, ignored", source);
            return Propagation::Ignored(Ignored::Echo);
        }
        let Some(context) = self.context.get() else {
            trace!("Propagate: no rendering context, {} ignored", source);
            return Propagation::Ignored(Ignored::NoContext);
        };
        let Some(handle) = context.viewport(source) else {
            warn!("Propagate: source viewport {} is gone", source);
            return Propagation::Ignored(Ignored::SourceUnavailable);
        };
        let camera = match handle.camera() {
            Ok(camera) => camera,
            Err(e) => {
                warn!("Propagate: failed to read camera of {}: {:#}", source, e);
                return Propagation::Ignored(Ignored::SourceUnavailable);
            }
        };
        drop(handle);

        let mut report = PropagationReport::default();
        for target in self.registry.members() {
            if &target == source {
                continue;
            }
            // A leave during this loop cancels further work for that id
            if !self.registry.is_member(source) {
                trace!("Propagate: {} left mid-propagation, stopping", source);
                break;
            }
            if !self.registry.is_member(&target) {
                continue;
            }
            let applied = self.apply(context.as_ref(), &camera, &target);
            report.record(target, applied);
        }

        trace!(
            "Propagate: {} -> written {:?}, in sync {}, skipped {}, failed {}",
            source,
            report.written,
            report.in_sync.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Propagation::Done(report)
    }

    /// Write `camera` into `target` (unless already within tolerance) and render it.
    pub(crate) fn apply(
        &self,
        context: &dyn RenderingContext,
        camera: &CameraState,
        target: &ViewportId,
    ) -> Applied {
        let Some(handle) = context.viewport(target) else {
            warn!("Propagate: target viewport {} is gone, skipped", target);
            return Applied::Stale;
        };
        let current = match handle.camera() {
            Ok(current) => current,
            Err(e) => {
                warn!("Propagate: failed to read camera of {}: {:#}", target, e);
                return Applied::Failed;
            }
        };
        if current.approx_eq(camera, self.tolerance) {
            return Applied::InSync;
        }

        {
            let _guard = ApplyGuard::new(&self.applying, target);
            if let Err(e) = handle.set_camera(camera) {
                warn!("Propagate: failed to set camera of {}: {:#}", target, e);
                return Applied::Failed;
            }
        }

        if let Err(e) = context.render(std::slice::from_ref(target)) {
            warn!("Propagate: render of {} failed: {:#}", target, e);
        }
        trace!("Propagate: wrote zoom {:.3} into {}", camera.zoom, target);
        Applied::Written
    }
}
