//! Synchronization registry - the set of linked viewports.
//!
//! Each member owns exactly one camera-changed `Subscription`. Joining an
//! existing member binds nothing; leaving a non-member does nothing.
//! Members are kept in join order so "the earliest other member" is
//! deterministic.
//!
//! Every join gets a fresh epoch. Deferred work captured at join time
//! compares epochs to detect a leave/re-join in between.

use indexmap::IndexMap;
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::context::{ViewportHandle, ViewportId};
use super::event_bus::Subscription;
use super::viewport_events::CameraModifiedEvent;

struct Member {
    subscription: Subscription,
    epoch: u64,
}

/// Membership store. Clones share the same members.
#[derive(Clone, Default)]
pub struct SyncRegistry {
    members: Arc<Mutex<IndexMap<ViewportId, Member>>>,
    epoch: Arc<AtomicU64>,
}

impl std::fmt::Debug for SyncRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRegistry")
            .field("members", &self.members())
            .finish()
    }
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` and bind `listener` to the source's camera-changed stream.
    ///
    /// Returns false (and binds nothing) if `id` is already a member.
    pub fn join<F>(&self, id: &ViewportId, source: &dyn ViewportHandle, listener: F) -> bool
    where
        F: Fn(&CameraModifiedEvent) + Send + Sync + 'static,
    {
        let mut members = self.members.lock().unwrap_or_else(|e| e.into_inner());
        if members.contains_key(id) {
            return false;
        }
        let subscription = source.events().subscribe::<CameraModifiedEvent, _>(listener);
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed) + 1;
        members.insert(id.clone(), Member { subscription, epoch });
        debug!("Sync: {} joined ({} members)", id, members.len());
        true
    }

    /// Unbind and remove `id`. Returns false if it was not a member.
    pub fn leave(&self, id: &ViewportId) -> bool {
        let removed = {
            let mut members = self.members.lock().unwrap_or_else(|e| e.into_inner());
            members.shift_remove(id)
        };
        match removed {
            Some(member) => {
                member.subscription.release();
                debug!("Sync: {} left", id);
                true
            }
            None => false,
        }
    }

    /// Snapshot of member ids in join order.
    pub fn members(&self) -> Vec<ViewportId> {
        self.members
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn is_member(&self, id: &ViewportId) -> bool {
        self.members
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    /// Join epoch of a member
    pub fn epoch_of(&self, id: &ViewportId) -> Option<u64> {
        self.members
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .map(|m| m.epoch)
    }

    /// Earliest-joined member other than `id`.
    pub fn first_other(&self, id: &ViewportId) -> Option<ViewportId> {
        self.members
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .find(|m| *m != id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.members.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all members and unbind all listeners. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let drained: Vec<(ViewportId, Member)> = {
            let mut members = self.members.lock().unwrap_or_else(|e| e.into_inner());
            members.drain(..).collect()
        };
        let count = drained.len();
        for (_, member) in drained {
            member.subscription.release();
        }
        if count > 0 {
            debug!("Sync: cleared {} members", count);
        }
        count
    }
}
