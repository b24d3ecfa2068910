//! Single-flight gate for uploads.
//!
//! OCR is memory hungry, so only one upload is processed at a time per
//! process. A second upload arriving while the slot is held is turned away
//! immediately with [`crate::IngestError::Busy`] rather than queued.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A lock with at most one holder.
pub trait UploadGate: Send + Sync {
    /// Take the slot for `request_id`. Returns `false` if it is held.
    fn try_acquire(&self, request_id: &str) -> bool;

    /// Free the slot. Safe to call when it is not held.
    fn release(&self);

    /// Free the slot only if `request_id` still holds it.
    ///
    /// Gates that do not track holders fall back to [`UploadGate::release`].
    fn release_for(&self, request_id: &str) {
        let _ = request_id;
        self.release();
    }

    fn is_held(&self) -> bool;
}

static GLOBAL: Lazy<Arc<ProcessingGate>> = Lazy::new(|| Arc::new(ProcessingGate::new()));

/// The real gate: an atomic flag plus a best-effort record of who holds it.
#[derive(Debug, Default)]
pub struct ProcessingGate {
    busy: AtomicBool,
    in_flight: Mutex<HashMap<String, Instant>>,
}

impl ProcessingGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide gate shared by every pipeline that does not get its
    /// own.
    pub fn global() -> Arc<ProcessingGate> {
        Arc::clone(&GLOBAL)
    }

    /// Request ids currently holding the slot, with how long they have held it.
    pub fn in_flight(&self) -> Vec<(String, Duration)> {
        let map = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        map.iter()
            .map(|(id, started)| (id.clone(), started.elapsed()))
            .collect()
    }
}

impl UploadGate for ProcessingGate {
    fn try_acquire(&self, request_id: &str) -> bool {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let holders = self.in_flight();
            warn!(
                "Rejecting upload {}: slot held by {:?}",
                request_id,
                holders.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>()
            );
            return false;
        }
        self.in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(request_id.to_string(), Instant::now());
        debug!("Upload {} acquired the processing slot", request_id);
        true
    }

    fn release(&self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
        if self.busy.swap(false, Ordering::AcqRel) {
            debug!("Processing slot released");
        }
    }

    fn release_for(&self, request_id: &str) {
        let mut map = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if map.remove(request_id).is_none() {
            debug!("Upload {} no longer holds the processing slot", request_id);
            return;
        }
        map.clear();
        self.busy.store(false, Ordering::Release);
        debug!("Processing slot released by {}", request_id);
    }

    fn is_held(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// A gate that never refuses. For tests and hosts with their own admission
/// control.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGate;

impl UploadGate for NoopGate {
    fn try_acquire(&self, _request_id: &str) -> bool {
        true
    }

    fn release(&self) {}

    fn is_held(&self) -> bool {
        false
    }
}

/// Holds a gate slot and releases it when dropped.
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct GatePermit {
    gate: Arc<dyn UploadGate>,
    request_id: String,
}

impl GatePermit {
    /// Acquire `gate` for `request_id`, or `None` if it is held.
    pub fn acquire(gate: Arc<dyn UploadGate>, request_id: impl Into<String>) -> Option<Self> {
        let request_id = request_id.into();
        gate.try_acquire(&request_id).then(|| Self { gate, request_id })
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.release_for(&self.request_id);
    }
}

impl std::fmt::Debug for GatePermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatePermit")
            .field("request_id", &self.request_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_reject() {
        let gate = ProcessingGate::new();
        assert!(gate.try_acquire("a"));
        assert!(!gate.try_acquire("b"));
        assert!(gate.is_held());
        gate.release();
        assert!(!gate.is_held());
        assert!(gate.try_acquire("b"));
    }

    #[test]
    fn release_is_idempotent() {
        let gate = ProcessingGate::new();
        gate.release();
        assert!(gate.try_acquire("a"));
        gate.release();
        gate.release();
        assert!(!gate.is_held());
    }

    #[test]
    fn in_flight_tracks_holder() {
        let gate = ProcessingGate::new();
        assert!(gate.in_flight().is_empty());
        assert!(gate.try_acquire("req-1"));
        let held = gate.in_flight();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].0, "req-1");
        gate.release();
        assert!(gate.in_flight().is_empty());
    }

    #[test]
    fn permit_releases_on_drop() {
        let gate = Arc::new(ProcessingGate::new());
        {
            let permit = GatePermit::acquire(gate.clone(), "x").expect("free gate");
            assert_eq!(permit.request_id(), "x");
            assert!(GatePermit::acquire(gate.clone(), "y").is_none());
        }
        assert!(!gate.is_held());
    }

    #[test]
    fn stale_permit_leaves_new_holder_alone() {
        let gate = Arc::new(ProcessingGate::new());
        let first = GatePermit::acquire(gate.clone(), "first").expect("free gate");

        // Host resets after a downstream failure; a new upload gets in.
        gate.release();
        let second = GatePermit::acquire(gate.clone(), "second").expect("reset gate");

        drop(first);
        assert!(gate.is_held());
        assert!(GatePermit::acquire(gate.clone(), "third").is_none());
        assert_eq!(gate.in_flight().len(), 1);

        drop(second);
        assert!(!gate.is_held());
    }

    #[test]
    fn noop_gate_never_blocks() {
        let gate = NoopGate;
        assert!(gate.try_acquire("a"));
        assert!(gate.try_acquire("b"));
        assert!(!gate.is_held());
    }

    #[test]
    fn contended_acquire_has_one_winner() {
        let gate = Arc::new(ProcessingGate::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || gate.try_acquire(&format!("t{i}")))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
