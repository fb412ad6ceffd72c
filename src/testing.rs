//! Hosts for tests and the `simulate` command.
//!
//! [`ManualObserver`] never decides visibility by itself. The caller pushes
//! intersection batches with [`ManualObserver::dispatch`] (or the
//! [`reveal`](ManualObserver::reveal)/[`hide`](ManualObserver::hide)
//! shorthands). The observer delivers each batch to every connected
//! callback, the same way one shared browser `IntersectionObserver` would. So
//! callbacks see records for surfaces they do not own and have to filter.
//!
//! [`ManualObserver::lagging`] keeps disconnected callbacks reachable. It models
//! a host that had a batch queued when the disconnect happened, so stale-callback
//! handling can be exercised. Disconnected registrations pile up in that mode
//! until [`ManualObserver::flush_disconnected`] is called, which is fine for a
//! host that lives as long as one test or one `simulate` run.
//!
//! [`ManualObserver::refuse`] makes the host reject observation of a specific
//! surface with [`VisibilityError::Rejected`].
//!
//! [`UnavailableObserver`] is a host without any visibility primitive.

use crate::surface::SurfaceId;
use crate::visibility::{
    IntersectionCallback, IntersectionEntry, ObservationId, VisibilityError, VisibilityObserver,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct Registration {
    id: ObservationId,
    surface: SurfaceId,
    callback: IntersectionCallback,
    connected: bool,
}

/// Scriptable visibility host.
#[derive(Default)]
pub struct ManualObserver {
    registrations: RefCell<Vec<Registration>>,
    refused: RefCell<Vec<SurfaceId>>,
    next_id: Cell<u64>,
    lagging: bool,
    observe_calls: Cell<usize>,
    disconnect_calls: Cell<usize>,
}

impl ManualObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host whose disconnected callbacks still receive dispatched batches.
    pub fn lagging() -> Self {
        Self {
            lagging: true,
            ..Self::default()
        }
    }

    /// Reject every later `observe` call for `surface`.
    pub fn refuse(&self, surface: SurfaceId) {
        self.refused.borrow_mut().push(surface);
    }

    /// Forget disconnected registrations kept around by a lagging host.
    /// Returns how many were dropped.
    pub fn flush_disconnected(&self) -> usize {
        let mut registrations = self.registrations.borrow_mut();
        let before = registrations.len();
        registrations.retain(|r| r.connected);
        before - registrations.len()
    }

    /// Number of observations currently connected.
    pub fn active_subscriptions(&self) -> usize {
        self.registrations
            .borrow()
            .iter()
            .filter(|r| r.connected)
            .count()
    }

    pub fn is_observing(&self, surface: SurfaceId) -> bool {
        self.registrations
            .borrow()
            .iter()
            .any(|r| r.connected && r.surface == surface)
    }

    /// Total `observe` calls accepted over the host's lifetime.
    pub fn observe_calls(&self) -> usize {
        self.observe_calls.get()
    }

    /// Total `disconnect` calls that released a connected observation.
    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.get()
    }

    /// Deliver one batch to every reachable callback. Returns how many ran.
    pub fn dispatch(&self, entries: &[IntersectionEntry]) -> usize {
        // Callbacks may observe or disconnect re-entrantly, so the registry
        // must not be borrowed while they run.
        let callbacks: Vec<IntersectionCallback> = self
            .registrations
            .borrow()
            .iter()
            .filter(|r| r.connected || self.lagging)
            .map(|r| Rc::clone(&r.callback))
            .collect();
        for callback in &callbacks {
            callback(entries);
        }
        callbacks.len()
    }

    pub fn reveal(&self, surface: SurfaceId) -> usize {
        self.dispatch(&[IntersectionEntry::visible(surface)])
    }

    pub fn hide(&self, surface: SurfaceId) -> usize {
        self.dispatch(&[IntersectionEntry::hidden(surface)])
    }
}

impl VisibilityObserver for ManualObserver {
    fn observe(
        &self,
        surface: SurfaceId,
        callback: IntersectionCallback,
    ) -> Result<ObservationId, VisibilityError> {
        if self.refused.borrow().contains(&surface) {
            return Err(VisibilityError::Rejected {
                surface,
                reason: "surface is refused by this host".to_string(),
            });
        }
        let id = ObservationId::new(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.observe_calls.set(self.observe_calls.get() + 1);
        self.registrations.borrow_mut().push(Registration {
            id,
            surface,
            callback,
            connected: true,
        });
        Ok(id)
    }

    fn disconnect(&self, id: ObservationId) {
        let mut registrations = self.registrations.borrow_mut();
        let Some(pos) = registrations
            .iter()
            .position(|r| r.id == id && r.connected)
        else {
            return;
        };
        self.disconnect_calls.set(self.disconnect_calls.get() + 1);
        if self.lagging {
            registrations[pos].connected = false;
        } else {
            registrations.remove(pos);
        }
    }
}

/// A host with no visibility primitive at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableObserver;

impl VisibilityObserver for UnavailableObserver {
    fn observe(
        &self,
        _surface: SurfaceId,
        _callback: IntersectionCallback,
    ) -> Result<ObservationId, VisibilityError> {
        Err(VisibilityError::Unavailable)
    }

    fn disconnect(&self, _id: ObservationId) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting(hits: &Rc<Cell<usize>>) -> IntersectionCallback {
        let hits = Rc::clone(hits);
        Rc::new(move |_: &[IntersectionEntry]| hits.set(hits.get() + 1))
    }

    #[test]
    fn dispatch_reaches_every_connected_callback() {
        let host = ManualObserver::new();
        let hits = Rc::new(Cell::new(0));
        host.observe(SurfaceId::new(1), counting(&hits)).unwrap();
        host.observe(SurfaceId::new(2), counting(&hits)).unwrap();

        assert_eq!(host.reveal(SurfaceId::new(1)), 2);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn disconnect_removes_callback() {
        let host = ManualObserver::new();
        let hits = Rc::new(Cell::new(0));
        let id = host.observe(SurfaceId::new(1), counting(&hits)).unwrap();
        host.disconnect(id);

        assert_eq!(host.reveal(SurfaceId::new(1)), 0);
        assert_eq!(hits.get(), 0);
        assert_eq!(host.active_subscriptions(), 0);
    }

    #[test]
    fn disconnect_tolerates_unknown_and_repeated_ids() {
        let host = ManualObserver::new();
        let hits = Rc::new(Cell::new(0));
        let id = host.observe(SurfaceId::new(1), counting(&hits)).unwrap();
        host.disconnect(ObservationId::new(99));
        host.disconnect(id);
        host.disconnect(id);
        assert_eq!(host.disconnect_calls(), 1);
    }

    #[test]
    fn lagging_host_still_delivers_after_disconnect() {
        let host = ManualObserver::lagging();
        let hits = Rc::new(Cell::new(0));
        let id = host.observe(SurfaceId::new(1), counting(&hits)).unwrap();
        host.disconnect(id);

        assert_eq!(host.active_subscriptions(), 0);
        assert_eq!(host.reveal(SurfaceId::new(1)), 1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn flush_drops_only_disconnected_registrations() {
        let host = ManualObserver::lagging();
        let hits = Rc::new(Cell::new(0));
        let gone = host.observe(SurfaceId::new(1), counting(&hits)).unwrap();
        host.observe(SurfaceId::new(2), counting(&hits)).unwrap();
        host.disconnect(gone);

        assert_eq!(host.flush_disconnected(), 1);
        assert_eq!(host.flush_disconnected(), 0);
        assert_eq!(host.active_subscriptions(), 1);
        assert_eq!(host.reveal(SurfaceId::new(1)), 1);
    }

    #[test]
    fn refused_surface_is_rejected() {
        let host = ManualObserver::new();
        let hits = Rc::new(Cell::new(0));
        host.refuse(SurfaceId::new(4));

        let err = host.observe(SurfaceId::new(4), counting(&hits)).unwrap_err();
        assert!(matches!(
            err,
            VisibilityError::Rejected { surface, .. } if surface == SurfaceId::new(4)
        ));
        assert_eq!(host.observe_calls(), 0);
        assert!(host.observe(SurfaceId::new(5), counting(&hits)).is_ok());
    }

    #[test]
    fn reentrant_disconnect_during_dispatch() {
        let host = Rc::new(ManualObserver::new());
        let slot: Rc<Cell<Option<ObservationId>>> = Rc::new(Cell::new(None));
        let weak = Rc::downgrade(&host);
        let inner = Rc::clone(&slot);
        let id = host
            .observe(
                SurfaceId::new(1),
                Rc::new(move |_: &[IntersectionEntry]| {
                    if let (Some(host), Some(id)) = (weak.upgrade(), inner.get()) {
                        host.disconnect(id);
                    }
                }),
            )
            .unwrap();
        slot.set(Some(id));

        host.reveal(SurfaceId::new(1));
        assert_eq!(host.active_subscriptions(), 0);
    }

    #[test]
    fn unavailable_observer_refuses() {
        let hits = Rc::new(Cell::new(0));
        let err = UnavailableObserver
            .observe(SurfaceId::new(1), counting(&hits))
            .unwrap_err();
        assert_eq!(err, VisibilityError::Unavailable);
    }
}
