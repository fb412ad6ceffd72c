//! Visibility observation: the host primitive and the scoped subscription.
//!
//! The loader does not know how the host detects visibility. A browser would
//! use `IntersectionObserver`, a native toolkit would compare layout rects
//! against the scroll viewport, and tests use
//! [`ManualObserver`](crate::testing::ManualObserver). All of them sit behind
//! [`VisibilityObserver`]: observe a surface with a callback, and disconnect
//! it later.
//!
//! # Subscription lifetime
//!
//! [`VisibilitySubscription`] is the only way the crate talks to an observer.
//! It is acquired with [`VisibilitySubscription::start`] and released by
//! [`VisibilitySubscription::stop`] or by dropping it. Release is synchronous
//! and idempotent.
//!
//! A host may still have a callback queued when the subscription is released.
//! Browsers deliver intersection records in a task, so a disconnect can race a
//! batch that was already scheduled. Every callback handed to the host is
//! wrapped in a liveness check. Once released, the wrapper swallows the batch
//! and reports it to the `on_stale` hook instead of the real callback.

use crate::surface::SurfaceId;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// One intersection record delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntersectionEntry {
    pub target: SurfaceId,
    pub is_intersecting: bool,
}

impl IntersectionEntry {
    pub fn visible(target: SurfaceId) -> Self {
        Self {
            target,
            is_intersecting: true,
        }
    }

    pub fn hidden(target: SurfaceId) -> Self {
        Self {
            target,
            is_intersecting: false,
        }
    }
}

/// Callback invoked with a batch of intersection records.
///
/// Batches may contain records for surfaces other than the one observed, so
/// callbacks must filter on [`IntersectionEntry::target`].
pub type IntersectionCallback = Rc<dyn Fn(&[IntersectionEntry])>;

/// Host-issued handle for one `observe` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObservationId(u64);

impl ObservationId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ObservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observation-{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VisibilityError {
    #[error("visibility observation is not available in this host")]
    Unavailable,
    #[error("host refused to observe {surface}: {reason}")]
    Rejected { surface: SurfaceId, reason: String },
}

/// The host capability the loader depends on.
///
/// Implementations run on the UI thread. `disconnect` must be idempotent and
/// must tolerate ids it has never issued.
pub trait VisibilityObserver {
    fn observe(
        &self,
        surface: SurfaceId,
        callback: IntersectionCallback,
    ) -> Result<ObservationId, VisibilityError>;

    fn disconnect(&self, id: ObservationId);
}

/// A live observation of one surface, released on drop.
pub struct VisibilitySubscription {
    observer: Rc<dyn VisibilityObserver>,
    surface: SurfaceId,
    id: Option<ObservationId>,
    live: Rc<Cell<bool>>,
}

impl VisibilitySubscription {
    /// Observe `surface`, delivering batches to `on_entries` until released.
    ///
    /// `on_stale` runs instead of `on_entries` for any batch the host delivers
    /// after release.
    pub fn start<F, S>(
        observer: Rc<dyn VisibilityObserver>,
        surface: SurfaceId,
        on_entries: F,
        on_stale: S,
    ) -> Result<Self, VisibilityError>
    where
        F: Fn(&[IntersectionEntry]) + 'static,
        S: Fn(SurfaceId) + 'static,
    {
        let live = Rc::new(Cell::new(true));
        let guard = Rc::clone(&live);
        let callback: IntersectionCallback = Rc::new(move |entries: &[IntersectionEntry]| {
            if guard.get() {
                on_entries(entries);
            } else {
                log::debug!("dropping late intersection batch for {surface}");
                on_stale(surface);
            }
        });

        let id = match observer.observe(surface, callback) {
            Ok(id) => id,
            Err(e) => {
                live.set(false);
                return Err(e);
            }
        };
        log::debug!("observing {surface} as {id}");

        Ok(Self {
            observer,
            surface,
            id: Some(id),
            live,
        })
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }

    /// Disconnect from the host. Safe to call more than once.
    pub fn stop(&mut self) {
        self.live.set(false);
        if let Some(id) = self.id.take() {
            self.observer.disconnect(id);
            log::debug!("released {id} for {}", self.surface);
        }
    }
}

impl Drop for VisibilitySubscription {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for VisibilitySubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisibilitySubscription")
            .field("surface", &self.surface)
            .field("id", &self.id)
            .finish()
    }
}
