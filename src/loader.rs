//! The deferred image loader.
//!
//! A [`DeferredImageLoader`] shows [`PLACEHOLDER_SRC`] until the host reports
//! that its surface intersects the viewport. Then it swaps in the target URL,
//! once. The host drives it through a fixed cycle:
//!
//! ```text
//! mount ─► render ─► attach_surface ─► commit ─┐
//!            ▲                                 │  (intersection batch)
//!            └──────────── render ◄────────────┘
//! ... unmount / drop releases the subscription
//! ```
//!
//! ## Phases
//!
//! | Phase | `current_source` | Leaves on |
//! |-------|------------------|-----------|
//! | `Placeholder` | placeholder | first intersecting record for the owned surface |
//! | `Loaded` | target | never, unless the parent retargets |
//!
//! `current_source` is always either the placeholder or the target.
//!
//! ## Conditions
//!
//! Nothing here returns an error to the caller. The four [`LoaderCondition`]s
//! are handled in place, logged, and counted in [`LoaderDiagnostics`]:
//!
//! - **Missing surface**: `commit` before the host attached a surface is a
//!   no-op; the next commit retries.
//! - **Primitive unavailable**: [`FallbackPolicy`] decides between loading
//!   right away and keeping the placeholder.
//! - **Stale callback**: batches that arrive after release, or after a
//!   retarget, are swallowed.
//! - **Upstream failure**: fetch errors belong to whatever renders the
//!   `<img>`; hosts may report them, the loader only records them.

use crate::surface::{ImageSurface, PLACEHOLDER_SRC, SurfaceId, SurfaceStyle};
use crate::visibility::{IntersectionEntry, VisibilityObserver, VisibilitySubscription};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderPhase {
    Placeholder,
    Loaded,
}

impl fmt::Display for LoaderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Placeholder => f.write_str("placeholder"),
            Self::Loaded => f.write_str("loaded"),
        }
    }
}

/// What to do when the host has no visibility primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolicy {
    /// Behave as if the surface were visible.
    #[default]
    LoadImmediately,
    /// Leave the placeholder in place for the life of the mount.
    KeepPlaceholder,
}

/// What to do when the parent changes `image` on a mounted loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetargetPolicy {
    /// Back to the placeholder, and wait for the surface to be seen again.
    #[default]
    Reobserve,
    /// A loaded surface has already been seen, so show the new target at once.
    /// A loader still in placeholder re-observes as with `Reobserve`.
    SwapImmediately,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoaderOptions {
    pub style: SurfaceStyle,
    pub fallback: FallbackPolicy,
    pub retarget: RetargetPolicy,
}

/// Locally handled conditions. None of these reach the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderCondition {
    MissingSurfaceReference,
    ObservationPrimitiveUnavailable,
    StaleCallbackAfterTeardown,
    UpstreamLoadFailure,
}

impl fmt::Display for LoaderCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MissingSurfaceReference => "surface not attached yet",
            Self::ObservationPrimitiveUnavailable => "visibility observation unavailable",
            Self::StaleCallbackAfterTeardown => "late visibility callback",
            Self::UpstreamLoadFailure => "image fetch failed upstream",
        };
        f.write_str(s)
    }
}

/// Per-loader tally of handled conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoaderDiagnostics {
    pub missing_surface: u32,
    pub primitive_unavailable: u32,
    pub stale_callbacks: u32,
    pub upstream_failures: u32,
}

impl LoaderDiagnostics {
    fn record(&mut self, condition: LoaderCondition) {
        let counter = match condition {
            LoaderCondition::MissingSurfaceReference => &mut self.missing_surface,
            LoaderCondition::ObservationPrimitiveUnavailable => &mut self.primitive_unavailable,
            LoaderCondition::StaleCallbackAfterTeardown => &mut self.stale_callbacks,
            LoaderCondition::UpstreamLoadFailure => &mut self.upstream_failures,
        };
        *counter = counter.saturating_add(1);
    }
}

/// Source selection for one mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderState {
    current_source: String,
    target_source: String,
    phase: LoaderPhase,
}

impl LoaderState {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            current_source: PLACEHOLDER_SRC.to_string(),
            target_source: target.into(),
            phase: LoaderPhase::Placeholder,
        }
    }

    pub fn current_source(&self) -> &str {
        &self.current_source
    }

    pub fn target_source(&self) -> &str {
        &self.target_source
    }

    pub fn phase(&self) -> LoaderPhase {
        self.phase
    }

    /// An empty target has nothing to load, so it never leaves the placeholder.
    pub fn has_target(&self) -> bool {
        !self.target_source.is_empty()
    }

    /// Placeholder → Loaded. Returns `false` when already loaded.
    fn reveal(&mut self) -> bool {
        if self.phase == LoaderPhase::Loaded || !self.has_target() {
            return false;
        }
        self.current_source.clone_from(&self.target_source);
        self.phase = LoaderPhase::Loaded;
        true
    }

    fn reset(&mut self, target: String) {
        self.current_source = PLACEHOLDER_SRC.to_string();
        self.target_source = target;
        self.phase = LoaderPhase::Placeholder;
    }

    fn swap(&mut self, target: String) {
        self.current_source.clone_from(&target);
        self.target_source = target;
        self.phase = LoaderPhase::Loaded;
    }
}

/// State reachable from visibility callbacks.
struct Shared {
    state: RefCell<LoaderState>,
    diagnostics: Cell<LoaderDiagnostics>,
}

impl Shared {
    fn record(&self, condition: LoaderCondition) {
        let mut diagnostics = self.diagnostics.get();
        diagnostics.record(condition);
        self.diagnostics.set(diagnostics);
    }

    /// Handle a batch from a subscription armed for `surface` and `armed_for`.
    fn on_entries(&self, surface: SurfaceId, armed_for: &str, entries: &[IntersectionEntry]) {
        let hit = entries
            .iter()
            .any(|e| e.target == surface && e.is_intersecting);
        if !hit {
            return;
        }
        let mut state = self.state.borrow_mut();
        if state.target_source != armed_for {
            drop(state);
            log::debug!("ignoring batch armed for a previous target on {surface}");
            self.record(LoaderCondition::StaleCallbackAfterTeardown);
            return;
        }
        if state.reveal() {
            log::debug!("{surface} is visible, loading {}", state.target_source);
        }
    }
}

/// Lazily loaded image bound to one rendered surface.
pub struct DeferredImageLoader {
    shared: Rc<Shared>,
    observer: Rc<dyn VisibilityObserver>,
    options: LoaderOptions,
    surface: Option<SurfaceId>,
    subscription: Option<VisibilitySubscription>,
    /// Set once the fallback has been applied for the current target.
    fallback_applied: bool,
}

impl DeferredImageLoader {
    /// Mount in placeholder state. Nothing is observed until the host attaches
    /// a surface and commits.
    pub fn mount(
        image: impl Into<String>,
        observer: Rc<dyn VisibilityObserver>,
        options: LoaderOptions,
    ) -> Self {
        let state = LoaderState::new(image);
        if !state.has_target() {
            log::debug!("mounted loader with an empty image, placeholder is final");
        }
        Self {
            shared: Rc::new(Shared {
                state: RefCell::new(state),
                diagnostics: Cell::new(LoaderDiagnostics::default()),
            }),
            observer,
            options,
            surface: None,
            subscription: None,
            fallback_applied: false,
        }
    }

    pub fn render(&self) -> ImageSurface {
        let state = self.shared.state.borrow();
        ImageSurface::new(
            &state.current_source,
            state.phase == LoaderPhase::Placeholder,
            &self.options.style,
        )
    }

    pub fn phase(&self) -> LoaderPhase {
        self.shared.state.borrow().phase
    }

    pub fn current_source(&self) -> String {
        self.shared.state.borrow().current_source.clone()
    }

    pub fn target_source(&self) -> String {
        self.shared.state.borrow().target_source.clone()
    }

    pub fn state(&self) -> LoaderState {
        self.shared.state.borrow().clone()
    }

    pub fn surface(&self) -> Option<SurfaceId> {
        self.surface
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.as_ref().is_some_and(|s| s.is_active())
    }

    pub fn diagnostics(&self) -> LoaderDiagnostics {
        self.shared.diagnostics.get()
    }

    /// Host ref callback: the element now exists as `surface`.
    pub fn attach_surface(&mut self, surface: SurfaceId) {
        if self.surface == Some(surface) {
            return;
        }
        self.release();
        self.surface = Some(surface);
    }

    /// Host ref callback: the element left the tree.
    pub fn detach_surface(&mut self) {
        self.release();
        self.surface = None;
    }

    /// Effect phase, run by the host after every render cycle.
    pub fn commit(&mut self) {
        let Some(surface) = self.surface else {
            log::debug!("commit before surface attached, retrying next cycle");
            self.shared.record(LoaderCondition::MissingSurfaceReference);
            return;
        };

        let (phase, target) = {
            let state = self.shared.state.borrow();
            (state.phase, state.target_source.clone())
        };
        if phase == LoaderPhase::Loaded {
            // Nothing left to observe for this target.
            self.release();
            return;
        }
        if target.is_empty() || self.fallback_applied {
            return;
        }
        if self.subscription.as_ref().is_some_and(|s| s.surface() == surface) {
            return;
        }
        self.release();

        let entries = Rc::downgrade(&self.shared);
        let stale = Weak::clone(&entries);
        let armed_for = target.clone();
        let started = VisibilitySubscription::start(
            Rc::clone(&self.observer),
            surface,
            move |batch: &[IntersectionEntry]| {
                if let Some(shared) = entries.upgrade() {
                    shared.on_entries(surface, &armed_for, batch);
                }
            },
            move |_| {
                if let Some(shared) = stale.upgrade() {
                    shared.record(LoaderCondition::StaleCallbackAfterTeardown);
                }
            },
        );

        match started {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => {
                self.shared
                    .record(LoaderCondition::ObservationPrimitiveUnavailable);
                self.fallback_applied = true;
                match self.options.fallback {
                    FallbackPolicy::LoadImmediately => {
                        log::warn!("{e}; loading {target} without waiting for visibility");
                        self.shared.state.borrow_mut().reveal();
                    }
                    FallbackPolicy::KeepPlaceholder => {
                        log::warn!("{e}; {target} stays on its placeholder");
                    }
                }
            }
        }
    }

    /// The parent passed a new `image`. See [`RetargetPolicy`].
    pub fn set_image(&mut self, image: impl Into<String>) {
        let image = image.into();
        let phase = {
            let state = self.shared.state.borrow();
            if state.target_source == image {
                return;
            }
            state.phase
        };

        self.release();
        self.fallback_applied = false;
        let mut state = self.shared.state.borrow_mut();
        match (self.options.retarget, phase) {
            (RetargetPolicy::SwapImmediately, LoaderPhase::Loaded) if !image.is_empty() => {
                log::debug!("swapping loaded image to {image}");
                state.swap(image);
            }
            _ => {
                log::debug!("retargeted to {image}, waiting for visibility");
                state.reset(image);
            }
        }
    }

    /// Record a fetch failure reported by the host. State is left untouched.
    pub fn report_upstream_failure(&self, reason: &str) {
        log::warn!(
            "failed to load {}: {reason}",
            self.shared.state.borrow().target_source
        );
        self.shared.record(LoaderCondition::UpstreamLoadFailure);
    }

    /// Tear down. Equivalent to dropping the loader.
    pub fn unmount(self) {}

    fn release(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.stop();
        }
    }
}

impl Drop for DeferredImageLoader {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for DeferredImageLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredImageLoader")
            .field("state", &*self.shared.state.borrow())
            .field("surface", &self.surface)
            .field("subscription", &self.subscription)
            .finish()
    }
}
