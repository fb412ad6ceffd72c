//! # Fox Gallery
//!
//! A fox photo gallery whose images only load once they scroll into view.
//! The page is a list of [`DeferredImageLoader`](loader::DeferredImageLoader)s.
//! Each one shows an embedded blank placeholder and watches its own surface
//! through the host's visibility primitive. The first time the surface
//! intersects the viewport it swaps in the real fox.
//!
//! # Architecture: Host-Driven Lifecycle
//!
//! Loaders never schedule anything themselves. The host (a browser shim, a
//! native toolkit, or a test) drives them through one cycle:
//!
//! ```text
//! 1. Render   loader  →  ImageSurface       (placeholder or target)
//! 2. Commit   host attaches SurfaceId, loader subscribes to visibility
//! 3. Event    host delivers intersection batch, loader swaps source once
//! 4. Unmount  subscription released synchronously
//! ```
//!
//! Everything runs on one thread. Shared state lives in `Rc`/`RefCell`, and
//! callbacks hold only `Weak` references back to their loader. A late callback
//! can therefore never keep a torn-down loader alive or mutate it.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`loader`] | The deferred loader: state, phases, lifecycle, policies |
//! | [`visibility`] | Host visibility contract and the scoped `VisibilitySubscription` |
//! | [`surface`] | `SurfaceId`, `ImageSurface`, placeholder payload, `<img>` markup |
//! | [`gallery`] | The page: keyed list of loaders, injected key and fox-number sources |
//! | [`config`] | `gallery.toml` loading, defaults and validation |
//! | [`testing`] | `ManualObserver` and `UnavailableObserver` hosts |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Subscriptions Are Values
//!
//! A visibility observation is a [`VisibilitySubscription`](visibility::VisibilitySubscription)
//! owned by exactly one loader. Dropping it disconnects, so every exit path
//! releases it: unmount, surface detach, retarget, and panics while
//! unwinding. The loader cannot forget a cleanup call.
//!
//! ## Nothing Throws
//!
//! A missing surface, a host without visibility observation, and late
//! callbacks are all handled inside the loader. They are logged through
//! `log` and counted in `LoaderDiagnostics`. Fetch failures belong to whatever
//! renders the `<img>`.
//!
//! ## Injected Randomness
//!
//! Item keys and fox numbers come from [`KeyGenerator`](gallery::KeyGenerator)
//! and [`ImageNumberSource`](gallery::ImageNumberSource) implementations
//! handed to the gallery. Seeding them makes a whole page reproducible.

pub mod config;
pub mod gallery;
pub mod loader;
pub mod output;
pub mod surface;
pub mod testing;
pub mod visibility;
