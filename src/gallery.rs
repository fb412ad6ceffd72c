//! The gallery page: a keyed list of deferred loaders.
//!
//! The page owns three collaborators, all injected:
//!
//! - a [`VisibilityObserver`] shared by every loader on the page,
//! - a [`KeyGenerator`] for list keys,
//! - an [`ImageNumberSource`] that picks which fox to show.
//!
//! Keys identify items across re-renders. A loader stays mounted for as long
//! as its key is in the list, and its surface id is allocated once when the
//! item is added. Re-rendering the page therefore never remounts a loader or
//! drops its subscription.

use crate::config::GalleryConfig;
use crate::loader::{DeferredImageLoader, LoaderDiagnostics, LoaderPhase};
use crate::surface::SurfaceId;
use crate::visibility::VisibilityObserver;
use maud::{DOCTYPE, Markup, html};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Redraws allowed when a generated key is already in use.
pub const MAX_KEY_ATTEMPTS: usize = 16;

/// Upper bound for random item keys.
pub const RANDOM_KEY_MAX: u64 = 155_423;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GalleryError {
    #[error("no unused item key after {attempts} attempts")]
    KeySpaceExhausted { attempts: usize },
    #[error("fixed number list is empty")]
    EmptyNumberList,
    #[error("no fox at position {0}")]
    NoSuchPosition(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ItemKey(u64);

impl ItemKey {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Collaborators
// ============================================================================

pub trait KeyGenerator {
    fn next_key(&mut self) -> ItemKey;
}

pub trait ImageNumberSource {
    fn next_number(&mut self) -> u32;
}

/// Keys 1, 2, 3, ...
#[derive(Debug, Clone)]
pub struct SequentialKeys {
    next: u64,
}

impl SequentialKeys {
    pub fn new() -> Self {
        Self { next: 1 }
    }
}

impl Default for SequentialKeys {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyGenerator for SequentialKeys {
    fn next_key(&mut self) -> ItemKey {
        let key = ItemKey(self.next);
        self.next += 1;
        key
    }
}

/// Keys drawn from `1..=RANDOM_KEY_MAX`.
#[derive(Debug, Clone)]
pub struct RandomKeys {
    rng: StdRng,
}

impl RandomKeys {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_os_rng() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }
}

impl KeyGenerator for RandomKeys {
    fn next_key(&mut self) -> ItemKey {
        ItemKey(self.rng.random_range(1..=RANDOM_KEY_MAX))
    }
}

/// Fox numbers drawn from `1..=max`.
#[derive(Debug, Clone)]
pub struct RandomFoxes {
    rng: StdRng,
    max: u32,
}

impl RandomFoxes {
    pub fn seeded(seed: u64, max: u32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            max: max.max(1),
        }
    }

    pub fn from_os_rng(max: u32) -> Self {
        Self {
            rng: StdRng::from_os_rng(),
            max: max.max(1),
        }
    }
}

impl ImageNumberSource for RandomFoxes {
    fn next_number(&mut self) -> u32 {
        self.rng.random_range(1..=self.max)
    }
}

/// Cycles through a fixed list of fox numbers.
#[derive(Debug, Clone)]
pub struct FixedNumbers {
    numbers: Vec<u32>,
    pos: usize,
}

impl FixedNumbers {
    pub fn new(numbers: Vec<u32>) -> Result<Self, GalleryError> {
        if numbers.is_empty() {
            return Err(GalleryError::EmptyNumberList);
        }
        Ok(Self { numbers, pos: 0 })
    }
}

impl ImageNumberSource for FixedNumbers {
    fn next_number(&mut self) -> u32 {
        let n = self.numbers[self.pos % self.numbers.len()];
        self.pos += 1;
        n
    }
}

/// `{base_url}/{n}.jpg`, tolerating a trailing slash on the base.
pub fn fox_url(base_url: &str, number: u32) -> String {
    format!("{}/{}.jpg", base_url.trim_end_matches('/'), number)
}

// ============================================================================
// Gallery
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GalleryItem {
    pub key: ItemKey,
    pub url: String,
}

/// Point-in-time view of one item, for CLI output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemStatus {
    pub key: ItemKey,
    pub url: String,
    pub surface: SurfaceId,
    pub phase: LoaderPhase,
    pub src: String,
    pub subscribed: bool,
    pub diagnostics: LoaderDiagnostics,
}

struct Slot {
    item: GalleryItem,
    surface: SurfaceId,
    loader: DeferredImageLoader,
}

pub struct Gallery {
    config: GalleryConfig,
    observer: Rc<dyn VisibilityObserver>,
    keys: Box<dyn KeyGenerator>,
    numbers: Box<dyn ImageNumberSource>,
    slots: Vec<Slot>,
    next_surface: u64,
}

impl Gallery {
    pub fn new(
        config: GalleryConfig,
        observer: Rc<dyn VisibilityObserver>,
        keys: Box<dyn KeyGenerator>,
        numbers: Box<dyn ImageNumberSource>,
    ) -> Self {
        Self {
            config,
            observer,
            keys,
            numbers,
            slots: Vec::new(),
            next_surface: 1,
        }
    }

    /// The "Add New Images" action: append one fox with a fresh key.
    pub fn add_new_fox(&mut self) -> Result<ItemKey, GalleryError> {
        let key = self.unused_key()?;
        let url = fox_url(&self.config.source.base_url, self.numbers.next_number());
        self.push(key, url);
        Ok(key)
    }

    /// Append an item with an explicit URL.
    pub fn add_image(&mut self, url: impl Into<String>) -> Result<ItemKey, GalleryError> {
        let key = self.unused_key()?;
        self.push(key, url.into());
        Ok(key)
    }

    /// Unmount the loader for `key`. Returns `false` if no such item exists.
    pub fn remove(&mut self, key: ItemKey) -> bool {
        let Some(pos) = self.slots.iter().position(|s| s.item.key == key) else {
            return false;
        };
        let slot = self.slots.remove(pos);
        log::debug!("unmounting {key}");
        slot.loader.unmount();
        true
    }

    /// Host commit: attach every surface and run every loader's effect.
    pub fn commit(&mut self) {
        for slot in &mut self.slots {
            slot.loader.attach_surface(slot.surface);
            slot.loader.commit();
        }
    }

    pub fn items(&self) -> Vec<GalleryItem> {
        self.slots.iter().map(|s| s.item.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn loader(&self, key: ItemKey) -> Option<&DeferredImageLoader> {
        self.slots
            .iter()
            .find(|s| s.item.key == key)
            .map(|s| &s.loader)
    }

    pub fn surface_of(&self, key: ItemKey) -> Option<SurfaceId> {
        self.slots
            .iter()
            .find(|s| s.item.key == key)
            .map(|s| s.surface)
    }

    /// Key of the item at 1-based `position`.
    pub fn key_at(&self, position: usize) -> Result<ItemKey, GalleryError> {
        position
            .checked_sub(1)
            .and_then(|i| self.slots.get(i))
            .map(|s| s.item.key)
            .ok_or(GalleryError::NoSuchPosition(position))
    }

    pub fn loaded_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.loader.phase() == LoaderPhase::Loaded)
            .count()
    }

    pub fn status(&self) -> Vec<ItemStatus> {
        self.slots
            .iter()
            .map(|s| ItemStatus {
                key: s.item.key,
                url: s.item.url.clone(),
                surface: s.surface,
                phase: s.loader.phase(),
                src: s.loader.current_source(),
                subscribed: s.loader.is_subscribed(),
                diagnostics: s.loader.diagnostics(),
            })
            .collect()
    }

    pub fn render_page(&self) -> Markup {
        let page = &self.config.page;
        html! {
            (DOCTYPE)
            html lang="en" {
                head {
                    meta charset="UTF-8";
                    meta name="viewport" content="width=device-width, initial-scale=1";
                    title { (page.title) }
                }
                body {
                    main {
                        h1 class="text-3xl font-bold underline" { (page.heading) }
                        button type="button" data-action="add-new-foxes" { "Add New Images" }
                        @for slot in &self.slots {
                            div class="p-4" data-key=(slot.item.key.get()) {
                                (slot.loader.render().to_markup(slot.loader.surface()))
                            }
                        }
                    }
                    footer {}
                }
            }
        }
    }

    fn unused_key(&mut self) -> Result<ItemKey, GalleryError> {
        for _ in 0..MAX_KEY_ATTEMPTS {
            let key = self.keys.next_key();
            if self.slots.iter().all(|s| s.item.key != key) {
                return Ok(key);
            }
            log::debug!("key {key} already in use, drawing again");
        }
        Err(GalleryError::KeySpaceExhausted {
            attempts: MAX_KEY_ATTEMPTS,
        })
    }

    fn push(&mut self, key: ItemKey, url: String) {
        let surface = SurfaceId::new(self.next_surface);
        self.next_surface += 1;
        log::debug!("mounting {key} for {url}");
        let loader = DeferredImageLoader::mount(
            url.clone(),
            Rc::clone(&self.observer),
            self.config.loader_options(),
        );
        self.slots.push(Slot {
            item: GalleryItem { key, url },
            surface,
            loader,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::PLACEHOLDER_SRC;
    use crate::testing::ManualObserver;

    /// Always returns the same key.
    struct StuckKeys;

    impl KeyGenerator for StuckKeys {
        fn next_key(&mut self) -> ItemKey {
            ItemKey::new(7)
        }
    }

    fn gallery(host: &Rc<ManualObserver>, numbers: Vec<u32>) -> Gallery {
        Gallery::new(
            GalleryConfig::default(),
            host.clone(),
            Box::new(SequentialKeys::new()),
            Box::new(FixedNumbers::new(numbers).unwrap()),
        )
    }

    #[test]
    fn fox_url_joins_base_and_number() {
        assert_eq!(
            fox_url("https://randomfox.ca/images", 42),
            "https://randomfox.ca/images/42.jpg"
        );
        assert_eq!(
            fox_url("https://randomfox.ca/images/", 42),
            "https://randomfox.ca/images/42.jpg"
        );
    }

    #[test]
    fn seeded_generators_are_deterministic() {
        let mut a = RandomFoxes::seeded(9, 123);
        let mut b = RandomFoxes::seeded(9, 123);
        let xs: Vec<u32> = (0..10).map(|_| a.next_number()).collect();
        let ys: Vec<u32> = (0..10).map(|_| b.next_number()).collect();
        assert_eq!(xs, ys);
        assert!(xs.iter().all(|n| (1..=123).contains(n)));
    }

    #[test]
    fn random_keys_stay_in_range() {
        let mut keys = RandomKeys::seeded(3);
        for _ in 0..100 {
            let key = keys.next_key().get();
            assert!((1..=RANDOM_KEY_MAX).contains(&key));
        }
    }

    #[test]
    fn fixed_numbers_cycle() {
        let mut numbers = FixedNumbers::new(vec![4, 5]).unwrap();
        assert_eq!(
            (0..5).map(|_| numbers.next_number()).collect::<Vec<_>>(),
            vec![4, 5, 4, 5, 4]
        );
        assert_eq!(
            FixedNumbers::new(vec![]).unwrap_err(),
            GalleryError::EmptyNumberList
        );
    }

    #[test]
    fn add_new_fox_builds_url_from_config() {
        let host = Rc::new(ManualObserver::new());
        let mut gallery = gallery(&host, vec![42]);
        let key = gallery.add_new_fox().unwrap();
        assert_eq!(
            gallery.items(),
            vec![GalleryItem {
                key,
                url: "https://randomfox.ca/images/42.jpg".to_string()
            }]
        );
    }

    #[test]
    fn add_image_uses_url_verbatim() {
        let host = Rc::new(ManualObserver::new());
        let mut gallery = gallery(&host, vec![1]);
        let key = gallery.add_image("https://example.test/images/42.jpg").unwrap();
        assert_eq!(
            gallery.loader(key).unwrap().target_source(),
            "https://example.test/images/42.jpg"
        );
    }

    #[test]
    fn duplicate_keys_are_redrawn_then_rejected() {
        let host = Rc::new(ManualObserver::new());
        let mut gallery = Gallery::new(
            GalleryConfig::default(),
            host.clone(),
            Box::new(StuckKeys),
            Box::new(FixedNumbers::new(vec![1]).unwrap()),
        );
        gallery.add_new_fox().unwrap();
        let err = gallery.add_new_fox().unwrap_err();
        assert_eq!(
            err,
            GalleryError::KeySpaceExhausted {
                attempts: MAX_KEY_ATTEMPTS
            }
        );
        assert_eq!(gallery.len(), 1);
    }

    #[test]
    fn commit_subscribes_each_item_once() {
        let host = Rc::new(ManualObserver::new());
        let mut gallery = gallery(&host, vec![1, 2, 3]);
        for _ in 0..3 {
            gallery.add_new_fox().unwrap();
        }
        gallery.commit();
        gallery.commit();
        assert_eq!(host.active_subscriptions(), 3);
        assert_eq!(host.observe_calls(), 3);
    }

    #[test]
    fn adding_items_keeps_existing_loaders_mounted() {
        let host = Rc::new(ManualObserver::new());
        let mut gallery = gallery(&host, vec![1, 2]);
        let first = gallery.add_new_fox().unwrap();
        gallery.commit();
        host.reveal(gallery.surface_of(first).unwrap());

        gallery.add_new_fox().unwrap();
        gallery.commit();
        assert_eq!(
            gallery.loader(first).unwrap().phase(),
            LoaderPhase::Loaded
        );
        assert_eq!(gallery.loaded_count(), 1);
    }

    #[test]
    fn remove_releases_subscription() {
        let host = Rc::new(ManualObserver::new());
        let mut gallery = gallery(&host, vec![1, 2]);
        let first = gallery.add_new_fox().unwrap();
        gallery.add_new_fox().unwrap();
        gallery.commit();

        assert!(gallery.remove(first));
        assert!(!gallery.remove(first));
        assert_eq!(host.active_subscriptions(), 1);
        assert_eq!(gallery.len(), 1);
    }

    #[test]
    fn key_at_is_one_based() {
        let host = Rc::new(ManualObserver::new());
        let mut gallery = gallery(&host, vec![1]);
        let key = gallery.add_new_fox().unwrap();
        assert_eq!(gallery.key_at(1).unwrap(), key);
        assert_eq!(gallery.key_at(0), Err(GalleryError::NoSuchPosition(0)));
        assert_eq!(gallery.key_at(2), Err(GalleryError::NoSuchPosition(2)));
    }

    #[test]
    fn page_renders_heading_button_and_items() {
        let host = Rc::new(ManualObserver::new());
        let mut gallery = gallery(&host, vec![42]);
        gallery.add_new_fox().unwrap();
        let html = gallery.render_page().into_string();

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Fox Gallery</title>"));
        assert!(html.contains("Hello Foxes"));
        assert!(html.contains("Add New Images"));
        assert!(html.contains(r#"class="p-4""#));
        assert!(html.contains(PLACEHOLDER_SRC));
        assert!(!html.contains("42.jpg"));
    }

    #[test]
    fn page_shows_target_after_reveal() {
        let host = Rc::new(ManualObserver::new());
        let mut gallery = gallery(&host, vec![42]);
        let key = gallery.add_new_fox().unwrap();
        gallery.commit();
        host.reveal(gallery.surface_of(key).unwrap());

        let html = gallery.render_page().into_string();
        assert!(html.contains(r#"src="https://randomfox.ca/images/42.jpg""#));
        assert!(html.contains(r#"id="surface-1""#));
    }

    #[test]
    fn status_reports_each_item() {
        let host = Rc::new(ManualObserver::new());
        let mut gallery = gallery(&host, vec![5, 6]);
        gallery.add_new_fox().unwrap();
        gallery.add_new_fox().unwrap();
        gallery.commit();

        let status = gallery.status();
        assert_eq!(status.len(), 2);
        assert!(status.iter().all(|s| s.subscribed));
        assert!(status.iter().all(|s| s.phase == LoaderPhase::Placeholder));
        assert_eq!(status[1].url, "https://randomfox.ca/images/6.jpg");
    }
}
