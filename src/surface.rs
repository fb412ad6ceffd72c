//! The rendered image surface.
//!
//! A loader never touches a real DOM. It describes what it wants on screen as
//! an [`ImageSurface`], and the host turns that into an element. The host is the
//! gallery page here, or a test. The host also hands back a [`SurfaceId`] once
//! the element exists. That id is the "stable reference" the visibility
//! primitive observes.
//!
//! ## Placeholder
//!
//! Before the target is visible the surface shows [`PLACEHOLDER_SRC`], a blank
//! 320×320 SVG embedded as a `data:` URI. It costs zero network round-trips.
//! While in placeholder state the surface also carries a neutral tint class so
//! the empty box is visible on the page.
//!
//! ## Markup
//!
//! ```html
//! <img width="320" height="auto" src="data:image/svg+xml;base64,..."
//!      class="rounded-2xl bg-gray-300" data-state="placeholder">
//! ```

use maud::{Markup, html};
use serde::Serialize;
use std::fmt;

/// Blank 320×320 SVG, base64-encoded.
pub const PLACEHOLDER_SRC: &str = "data:image/svg+xml;base64,PHN2ZyB3aWR0aD0iMzIwIiBoZWlnaHQ9IjMyMCIgdmVyc2lvbj0iMS4xIiB4bWxucz0iaHR0cDovL3d3dy53My5vcmcvMjAwMC9zdmciLz4=";

/// Height is always left to the browser so the fox keeps its aspect ratio.
pub const AUTO_HEIGHT: &str = "auto";

/// Host-assigned reference to one rendered element.
///
/// Ids are handed out by the host when the element is committed to the tree
/// and are never reused while the element is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SurfaceId(u64);

impl SurfaceId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

/// Presentation settings shared by every surface on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceStyle {
    /// Fixed pixel width of every image.
    pub width: u32,
    /// Class for rounded corners, applied in every state.
    pub rounded_class: String,
    /// Background tint class, applied only while the placeholder shows.
    pub placeholder_class: String,
}

impl Default for SurfaceStyle {
    fn default() -> Self {
        Self {
            width: 320,
            rounded_class: "rounded-2xl".to_string(),
            placeholder_class: "bg-gray-300".to_string(),
        }
    }
}

/// What a loader asks the host to draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageSurface {
    pub src: String,
    pub width: u32,
    pub height: &'static str,
    pub class: String,
    pub placeholder: bool,
}

impl ImageSurface {
    /// Build the surface for a source, picking classes for the given state.
    pub fn new(src: &str, placeholder: bool, style: &SurfaceStyle) -> Self {
        let class = if placeholder && !style.placeholder_class.is_empty() {
            format!("{} {}", style.rounded_class, style.placeholder_class)
        } else {
            style.rounded_class.clone()
        };
        Self {
            src: src.to_string(),
            width: style.width,
            height: AUTO_HEIGHT,
            class,
            placeholder,
        }
    }

    pub fn state_label(&self) -> &'static str {
        if self.placeholder { "placeholder" } else { "loaded" }
    }

    /// Render as an `<img>` element. `id` is the host reference when known.
    pub fn to_markup(&self, id: Option<SurfaceId>) -> Markup {
        html! {
            img
                id=[id.map(|id| id.to_string())]
                width=(self.width)
                height=(self.height)
                src=(self.src)
                class=(self.class)
                data-state=(self.state_label());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_surface_has_tint_and_rounding() {
        let surface = ImageSurface::new(PLACEHOLDER_SRC, true, &SurfaceStyle::default());
        assert_eq!(surface.class, "rounded-2xl bg-gray-300");
        assert_eq!(surface.height, "auto");
        assert_eq!(surface.width, 320);
    }

    #[test]
    fn loaded_surface_drops_tint() {
        let surface = ImageSurface::new("https://example.test/1.jpg", false, &SurfaceStyle::default());
        assert_eq!(surface.class, "rounded-2xl");
        assert_eq!(surface.state_label(), "loaded");
    }

    #[test]
    fn empty_tint_class_leaves_no_trailing_space() {
        let style = SurfaceStyle {
            placeholder_class: String::new(),
            ..SurfaceStyle::default()
        };
        let surface = ImageSurface::new(PLACEHOLDER_SRC, true, &style);
        assert_eq!(surface.class, "rounded-2xl");
    }

    #[test]
    fn markup_contains_attributes() {
        let surface = ImageSurface::new("https://example.test/1.jpg", false, &SurfaceStyle::default());
        let html = surface.to_markup(Some(SurfaceId::new(7))).into_string();
        assert!(html.starts_with("<img"));
        assert!(html.contains(r#"id="surface-7""#));
        assert!(html.contains(r#"width="320""#));
        assert!(html.contains(r#"height="auto""#));
        assert!(html.contains(r#"src="https://example.test/1.jpg""#));
        assert!(html.contains(r#"data-state="loaded""#));
    }

    #[test]
    fn markup_omits_id_before_commit() {
        let surface = ImageSurface::new(PLACEHOLDER_SRC, true, &SurfaceStyle::default());
        let html = surface.to_markup(None).into_string();
        assert!(!html.contains("id="));
        assert!(html.contains("data:image/svg+xml;base64,"));
    }

    #[test]
    fn markup_escapes_source() {
        let surface = ImageSurface::new(r#"x" onerror="alert(1)"#, false, &SurfaceStyle::default());
        let html = surface.to_markup(None).into_string();
        assert!(!html.contains(r#"" onerror=""#));
        assert!(html.contains("&quot;"));
    }
}
