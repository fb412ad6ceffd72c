//! CLI output formatting.
//!
//! Every item is shown with its 1-based position and key first. The URL and the
//! surface are indented context lines under it:
//!
//! ```text
//! 001 #1 loaded
//!     Source: https://randomfox.ca/images/42.jpg
//!     Surface: surface-1
//! 002 #2 placeholder
//!     Source: https://randomfox.ca/images/7.jpg
//!     Surface: surface-2 (observing)
//!
//! 2 foxes: 1 loaded, 1 waiting, 1 observing
//! ```
//!
//! `format_*` functions are pure and return lines. The `print_*` wrappers
//! write them to stdout.

use crate::gallery::ItemStatus;
use crate::loader::{LoaderDiagnostics, LoaderPhase};
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

/// Context line for non-zero diagnostics, if any.
fn diagnostics_line(d: &LoaderDiagnostics) -> Option<String> {
    let parts: Vec<String> = [
        (d.missing_surface, "missing surface"),
        (d.primitive_unavailable, "no observer"),
        (d.stale_callbacks, "stale callback"),
        (d.upstream_failures, "upstream failure"),
    ]
    .iter()
    .filter(|(n, _)| *n > 0)
    .map(|(n, label)| format!("{label} ×{n}"))
    .collect();
    if parts.is_empty() {
        None
    } else {
        Some(format!("{}Handled: {}", indent(1), parts.join(", ")))
    }
}

/// One header line per item plus its context lines, then a summary.
pub fn format_status(items: &[ItemStatus]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, item) in items.iter().enumerate() {
        lines.push(format!("{} {} {}", format_index(i + 1), item.key, item.phase));
        lines.push(format!("{}Source: {}", indent(1), item.url));
        if item.subscribed {
            lines.push(format!("{}Surface: {} (observing)", indent(1), item.surface));
        } else {
            lines.push(format!("{}Surface: {}", indent(1), item.surface));
        }
        if let Some(line) = diagnostics_line(&item.diagnostics) {
            lines.push(line);
        }
    }
    if !items.is_empty() {
        lines.push(String::new());
    }
    lines.push(format_summary(items));
    lines
}

pub fn format_summary(items: &[ItemStatus]) -> String {
    let loaded = items
        .iter()
        .filter(|s| s.phase == LoaderPhase::Loaded)
        .count();
    let observing = items.iter().filter(|s| s.subscribed).count();
    format!(
        "{}: {} loaded, {} waiting, {} observing",
        plural(items.len(), "fox", "foxes"),
        loaded,
        items.len() - loaded,
        observing
    )
}

pub fn format_render_output(path: &Path, count: usize) -> Vec<String> {
    vec![format!(
        "Wrote {} with {}",
        path.display(),
        plural(count, "fox", "foxes")
    )]
}

pub fn print_status(items: &[ItemStatus]) {
    for line in format_status(items) {
        println!("{}", line);
    }
}

pub fn print_render_output(path: &Path, count: usize) {
    for line in format_render_output(path, count) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::ItemKey;
    use crate::surface::{PLACEHOLDER_SRC, SurfaceId};

    fn status(key: u64, phase: LoaderPhase, subscribed: bool) -> ItemStatus {
        let url = format!("https://randomfox.ca/images/{key}.jpg");
        ItemStatus {
            key: ItemKey::new(key),
            src: match phase {
                LoaderPhase::Loaded => url.clone(),
                LoaderPhase::Placeholder => PLACEHOLDER_SRC.to_string(),
            },
            url,
            surface: SurfaceId::new(key),
            phase,
            subscribed,
            diagnostics: LoaderDiagnostics::default(),
        }
    }

    #[test]
    fn status_lines_lead_with_index_and_key() {
        let lines = format_status(&[
            status(1, LoaderPhase::Loaded, false),
            status(2, LoaderPhase::Placeholder, true),
        ]);
        assert_eq!(lines[0], "001 #1 loaded");
        assert_eq!(lines[1], "    Source: https://randomfox.ca/images/1.jpg");
        assert_eq!(lines[2], "    Surface: surface-1");
        assert_eq!(lines[3], "002 #2 placeholder");
        assert_eq!(lines[5], "    Surface: surface-2 (observing)");
        assert_eq!(
            lines.last().unwrap(),
            "2 foxes: 1 loaded, 1 waiting, 1 observing"
        );
    }

    #[test]
    fn empty_gallery_prints_only_summary() {
        assert_eq!(
            format_status(&[]),
            vec!["0 foxes: 0 loaded, 0 waiting, 0 observing".to_string()]
        );
    }

    #[test]
    fn diagnostics_shown_only_when_nonzero() {
        let mut item = status(1, LoaderPhase::Placeholder, false);
        item.diagnostics.stale_callbacks = 2;
        let lines = format_status(&[item]);
        assert!(lines.contains(&"    Handled: stale callback ×2".to_string()));

        let clean = format_status(&[status(1, LoaderPhase::Placeholder, false)]);
        assert!(!clean.iter().any(|l| l.contains("Handled")));
    }

    #[test]
    fn render_output_uses_singular() {
        let lines = format_render_output(Path::new("page.html"), 1);
        assert_eq!(lines, vec!["Wrote page.html with 1 fox".to_string()]);
    }
}
