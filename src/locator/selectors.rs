//! CSS selectors for the ad markup the ad server injects into publisher pages.

/// Images rendered by the native-ad script.
pub const NATIVE_IMAGE_SELECTOR: &str = "img[data-cliquesnative]";

/// Multi-pane widget wrapper, tried in this order. Some publishers use the
/// id form, most use the class form, newer tags only carry the data attribute.
pub const PANE_WRAPPER_SELECTOR: &str =
    "div#cliques-widget, div.cliques-widget, div[data-cliques-multi-pane-native]";

/// Pop-up some publishers show on load, covering native ads.
pub const OVERLAY_CLOSE_SELECTOR: &str = "div.closePopup";

/// Impression-tag iframe for a placement / creative group pair.
pub fn iframe_selector(placement_id: &str, creative_group_id: &str) -> String {
    format!(
        "iframe[src*=\"crgid={}\"][src*=\"pid={}\"]",
        escape(creative_group_id),
        escape(placement_id)
    )
}

/// Click-through link identifying the pane widget of a placement.
pub fn pane_link_selector(placement_id: &str, creative_group_id: &str) -> String {
    format!(
        "a[href*=\"pid={}\"][href*=\"crgid={}\"]",
        escape(placement_id),
        escape(creative_group_id)
    )
}

/// Split a selector list into its alternatives, keeping their priority order.
///
/// Only top-level commas separate alternatives; commas inside attribute
/// brackets, pseudo-class arguments or quoted values stay part of the selector.
pub(crate) fn alternatives(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&list[start..]);
    parts
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Selector for `inner` elements nested under the element matched by `scope`.
pub fn within(scope: &str, inner: &str) -> String {
    format!("{scope} {inner}")
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
