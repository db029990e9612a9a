//! Display text cleanup for rendered labels and descriptions.

use std::sync::OnceLock;

use regex::Regex;

fn html_macro() -> &'static Regex {
    static HTML_MACRO: OnceLock<Regex> = OnceLock::new();
    HTML_MACRO.get_or_init(|| Regex::new(r"\{\{/?html.*?\}\}").unwrap())
}

/// Strip wiki `{{html}}` macro markers; labels also lose `<div>`/`<p>` wrappers.
pub fn clean_display_text(raw: &str, strip_paragraph_tags: bool) -> String {
    let mut clean = raw.to_string();
    if strip_paragraph_tags {
        for tag in ["<div>", "</div>", "<p>", "</p>"] {
            clean = clean.replace(tag, "");
        }
    }
    html_macro().replace_all(&clean, "").into_owned()
}

/// Cleaned label, or `"<id> <marker>"` when nothing displayable is left.
pub fn label_or_fallback(id: &str, raw: Option<&str>, empty_marker: &str) -> String {
    match raw.map(|r| clean_display_text(r, true)) {
        Some(label) if !label.is_empty() => label,
        _ => format!("{} {}", id, empty_marker),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_html_macros() {
        let raw = "{{html clean=\"false\"}}Share <b>data</b>{{/html}}";
        assert_eq!(clean_display_text(raw, false), "Share <b>data</b>");
    }

    #[test]
    fn test_strips_paragraph_tags_for_labels_only() {
        let raw = "<p>Genetic data</p>";
        assert_eq!(clean_display_text(raw, true), "Genetic data");
        assert_eq!(clean_display_text(raw, false), "<p>Genetic data</p>");
    }

    #[test]
    fn test_label_fallback() {
        assert_eq!(label_or_fallback("c1", None, "(no label)"), "c1 (no label)");
        assert_eq!(
            label_or_fallback("c1", Some("<div></div>"), "(no label)"),
            "c1 (no label)"
        );
        assert_eq!(label_or_fallback("c1", Some("Label"), "(no label)"), "Label");
    }
}
