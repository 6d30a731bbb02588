//! Template composition: placeholder extraction, substitution, concatenation
//!
//! Placeholders use the `{{name}}` syntax. Whitespace inside the braces is
//! ignored, empty and unterminated placeholders are plain text. A placeholder
//! without a value is left verbatim so an incomplete description stays
//! visibly incomplete instead of silently losing text.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Separator placed between template bodies
pub const DEFAULT_SEPARATOR: &str = "\n\n";

/// Variable holding the platform id of the video being composed
pub const VIDEO_ID_VARIABLE: &str = "video-id";
/// Variable holding the public watch link of the video being composed
pub const VIDEO_URL_VARIABLE: &str = "video-url";

/// Names injected at compose time and never stored per video
pub const SYSTEM_VARIABLES: &[&str] = &[VIDEO_ID_VARIABLE, VIDEO_URL_VARIABLE];

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{([^{}]*)\}\}").unwrap());

/// Values the system provides for every video
#[derive(Debug, Clone, Default)]
pub struct SystemDefaults {
    values: HashMap<String, String>,
}

impl SystemDefaults {
    pub fn for_video(external_video_id: &str) -> Self {
        let mut values = HashMap::new();
        values.insert(VIDEO_ID_VARIABLE.to_string(), external_video_id.to_string());
        values.insert(
            VIDEO_URL_VARIABLE.to_string(),
            format!("https://youtu.be/{}", external_video_id),
        );
        Self { values }
    }

    pub fn is_system_variable(name: &str) -> bool {
        SYSTEM_VARIABLES.contains(&name)
    }

    /// Inject defaults for names the caller has not set. A value already
    /// present under the same name is kept.
    fn merge_into(&self, values: &HashMap<String, String>) -> HashMap<String, String> {
        let mut merged = values.clone();
        for (name, value) in &self.values {
            merged.entry(name.clone()).or_insert_with(|| value.clone());
        }
        merged
    }
}

/// Unique placeholder names in first-seen order
pub fn extract_variables(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for caps in PLACEHOLDER.captures_iter(text) {
        let name = caps[1].trim();
        if !name.is_empty() && seen.insert(name.to_string()) {
            names.push(name.to_string());
        }
    }
    names
}

/// Replace each placeholder that has a value; unresolved ones stay verbatim
pub fn substitute(text: &str, values: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| {
            let name = caps[1].trim();
            match values.get(name) {
                Some(value) if !name.is_empty() => value.clone(),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Concatenate template bodies in order, substituting one shared value map
pub fn compose<S: AsRef<str>>(
    templates: &[S],
    values: &HashMap<String, String>,
    separator: &str,
    defaults: &SystemDefaults,
) -> String {
    let merged = defaults.merge_into(values);
    templates
        .iter()
        .map(|body| substitute(body.as_ref(), &merged))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Like [`compose`], but every template body is substituted with its own value map
pub fn compose_scoped(
    parts: &[(&str, &HashMap<String, String>)],
    separator: &str,
    defaults: &SystemDefaults,
) -> String {
    parts
        .iter()
        .map(|(body, values)| substitute(body, &defaults.merge_into(values)))
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_extract_unique_first_seen() {
        assert_eq!(extract_variables("{{a}} {{b}} {{a}}"), vec!["a", "b"]);
        assert_eq!(extract_variables("{{ b }} then {{a}}"), vec!["b", "a"]);
    }

    #[test]
    fn test_extract_ignores_empty_and_unterminated() {
        assert!(extract_variables("{{}} {{   }} {{open").is_empty());
        assert_eq!(extract_variables("{{open {{closed}}"), vec!["closed"]);
        assert!(extract_variables("no placeholders here").is_empty());
    }

    #[test]
    fn test_substitute() {
        assert_eq!(substitute("x {{n}} y", &values(&[("n", "5")])), "x 5 y");
        assert_eq!(substitute("x {{ n }} y", &values(&[("n", "5")])), "x 5 y");
    }

    #[test]
    fn test_substitute_leaves_unresolved_verbatim() {
        assert_eq!(substitute("x {{n}} y", &HashMap::new()), "x {{n}} y");
        assert_eq!(substitute("{{ m }}", &values(&[("n", "1")])), "{{ m }}");
    }

    #[test]
    fn test_substitute_does_not_rescan_values() {
        let vals = values(&[("a", "{{b}}"), ("b", "nope")]);
        assert_eq!(substitute("{{a}}", &vals), "{{b}}");
    }

    #[test]
    fn test_compose_in_order() {
        let out = compose(
            &["A {{n}}", "B {{n}}"],
            &values(&[("n", "1")]),
            "\n\n",
            &SystemDefaults::default(),
        );
        assert_eq!(out, "A 1\n\nB 1");
    }

    #[test]
    fn test_compose_injects_system_defaults() {
        let out = compose(
            &["Watch {{video-id}} at {{video-url}}"],
            &HashMap::new(),
            DEFAULT_SEPARATOR,
            &SystemDefaults::for_video("abc123"),
        );
        assert_eq!(out, "Watch abc123 at https://youtu.be/abc123");
    }

    #[test]
    fn test_compose_user_value_wins_when_present() {
        let out = compose(
            &["{{video-id}}"],
            &values(&[("video-id", "custom")]),
            DEFAULT_SEPARATOR,
            &SystemDefaults::for_video("abc123"),
        );
        assert_eq!(out, "custom");
    }

    #[test]
    fn test_compose_scoped_uses_each_templates_values() {
        let first = values(&[("x", "one")]);
        let second = values(&[("x", "two")]);
        let out = compose_scoped(
            &[("{{x}}", &first), ("{{x}} {{video-id}}", &second)],
            " | ",
            &SystemDefaults::for_video("v1"),
        );
        assert_eq!(out, "one | two v1");
    }

    #[test]
    fn test_system_variable_names() {
        assert!(SystemDefaults::is_system_variable("video-id"));
        assert!(!SystemDefaults::is_system_variable("sponsor"));
    }
}
