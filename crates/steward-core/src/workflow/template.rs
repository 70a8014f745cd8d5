//! `{{ path }}` template rendering and the named template library.
//!
//! Placeholders are dotted paths into a JSON variable mapping
//! (`{{ recipient.display_name }}`, `{{ payload.amount }}`). A placeholder
//! that does not resolve renders as an empty string; this is long-standing
//! behaviour that message authors rely on.

use std::collections::HashMap;

use serde_json::Value;
use steward_types::config::TemplateConfig;

use crate::collaborator::{CollaboratorError, RenderedMessage, TemplateRef, TemplateRenderer};

/// Render every `{{ path }}` placeholder in `template` against `variables`.
///
/// An unterminated `{{` is left in place verbatim.
pub fn render_text(template: &str, variables: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                let path = after_open[..end].trim();
                if let Some(value) = lookup_path(variables, path) {
                    out.push_str(&value_to_text(value));
                }
                rest = &after_open[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Walk a dotted path through nested objects (and numeric array indices).
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// TemplateLibrary
// ---------------------------------------------------------------------------

/// `TemplateRenderer` backed by the `[templates.<id>]` config tables.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    templates: HashMap<String, TemplateConfig>,
}

impl TemplateLibrary {
    pub fn new(templates: HashMap<String, TemplateConfig>) -> Self {
        Self { templates }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl TemplateRenderer for TemplateLibrary {
    fn render(
        &self,
        template: &TemplateRef,
        variables: &Value,
    ) -> Result<RenderedMessage, CollaboratorError> {
        let (subject, body) = match template {
            TemplateRef::Library(id) => {
                let config = self.templates.get(id).ok_or_else(|| {
                    CollaboratorError::Rejected(format!("unknown template '{id}'"))
                })?;
                (config.subject.as_deref(), config.body.as_str())
            }
            TemplateRef::Inline { subject, body } => (subject.as_deref(), body.as_str()),
        };

        Ok(RenderedMessage {
            subject: subject.map(|s| render_text(s, variables)),
            body: render_text(body, variables),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> Value {
        json!({
            "recipient": {"display_name": "Ruth", "email": "ruth@example.org"},
            "payload": {"amount": 50, "fund": "Missions"},
            "tags": ["a", "b"]
        })
    }

    #[test]
    fn renders_dotted_paths() {
        let text = render_text(
            "Thank you {{ recipient.display_name }} for ${{payload.amount}} to {{ payload.fund }}",
            &vars(),
        );
        assert_eq!(text, "Thank you Ruth for $50 to Missions");
    }

    #[test]
    fn unresolved_placeholders_render_empty() {
        assert_eq!(render_text("Hi {{ recipient.nickname }}!", &vars()), "Hi !");
        assert_eq!(render_text("{{ }}x", &vars()), "x");
    }

    #[test]
    fn array_indices_and_unterminated_markers() {
        assert_eq!(render_text("{{ tags.1 }}", &vars()), "b");
        assert_eq!(render_text("open {{ recipient", &vars()), "open {{ recipient");
    }

    #[test]
    fn library_renders_named_template() {
        let mut templates = HashMap::new();
        templates.insert(
            "welcome".to_string(),
            TemplateConfig {
                subject: Some("Welcome {{ recipient.display_name }}".to_string()),
                body: "We are glad you are here.".to_string(),
            },
        );
        let library = TemplateLibrary::new(templates);

        let rendered = library
            .render(&TemplateRef::Library("welcome".to_string()), &vars())
            .unwrap();
        assert_eq!(rendered.subject.as_deref(), Some("Welcome Ruth"));
        assert_eq!(rendered.body, "We are glad you are here.");
    }

    #[test]
    fn library_rejects_unknown_template() {
        let library = TemplateLibrary::default();
        let err = library
            .render(&TemplateRef::Library("missing".to_string()), &vars())
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Rejected(_)));
    }

    #[test]
    fn inline_templates_render_without_library_entry() {
        let library = TemplateLibrary::default();
        let rendered = library
            .render(
                &TemplateRef::Inline {
                    subject: None,
                    body: "Gift: {{ payload.amount }}".to_string(),
                },
                &vars(),
            )
            .unwrap();
        assert!(rendered.subject.is_none());
        assert_eq!(rendered.body, "Gift: 50");
    }
}
