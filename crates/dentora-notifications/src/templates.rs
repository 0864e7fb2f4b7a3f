//! Template rendering using `{{variable}}` placeholders.

use std::collections::HashMap;

use crate::channels::RenderedContent;
use crate::error::NotificationError;

#[derive(Debug, Clone)]
pub struct Template {
    pub id: String,
    pub subject: Option<String>,
    pub body: String,
    pub html_body: Option<String>,
}

pub struct TemplateRenderer {
    templates: HashMap<String, Template>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Renderer pre-loaded with the clinic's built-in templates.
    pub fn with_defaults() -> Self {
        let mut renderer = Self::new();
        renderer.register(Template {
            id: "appointment_reminder".to_string(),
            subject: Some("Appointment reminder for {{date}}".to_string()),
            body: "Hello {{patient_name}},\n\nThis is a reminder of your appointment \
                   on {{date}} at {{start_time}} with {{doctor_name}}.\n\n{{clinic_name}}"
                .to_string(),
            html_body: None,
        });
        renderer.register(Template {
            id: "budget_activated".to_string(),
            subject: Some("Your treatment plan \"{{budget_title}}\" is active".to_string()),
            body: "Hello {{patient_name}},\n\nYour treatment plan \"{{budget_title}}\" \
                   ({{total}}) has been activated. We will contact you to schedule the \
                   sessions.\n\n{{clinic_name}}"
                .to_string(),
            html_body: None,
        });
        renderer.register(Template {
            id: "budget_completed".to_string(),
            subject: Some("Your treatment plan \"{{budget_title}}\" is complete".to_string()),
            body: "Hello {{patient_name}},\n\nAll sessions of your treatment plan \
                   \"{{budget_title}}\" have been completed.\n\n{{clinic_name}}"
                .to_string(),
            html_body: None,
        });
        renderer.register(Template {
            id: "message".to_string(),
            subject: Some("{{subject}}".to_string()),
            body: "{{body}}".to_string(),
            html_body: None,
        });
        renderer
    }

    pub fn register(&mut self, template: Template) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn get(&self, template_id: &str) -> Option<&Template> {
        self.templates.get(template_id)
    }

    pub fn render(
        &self,
        template_id: &str,
        data: &HashMap<String, serde_json::Value>,
    ) -> Result<RenderedContent, NotificationError> {
        let template = self
            .templates
            .get(template_id)
            .ok_or_else(|| NotificationError::TemplateNotFound(template_id.to_string()))?;

        let subject = template.subject.as_ref().map(|s| render_string(s, data));
        let body = render_string(&template.body, data);
        let html_body = template.html_body.as_ref().map(|s| render_string(s, data));

        Ok(RenderedContent {
            subject,
            body,
            html_body,
        })
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn render_string(template: &str, data: &HashMap<String, serde_json::Value>) -> String {
    let mut result = template.to_string();
    for (key, value) in data {
        let placeholder = format!("{{{{{key}}}}}");
        let replacement = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Null => String::new(),
            _ => value.to_string(),
        };
        result = result.replace(&placeholder, &replacement);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_render_reminder() {
        let renderer = TemplateRenderer::with_defaults();
        let content = renderer
            .render(
                "appointment_reminder",
                &data(&[
                    ("patient_name", json!("Ana García")),
                    ("date", json!("2026-03-16")),
                    ("start_time", json!("09:30")),
                    ("doctor_name", json!("Dr. Laura Pérez")),
                    ("clinic_name", json!("Dentora")),
                ]),
            )
            .unwrap();
        assert_eq!(
            content.subject.as_deref(),
            Some("Appointment reminder for 2026-03-16")
        );
        assert!(content.body.contains("09:30"));
        assert!(content.body.contains("Dr. Laura Pérez"));
    }

    #[test]
    fn test_unknown_template() {
        let renderer = TemplateRenderer::with_defaults();
        assert!(matches!(
            renderer.render("nonexistent", &HashMap::new()),
            Err(NotificationError::TemplateNotFound(_))
        ));
    }

    #[test]
    fn test_unreplaced_placeholder_left_verbatim() {
        let renderer = TemplateRenderer::with_defaults();
        let content = renderer.render("message", &HashMap::new()).unwrap();
        assert_eq!(content.body, "{{body}}");
    }

    #[test]
    fn test_non_string_values() {
        let mut renderer = TemplateRenderer::new();
        renderer.register(Template {
            id: "t".to_string(),
            subject: None,
            body: "count={{count}} flag={{flag}} gone={{gone}}".to_string(),
            html_body: None,
        });
        let content = renderer
            .render(
                "t",
                &data(&[
                    ("count", json!(3)),
                    ("flag", json!(true)),
                    ("gone", json!(null)),
                ]),
            )
            .unwrap();
        assert_eq!(content.body, "count=3 flag=true gone=");
    }
}
