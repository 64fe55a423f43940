//! Channel templates.
//!
//! Every channel owns exactly two templates, one for failing and one for
//! passing results. The sets are parsed once when a sender is built and are
//! never mutated afterwards. All templates produce JSON, so interpolated
//! values are escaped as JSON string content instead of HTML.

use crate::error::NotifyError;
use handlebars::Handlebars;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// Selects which of a channel's two templates applies to a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKey {
    CheckFailing,
    CheckPassing,
}

impl TemplateKey {
    pub fn for_result(passing: bool) -> Self {
        if passing {
            Self::CheckPassing
        } else {
            Self::CheckFailing
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckFailing => "check-failing",
            Self::CheckPassing => "check-passing",
        }
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failing/passing template pair.
pub struct TemplateSet {
    registry: Handlebars<'static>,
}

impl fmt::Debug for TemplateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateSet")
            .field("templates", &self.registry.get_templates().keys())
            .finish()
    }
}

impl TemplateSet {
    /// Parses a template pair. Fails if either template is malformed.
    pub fn new(failing: &str, passing: &str) -> Result<Self, NotifyError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(escape_json);

        for (key, source) in [
            (TemplateKey::CheckFailing, failing),
            (TemplateKey::CheckPassing, passing),
        ] {
            registry
                .register_template_string(key.as_str(), source)
                .map_err(|e| NotifyError::Render(format!("parsing {} template: {}", key, e)))?;
        }
        Ok(Self { registry })
    }

    pub fn chat() -> Result<Self, NotifyError> {
        Self::new(CHAT_CHECK_FAILING, CHAT_CHECK_PASSING)
    }

    pub fn email() -> Result<Self, NotifyError> {
        Self::new(EMAIL_CHECK_FAILING, EMAIL_CHECK_PASSING)
    }

    pub fn webhook() -> Result<Self, NotifyError> {
        Self::new(WEBHOOK_CHECK_FAILING, WEBHOOK_CHECK_PASSING)
    }

    /// Renders the template for `key`. No I/O.
    pub fn render<T: Serialize>(&self, key: TemplateKey, data: &T) -> Result<String, NotifyError> {
        Ok(self.registry.render(key.as_str(), data)?)
    }

    /// Renders and parses the output. Output that is not valid JSON for `O`
    /// is an error; nothing partial is ever returned.
    pub fn render_json<T: Serialize, O: DeserializeOwned>(
        &self,
        key: TemplateKey,
        data: &T,
    ) -> Result<O, NotifyError> {
        let rendered = self.render(key, data)?;
        serde_json::from_str(&rendered).map_err(|e| {
            NotifyError::Render(format!("{} template produced invalid JSON: {}", key, e))
        })
    }
}

/// Escapes a value for use inside a JSON string literal.
fn escape_json(data: &str) -> String {
    let quoted = serde_json::Value::String(data.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

// =============================================================================
// Chat
// =============================================================================

const CHAT_CHECK_FAILING: &str = r#"{
  "channel": "{{channel}}",
  "text": "{{check_name}} is failing on {{fail_count}} of {{instance_count}} {{type}}",
  "blocks": [
    {
      "type": "section",
      "text": {
        "type": "mrkdwn",
        "text": ":red_circle: *{{check_name}}* is failing on *{{fail_count}}* of {{instance_count}} {{type}} in `{{group_name}}`."
      }
    },
    {
      "type": "actions",
      "elements": [
        {
          "type": "button",
          "text": { "type": "plain_text", "text": "View results" },
          "url": "{{host}}/check/{{check_id}}{{json_url}}utm_source=chat"
        }
      ]
    }
  ]
}"#;

const CHAT_CHECK_PASSING: &str = r#"{
  "channel": "{{channel}}",
  "text": "{{check_name}} is passing again",
  "blocks": [
    {
      "type": "section",
      "text": {
        "type": "mrkdwn",
        "text": ":large_green_circle: *{{check_name}}* is passing on all {{instance_count}} {{type}} in `{{group_name}}`."
      }
    },
    {
      "type": "actions",
      "elements": [
        {
          "type": "button",
          "text": { "type": "plain_text", "text": "View check" },
          "url": "{{host}}/check/{{check_id}}{{json_url}}utm_source=chat"
        }
      ]
    }
  ]
}"#;

// =============================================================================
// Email merge variables
// =============================================================================

const EMAIL_CHECK_FAILING: &str = r#"{
  "subject": "{{check_name}} is failing",
  "status": "failing",
  "check_id": "{{check_id}}",
  "check_name": "{{check_name}}",
  "group_name": "{{group_name}}",
  "instance_count": "{{instance_count}}",
  "fail_count": "{{fail_count}}",
  "type": "{{type}}",
  "check_url": "{{host}}/check/{{check_id}}{{json_url}}utm_source=email",
  "snooze_url": "{{host}}/check/{{check_id}}/snooze?utm_source=email",
  "json_url": "{{json_url}}"
}"#;

const EMAIL_CHECK_PASSING: &str = r#"{
  "subject": "{{check_name}} is passing",
  "status": "passing",
  "check_id": "{{check_id}}",
  "check_name": "{{check_name}}",
  "group_name": "{{group_name}}",
  "instance_count": "{{instance_count}}",
  "fail_count": "{{fail_count}}",
  "type": "{{type}}",
  "check_url": "{{host}}/check/{{check_id}}{{json_url}}utm_source=email",
  "snooze_url": "{{host}}/check/{{check_id}}/snooze?utm_source=email",
  "json_url": "{{json_url}}"
}"#;

// =============================================================================
// Webhook bodies
// =============================================================================

const WEBHOOK_CHECK_FAILING: &str = r#"{
  "check_id": "{{check_id}}",
  "check_name": "{{check_name}}",
  "group_name": "{{group_name}}",
  "passing": false,
  "instance_count": {{instance_count}},
  "fail_count": {{fail_count}},
  "target_type": "{{type}}",
  "check_url": "{{host}}/check/{{check_id}}{{json_url}}utm_source=webhook"
}"#;

const WEBHOOK_CHECK_PASSING: &str = r#"{
  "check_id": "{{check_id}}",
  "check_name": "{{check_name}}",
  "group_name": "{{group_name}}",
  "passing": true,
  "instance_count": {{instance_count}},
  "fail_count": {{fail_count}},
  "target_type": "{{type}}",
  "check_url": "{{host}}/check/{{check_id}}{{json_url}}utm_source=webhook"
}"#;
