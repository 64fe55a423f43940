//! Event-to-content derivation shared by every channel.
//!
//! A sender never inspects an event directly. It asks [`derive_content`] for
//! the template key and the content map, so the sanity rules and the count
//! derivation are the same for chat, email and webhook.

use crate::core::Event;
use crate::error::NotifyError;
use crate::results::ResultsService;
use crate::templates::TemplateKey;
use serde::Serialize;
use tracing::debug;

pub const TARGET_LABEL: &str = "target";
pub const POPS_LABEL: &str = "points-of-presence (PoPs)";

/// Values every channel template can reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckContent {
    pub check_id: String,
    pub check_name: String,
    pub group_name: String,
    pub instance_count: usize,
    pub fail_count: usize,
    #[serde(rename = "type")]
    pub target_label: &'static str,
    /// Query prefix linking to the raw results dump, `?` when there is none.
    /// Templates append further query parameters directly after it.
    pub json_url: String,
    pub passing: bool,
}

/// The template key and content for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedContent {
    pub key: TemplateKey,
    pub content: CheckContent,
}

/// Content plus the per-send values a template needs.
#[derive(Debug, Serialize)]
pub struct RenderContext<'a> {
    #[serde(flatten)]
    pub content: &'a CheckContent,
    pub host: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<&'a str>,
}

impl DerivedContent {
    pub fn context<'a>(&'a self, host: &'a str, channel: Option<&'a str>) -> RenderContext<'a> {
        RenderContext {
            content: &self.content,
            host,
            channel,
        }
    }
}

/// Derives content from the event alone.
///
/// Fails when a failing result carries no failing responses, since there is
/// nothing to tell the customer about which instances broke.
pub fn event_content(event: &Event) -> Result<DerivedContent, NotifyError> {
    let result = &event.result;
    let key = TemplateKey::for_result(result.passing);
    let failing = result.failing_responses();

    if !result.passing && failing.is_empty() {
        return Err(NotifyError::InconsistentResult(format!(
            "check {} is failing but reported no failing responses",
            result.check_id
        )));
    }

    let json_url = match event.nocap.as_ref().map(|n| n.json_url.as_str()) {
        Some(raw) if !raw.is_empty() => {
            let encoded: String = url::form_urlencoded::byte_serialize(raw.as_bytes()).collect();
            format!("/event?json={}&", encoded)
        }
        _ => "?".to_string(),
    };

    Ok(DerivedContent {
        key,
        content: CheckContent {
            check_id: result.check_id.clone(),
            check_name: result.check_name.clone(),
            group_name: result.target.id.clone(),
            instance_count: result.responses.len(),
            fail_count: failing.len(),
            target_label: TARGET_LABEL,
            json_url,
            passing: result.passing,
        },
    })
}

/// Derives content, consulting the results service for external host checks.
///
/// For external hosts the event's own counts are approximate; the results
/// service is authoritative and the consistency rule is applied again to its
/// numbers.
pub async fn derive_content(
    event: &Event,
    results: &dyn ResultsService,
) -> Result<DerivedContent, NotifyError> {
    let mut derived = event_content(event)?;
    let result = &event.result;

    if result.target.is_external_host() {
        let authoritative = results
            .get_check_results(&result.check_id, &result.customer_id)
            .await?;
        let instance_count = authoritative.len();
        let fail_count: usize = authoritative.iter().map(|r| r.failing_count()).sum();
        debug!(
            check_id = %result.check_id,
            instance_count,
            fail_count,
            "Re-derived counts from results service"
        );

        if !result.passing && fail_count == 0 {
            return Err(NotifyError::InconsistentResult(format!(
                "check {} is failing but the results service reports no failures",
                result.check_id
            )));
        }

        derived.content.instance_count = instance_count;
        derived.content.fail_count = fail_count;
        derived.content.target_label = POPS_LABEL;
    }

    Ok(derived)
}
