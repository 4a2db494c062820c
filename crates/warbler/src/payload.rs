//! Upstream submit body.

use serde::Serialize;

use crate::request::{GenerationMode, GenerationRequest, ModelVersion};

/// JSON body for the submit endpoint. Absent fields are omitted: upstream
/// reads the presence of `gpt_description_prompt` versus `prompt` as the
/// mode switch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub mv: ModelVersion,
    pub make_instrumental: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpt_description_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continue_at: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continue_clip_id: Option<String>,
}

impl SubmitPayload {
    pub fn build(request: &GenerationRequest) -> Self {
        let (prompt, tags, title, gpt_description_prompt) = match &request.mode {
            GenerationMode::Custom { prompt, tags, title } => (
                Some(prompt.clone()),
                Some(tags.clone()),
                Some(title.clone()),
                None,
            ),
            GenerationMode::Inspiration {
                description,
                prompt,
                tags,
                title,
            } => (
                prompt.clone(),
                tags.clone(),
                title.clone(),
                Some(description.clone()),
            ),
        };

        let continuation = request.continuation.as_ref();

        Self {
            prompt,
            tags,
            title,
            mv: request.model_version.unwrap_or_default(),
            make_instrumental: request.instrumental_only.unwrap_or(false),
            gpt_description_prompt,
            task_id: continuation.map(|c| c.task_id.clone()),
            continue_at: continuation.map(|c| c.at_seconds),
            continue_clip_id: continuation.map(|c| c.clip_id.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::validate;
    use serde_json::json;

    fn build(raw: serde_json::Value) -> serde_json::Value {
        let request = validate(&raw).unwrap();
        serde_json::to_value(SubmitPayload::build(&request)).unwrap()
    }

    #[test]
    fn test_custom_payload_applies_defaults() {
        let body = build(json!({"prompt": "lyrics", "tags": "jazz", "title": "Blue"}));
        assert_eq!(
            body,
            json!({
                "prompt": "lyrics",
                "tags": "jazz",
                "title": "Blue",
                "mv": "chirp-v4",
                "make_instrumental": false,
            })
        );
    }

    #[test]
    fn test_inspiration_payload_omits_unsupplied_fields() {
        let body = build(json!({
            "description": "a calm piano piece",
            "prompt": "",
            "mv": "chirp-v3-5",
            "make_instrumental": true,
        }));
        assert_eq!(
            body,
            json!({
                "gpt_description_prompt": "a calm piano piece",
                "mv": "chirp-v3-5",
                "make_instrumental": true,
            })
        );
        for key in ["prompt", "tags", "title"] {
            assert!(body.get(key).is_none(), "{key} should be omitted");
        }
    }

    #[test]
    fn test_inspiration_payload_keeps_supplied_fields() {
        let body = build(json!({"gpt_description_prompt": "surf rock", "title": "Wave"}));
        assert_eq!(body["title"], "Wave");
        assert!(body.get("tags").is_none());
    }

    #[test]
    fn test_continuation_fields_copied_verbatim() {
        let body = build(json!({
            "prompt": "verse two",
            "tags": "folk",
            "title": "Road",
            "continueFromTaskId": "task-9",
            "continueAtSeconds": 42.5,
            "continueFromClipId": "clip-3",
        }));
        assert_eq!(body["task_id"], "task-9");
        assert_eq!(body["continue_at"], 42.5);
        assert_eq!(body["continue_clip_id"], "clip-3");
    }
}
