//! MCP handler exposing `generate_music`.

use async_trait::async_trait;
use baton::{
    schema_for, CallToolResult, Content, ErrorData, Handler, Implementation, Tool,
    ToolAnnotations, ToolContext,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::format::GeneratedClip;
use crate::generator::MusicGenerator;
use crate::request::ModelVersion;

pub const TOOL_NAME: &str = "generate_music";

const TOOL_DESCRIPTION: &str = "Generate a song with Suno and return a link to the audio.\n\n\
Custom mode: give prompt (lyrics), tags (comma-separated styles) and title.\n\
Inspiration mode: give gpt_description_prompt describing the song; lyrics and style are written for you.\n\
To extend an earlier clip, give task_id, continue_at (seconds) and continue_clip_id together.\n\n\
Generation takes one to five minutes. The result contains an audio URL you can show the user \
with an HTML <audio controls src=\"...\"></audio> element.";

const INSTRUCTIONS: &str = "Use generate_music to create songs. Either supply lyrics, style tags and a title, \
or a free-form description. Calls block until the song is playable, usually one to five minutes. \
The returned audio URL can be embedded in an <audio controls> element.";

/// Input schema for `generate_music`. Arguments are validated by hand so
/// the descriptive aliases (`description`, `modelVersion`, ...) also work.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GenerateMusicParams {
    #[schemars(description = "Lyrics. Required in custom mode, e.g. \"[Verse 1]\\nUnder the starry sky...\"")]
    pub prompt: Option<String>,

    #[schemars(description = "Comma-separated style tags. Required in custom mode, e.g. \"acoustic, folk\"")]
    pub tags: Option<String>,

    #[schemars(description = "Song title. Required in custom mode")]
    pub title: Option<String>,

    #[schemars(description = "Free-form description of the song. Switches to inspiration mode")]
    pub gpt_description_prompt: Option<String>,

    #[schemars(description = "Model version (default chirp-v4)")]
    pub mv: Option<ModelVersion>,

    #[schemars(description = "Generate without vocals (default false)")]
    pub make_instrumental: Option<bool>,

    #[schemars(description = "Task id of the clip to continue. Requires continue_at and continue_clip_id")]
    pub task_id: Option<String>,

    #[schemars(description = "Seconds into the clip to continue from")]
    pub continue_at: Option<f64>,

    #[schemars(description = "Clip id to continue")]
    pub continue_clip_id: Option<String>,
}

pub struct WarblerHandler {
    generator: MusicGenerator,
}

impl WarblerHandler {
    pub fn new(generator: MusicGenerator) -> Self {
        Self { generator }
    }
}

/// Text, an audio link and structured fields for one clip.
pub fn success_result(clip: &GeneratedClip) -> CallToolResult {
    let mut link = Content::resource_link(
        clip.audio_url.clone(),
        format!("{}.mp3", clip.clip_id),
        "audio/mpeg",
    );
    if let Some(title) = &clip.title {
        link = link.with_title(title.clone());
    }

    CallToolResult::success(vec![Content::text(clip.to_text()), link])
        .with_structured(clip.to_structured())
}

#[async_trait]
impl Handler for WarblerHandler {
    fn tools(&self) -> Vec<Tool> {
        vec![Tool::new(TOOL_NAME, TOOL_DESCRIPTION)
            .with_title("Generate music")
            .with_input_schema(schema_for::<GenerateMusicParams>())
            .with_annotations(ToolAnnotations {
                read_only_hint: Some(false),
                destructive_hint: Some(false),
                idempotent_hint: Some(false),
                open_world_hint: Some(true),
            })]
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, ErrorData> {
        self.call_tool_with_context(name, arguments, ToolContext::default())
            .await
    }

    async fn call_tool_with_context(
        &self,
        name: &str,
        arguments: Value,
        context: ToolContext,
    ) -> Result<CallToolResult, ErrorData> {
        if name != TOOL_NAME {
            return Err(ErrorData::tool_not_found(name));
        }

        match self.generator.generate(&arguments, &context).await {
            Ok(clip) => Ok(success_result(&clip)),
            Err(e) => e.into_tool_result(),
        }
    }

    fn server_info(&self) -> Implementation {
        Implementation::new("warbler", env!("CARGO_PKG_VERSION")).with_title("Warbler")
    }

    fn instructions(&self) -> Option<String> {
        Some(INSTRUCTIONS.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::tests::{snapshot, CountingSleeper, ScriptedApi};
    use crate::poller::PollLimits;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn handler(api: ScriptedApi) -> WarblerHandler {
        let limits = PollLimits {
            interval: Duration::from_millis(1),
            max_attempts: 5,
            max_transport_errors: 3,
        };
        let generator = MusicGenerator::new(Arc::new(api), limits)
            .with_sleeper(Arc::new(CountingSleeper::default()));
        WarblerHandler::new(generator)
    }

    #[test]
    fn test_tool_schema_lists_canonical_keys() {
        let tools = handler(ScriptedApi::new(vec![])).tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, TOOL_NAME);

        let properties = tools[0].input_schema.properties.as_ref().unwrap();
        for key in ["prompt", "tags", "title", "gpt_description_prompt", "mv", "make_instrumental", "task_id", "continue_at", "continue_clip_id"] {
            assert!(properties.contains_key(key), "missing {key}");
        }
        assert!(tools[0].description.as_deref().unwrap().contains("<audio controls"));
    }

    #[tokio::test]
    async fn test_success_result_shape() {
        let h = handler(ScriptedApi::new(vec![snapshot("COMPLETE", Some("https://x/a.mp3"))]));
        let result = h
            .call_tool(TOOL_NAME, json!({"prompt": "p", "tags": "t", "title": "Song"}))
            .await
            .unwrap();

        assert!(!result.is_error);
        assert!(result.content[0].as_text().unwrap().contains("Title: Song"));
        assert!(matches!(
            &result.content[1],
            Content::ResourceLink { uri, mime_type: Some(mime), .. }
                if uri == "https://x/a.mp3" && mime == "audio/mpeg"
        ));
        assert_eq!(
            result.structured_content,
            Some(json!({
                "taskId": "task-123",
                "clipId": "clip-1",
                "audioUrl": "https://x/a.mp3",
                "title": "Song",
            }))
        );
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let err = handler(ScriptedApi::new(vec![]))
            .call_tool("make_coffee", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorData::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_invalid_params() {
        let err = handler(ScriptedApi::new(vec![]))
            .call_tool(TOOL_NAME, json!({"prompt": "only lyrics"}))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorData::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_timeout_is_flagged_content() {
        let result = handler(ScriptedApi::new(vec![snapshot("PENDING", None)]))
            .call_tool(TOOL_NAME, json!({"description": "ambient drone"}))
            .await
            .unwrap();
        assert!(result.is_error);
        assert_eq!(
            result.content[0].as_text(),
            Some("Music generation timed out after 5 polling attempts")
        );
        assert_eq!(result.structured_content, Some(json!({"kind": "timeout"})));
    }
}
