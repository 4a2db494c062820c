//! Turns a finished clip into the text the user sees.

use serde_json::{json, Value};

use crate::client::Clip;

/// A playable clip pulled out of a terminal snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedClip {
    pub task_id: String,
    pub clip_id: String,
    pub audio_url: String,
    pub title: Option<String>,
    pub tags: Option<String>,
    pub image_url: Option<String>,
}

impl GeneratedClip {
    /// `None` unless the clip has a playable audio URL.
    pub fn from_clip(task_id: &str, clip: &Clip) -> Option<Self> {
        let audio_url = clip.playable_url()?.to_string();
        Some(Self {
            task_id: task_id.to_string(),
            clip_id: clip.id.clone(),
            audio_url,
            title: non_empty(clip.title.as_deref()),
            tags: non_empty(clip.tags()),
            image_url: non_empty(clip.image_url.as_deref()),
        })
    }

    pub fn to_text(&self) -> String {
        let mut text = format!(
            "Song generated! You can listen to it here: {}",
            self.audio_url
        );
        if let Some(title) = &self.title {
            text.push_str(&format!("\nTitle: {}", title));
        }
        if let Some(tags) = &self.tags {
            text.push_str(&format!("\nStyle: {}", tags));
        }
        if let Some(image) = &self.image_url {
            text.push_str(&format!("\nImage: {}", image));
        }
        text
    }

    pub fn to_structured(&self) -> Value {
        let mut value = json!({
            "taskId": self.task_id,
            "clipId": self.clip_id,
            "audioUrl": self.audio_url,
        });
        if let Some(title) = &self.title {
            value["title"] = json!(title);
        }
        if let Some(tags) = &self.tags {
            value["tags"] = json!(tags);
        }
        if let Some(image) = &self.image_url {
            value["imageUrl"] = json!(image);
        }
        value
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
