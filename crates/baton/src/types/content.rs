//! Content Types
//!
//! Content blocks carried by tool results. Only the block kinds a
//! URL-returning tool needs are modeled: plain text and resource links.

use serde::{Deserialize, Serialize};

/// Content block in a tool result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Text content.
    Text {
        text: String,
    },

    /// Link to a remote resource the client may fetch or render.
    #[serde(rename = "resource_link")]
    ResourceLink {
        uri: String,
        name: String,
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
}

impl Content {
    /// Create text content.
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text {
            text: text.into(),
        }
    }

    /// Create a resource link with a mime type.
    pub fn resource_link(
        uri: impl Into<String>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Content::ResourceLink {
            uri: uri.into(),
            name: name.into(),
            mime_type: Some(mime_type.into()),
            title: None,
        }
    }

    /// Attach a human-readable title. No-op on text blocks.
    pub fn with_title(mut self, new_title: impl Into<String>) -> Self {
        if let Content::ResourceLink { ref mut title, .. } = self {
            *title = Some(new_title.into());
        }
        self
    }

    /// Get the text if this is text content.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}
