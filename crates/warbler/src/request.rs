//! Tool argument validation.
//!
//! `validate` is the only way to obtain a [`GenerationRequest`]; everything
//! downstream works on the validated value and never looks at raw JSON again.
//!
//! Argument keys follow the upstream API (`gpt_description_prompt`, `mv`,
//! `make_instrumental`, `task_id`, `continue_at`, `continue_clip_id`). The
//! descriptive names (`description`, `modelVersion`, ...) are accepted too.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

const PROMPT: &[&str] = &["prompt"];
const TAGS: &[&str] = &["tags"];
const TITLE: &[&str] = &["title"];
const DESCRIPTION: &[&str] = &["gpt_description_prompt", "description"];
const MODEL_VERSION: &[&str] = &["mv", "modelVersion"];
const INSTRUMENTAL: &[&str] = &["make_instrumental", "instrumentalOnly"];
const CONTINUE_TASK: &[&str] = &["task_id", "continueFromTaskId"];
const CONTINUE_AT: &[&str] = &["continue_at", "continueAtSeconds"];
const CONTINUE_CLIP: &[&str] = &["continue_clip_id", "continueFromClipId"];

/// Upstream model identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub enum ModelVersion {
    #[serde(rename = "chirp-v3-0")]
    ChirpV3_0,
    #[serde(rename = "chirp-v3-5")]
    ChirpV3_5,
    #[default]
    #[serde(rename = "chirp-v4")]
    ChirpV4,
}

impl ModelVersion {
    pub const ALL: [ModelVersion; 3] = [
        ModelVersion::ChirpV3_0,
        ModelVersion::ChirpV3_5,
        ModelVersion::ChirpV4,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVersion::ChirpV3_0 => "chirp-v3-0",
            ModelVersion::ChirpV3_5 => "chirp-v3-5",
            ModelVersion::ChirpV4 => "chirp-v4",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == s)
    }
}

impl std::fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extend an earlier clip from a timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Continuation {
    pub task_id: String,
    pub at_seconds: f64,
    pub clip_id: String,
}

/// What drives the generation.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationMode {
    /// Explicit lyrics, style tags and title.
    Custom {
        prompt: String,
        tags: String,
        title: String,
    },
    /// Free-form description; upstream writes lyrics and picks a style.
    /// Custom fields ride along only when the caller gave them.
    Inspiration {
        description: String,
        prompt: Option<String>,
        tags: Option<String>,
        title: Option<String>,
    },
}

/// A validated tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub mode: GenerationMode,
    /// `None` means the caller left it to the default.
    pub model_version: Option<ModelVersion>,
    pub instrumental_only: Option<bool>,
    pub continuation: Option<Continuation>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("arguments must be a JSON object")]
    NotAnObject,

    #[error("custom-mode fields missing: {} (or provide a description for inspiration mode)", .missing.join(", "))]
    CustomFieldsMissing { missing: Vec<&'static str> },

    #[error("description must be a non-empty string")]
    InvalidDescription,

    #[error("unsupported model version {value} (expected one of chirp-v3-0, chirp-v3-5, chirp-v4)")]
    UnsupportedModelVersion { value: String },

    #[error("make_instrumental must be a boolean")]
    InstrumentalNotBoolean,

    #[error("incomplete continuation parameters: missing {}", .missing.join(", "))]
    IncompleteContinuation { missing: Vec<&'static str> },
}

/// Validate a raw argument bag.
pub fn validate(raw: &Value) -> Result<GenerationRequest, ValidationError> {
    let args = raw.as_object().ok_or(ValidationError::NotAnObject)?;

    let mode = validate_mode(args)?;

    let model_version = match provided(args, MODEL_VERSION) {
        None => None,
        Some(Value::String(s)) => Some(ModelVersion::parse(s).ok_or_else(|| {
            ValidationError::UnsupportedModelVersion {
                value: format!("{:?}", s),
            }
        })?),
        Some(other) => {
            return Err(ValidationError::UnsupportedModelVersion {
                value: other.to_string(),
            })
        }
    };

    let instrumental_only = match provided(args, INSTRUMENTAL) {
        None => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(_) => return Err(ValidationError::InstrumentalNotBoolean),
    };

    let continuation = validate_continuation(args)?;

    Ok(GenerationRequest {
        mode,
        model_version,
        instrumental_only,
        continuation,
    })
}

fn validate_mode(args: &Map<String, Value>) -> Result<GenerationMode, ValidationError> {
    let description = match lookup(args, DESCRIPTION) {
        None => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(ValidationError::InvalidDescription),
    };

    let prompt = non_blank_string(args, PROMPT);
    let tags = non_blank_string(args, TAGS);
    let title = non_blank_string(args, TITLE);

    if let Some(description) = description {
        return Ok(GenerationMode::Inspiration {
            description,
            prompt,
            tags,
            title,
        });
    }

    match (prompt, tags, title) {
        (Some(prompt), Some(tags), Some(title)) => Ok(GenerationMode::Custom {
            prompt,
            tags,
            title,
        }),
        (prompt, tags, title) => {
            let missing = [("prompt", prompt.is_none()), ("tags", tags.is_none()), ("title", title.is_none())]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
            Err(ValidationError::CustomFieldsMissing { missing })
        }
    }
}

/// A continuation field counts as present only with the right type and a
/// usable value; anything else is treated as absent.
fn validate_continuation(args: &Map<String, Value>) -> Result<Option<Continuation>, ValidationError> {
    let task_id = non_blank_string(args, CONTINUE_TASK);
    let at_seconds = lookup(args, CONTINUE_AT)
        .and_then(Value::as_f64)
        .filter(|at| at.is_finite() && *at >= 0.0);
    let clip_id = non_blank_string(args, CONTINUE_CLIP);

    match (task_id, at_seconds, clip_id) {
        (None, None, None) => Ok(None),
        (Some(task_id), Some(at_seconds), Some(clip_id)) => Ok(Some(Continuation {
            task_id,
            at_seconds,
            clip_id,
        })),
        (task_id, at_seconds, clip_id) => {
            let missing = [
                (CONTINUE_TASK[0], task_id.is_none()),
                (CONTINUE_AT[0], at_seconds.is_none()),
                (CONTINUE_CLIP[0], clip_id.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, absent)| absent.then_some(name))
            .collect();
            Err(ValidationError::IncompleteContinuation { missing })
        }
    }
}

/// First value under any of `keys`, `null` included.
fn provided<'a>(args: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| args.get(*key))
}

/// First non-null value under any of `keys`.
fn lookup<'a>(args: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| args.get(*key))
        .find(|value| !value.is_null())
}

fn non_blank_string(args: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    match lookup(args, keys) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn custom() -> Value {
        json!({"prompt": "la la la", "tags": "pop, upbeat", "title": "Song"})
    }

    fn with(mut base: Value, extra: Value) -> Value {
        let obj = base.as_object_mut().unwrap();
        for (k, v) in extra.as_object().unwrap() {
            obj.insert(k.clone(), v.clone());
        }
        base
    }

    #[test]
    fn test_rejects_non_objects() {
        for raw in [Value::Null, json!("prompt"), json!([1, 2]), json!(42)] {
            assert_eq!(validate(&raw), Err(ValidationError::NotAnObject));
        }
    }

    #[test]
    fn test_custom_mode_accepts_all_three() {
        let request = validate(&custom()).unwrap();
        assert_eq!(
            request.mode,
            GenerationMode::Custom {
                prompt: "la la la".into(),
                tags: "pop, upbeat".into(),
                title: "Song".into(),
            }
        );
        assert_eq!(request.model_version, None);
        assert_eq!(request.instrumental_only, None);
        assert_eq!(request.continuation, None);
    }

    #[test]
    fn test_custom_mode_rejects_any_missing_field() {
        for field in ["prompt", "tags", "title"] {
            for replacement in [None, Some(json!("")), Some(json!("   ")), Some(json!(7))] {
                let mut raw = custom();
                match &replacement {
                    None => {
                        raw.as_object_mut().unwrap().remove(field);
                    }
                    Some(v) => {
                        raw[field] = v.clone();
                    }
                }

                // An empty description still means custom mode.
                for description in [None, Some(json!("")), Some(json!("  \n"))] {
                    let mut raw = raw.clone();
                    if let Some(d) = &description {
                        raw["gpt_description_prompt"] = d.clone();
                    }
                    assert_eq!(
                        validate(&raw),
                        Err(ValidationError::CustomFieldsMissing {
                            missing: vec![field]
                        }),
                        "field={field} replacement={replacement:?} description={description:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_missing_fields_are_all_reported() {
        let err = validate(&json!({"tags": "rock"})).unwrap_err();
        assert_eq!(
            err,
            ValidationError::CustomFieldsMissing {
                missing: vec!["prompt", "title"]
            }
        );
        assert!(err.to_string().starts_with("custom-mode fields missing"));
    }

    #[test]
    fn test_inspiration_mode_needs_nothing_else() {
        for key in ["gpt_description_prompt", "description"] {
            let request = validate(&json!({ key: "a sea shanty about rust" })).unwrap();
            assert_eq!(
                request.mode,
                GenerationMode::Inspiration {
                    description: "a sea shanty about rust".into(),
                    prompt: None,
                    tags: None,
                    title: None,
                }
            );
        }
    }

    #[test]
    fn test_inspiration_mode_passes_custom_fields_through() {
        let raw = json!({"gpt_description_prompt": "lofi", "title": "Rainy", "tags": ""});
        let request = validate(&raw).unwrap();
        assert_eq!(
            request.mode,
            GenerationMode::Inspiration {
                description: "lofi".into(),
                prompt: None,
                tags: None,
                title: Some("Rainy".into()),
            }
        );
    }

    #[test]
    fn test_non_string_description_rejected() {
        let raw = with(custom(), json!({"gpt_description_prompt": 5}));
        assert_eq!(validate(&raw), Err(ValidationError::InvalidDescription));
    }

    #[test]
    fn test_model_version() {
        for version in ModelVersion::ALL {
            let raw = with(custom(), json!({"mv": version.as_str()}));
            assert_eq!(validate(&raw).unwrap().model_version, Some(version));
        }

        let raw = with(custom(), json!({"modelVersion": "chirp-v3-5"}));
        assert_eq!(validate(&raw).unwrap().model_version, Some(ModelVersion::ChirpV3_5));

        let raw = with(custom(), json!({"mv": "chirp-v9"}));
        assert!(matches!(
            validate(&raw),
            Err(ValidationError::UnsupportedModelVersion { .. })
        ));

        let raw = with(custom(), json!({"mv": 4}));
        assert!(matches!(
            validate(&raw),
            Err(ValidationError::UnsupportedModelVersion { .. })
        ));

        for key in ["mv", "modelVersion"] {
            let raw = with(custom(), json!({ key: null }));
            assert_eq!(
                validate(&raw),
                Err(ValidationError::UnsupportedModelVersion {
                    value: "null".into()
                })
            );
        }
    }

    #[test]
    fn test_instrumental_must_be_boolean() {
        let raw = with(custom(), json!({"make_instrumental": true}));
        assert_eq!(validate(&raw).unwrap().instrumental_only, Some(true));

        let raw = with(custom(), json!({"instrumentalOnly": false}));
        assert_eq!(validate(&raw).unwrap().instrumental_only, Some(false));

        for bad in [json!("true"), json!(1), json!({}), Value::Null] {
            let raw = with(custom(), json!({ "make_instrumental": bad }));
            assert_eq!(validate(&raw), Err(ValidationError::InstrumentalNotBoolean));
        }
    }

    #[test]
    fn test_continuation_all_or_nothing() {
        let fields = [
            ("task_id", json!("task-1")),
            ("continue_at", json!(30.5)),
            ("continue_clip_id", json!("clip-1")),
        ];

        for mask in 0u8..8 {
            let mut raw = custom();
            for (i, (key, value)) in fields.iter().enumerate() {
                if mask & (1 << i) != 0 {
                    raw[*key] = value.clone();
                }
            }

            let result = validate(&raw);
            match mask.count_ones() {
                0 => assert_eq!(result.unwrap().continuation, None),
                3 => assert_eq!(
                    result.unwrap().continuation,
                    Some(Continuation {
                        task_id: "task-1".into(),
                        at_seconds: 30.5,
                        clip_id: "clip-1".into(),
                    })
                ),
                _ => assert!(
                    matches!(result, Err(ValidationError::IncompleteContinuation { .. })),
                    "mask={mask:03b}"
                ),
            }
        }
    }

    #[test]
    fn test_continuation_presence_requires_usable_values() {
        // Wrong type or out-of-range values count as absent.
        let raw = with(
            custom(),
            json!({"task_id": "task-1", "continue_at": -1, "continue_clip_id": "clip-1"}),
        );
        assert_eq!(
            validate(&raw),
            Err(ValidationError::IncompleteContinuation {
                missing: vec!["continue_at"]
            })
        );

        let raw = with(custom(), json!({"task_id": 12, "continue_at": "10"}));
        assert_eq!(validate(&raw).unwrap().continuation, None);

        let raw = with(
            custom(),
            json!({"continueFromTaskId": "t", "continueAtSeconds": 0, "continueFromClipId": "c"}),
        );
        assert_eq!(validate(&raw).unwrap().continuation.unwrap().at_seconds, 0.0);
    }

    #[test]
    fn test_canonical_key_wins_over_alias() {
        let raw = json!({"gpt_description_prompt": "canonical", "description": "alias"});
        match validate(&raw).unwrap().mode {
            GenerationMode::Inspiration { description, .. } => assert_eq!(description, "canonical"),
            other => panic!("unexpected mode {other:?}"),
        }
    }
}
