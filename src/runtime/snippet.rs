//! Snippet records as served by the snippet store, and pipeline selection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::component::params::InputParameter;

/// A stored snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    /// Store id
    #[serde(default)]
    pub id: Option<String>,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Source text
    pub code: String,
    /// Language tag (`python`, `jsx`, `tsx`, ...)
    pub language: String,
    /// Category label
    #[serde(default)]
    pub category: Option<String>,
    /// Owning namespace
    #[serde(default)]
    pub namespace_id: Option<String>,
    /// Whether the snippet is a previewable component
    #[serde(default)]
    pub has_preview: bool,
    /// Export to render when previewing
    #[serde(default)]
    pub function_name: Option<String>,
    /// Declared component parameters; the store sends `null` when unset
    #[serde(default)]
    pub input_parameters: Option<Vec<InputParameter>>,
    /// Creation time, epoch milliseconds
    #[serde(default)]
    pub created_at: Option<i64>,
    /// Last update, epoch milliseconds
    #[serde(default)]
    pub updated_at: Option<i64>,
}

/// Pipeline a snippet should be sent to.
#[derive(Debug, Clone, PartialEq)]
pub enum SnippetTarget<'a> {
    /// Guest script execution
    Script {
        /// Program text
        source: &'a str,
    },
    /// Component preview
    Preview {
        /// Component module text
        source: &'a str,
        /// Export to render; default export when `None`
        export_name: Option<&'a str>,
        /// Parameters to coerce into props
        parameters: &'a [InputParameter],
    },
    /// Neither pipeline applies
    DisplayOnly,
}

const SCRIPT_LANGUAGES: &[&str] = &["python", "py", "python3"];
const COMPONENT_LANGUAGES: &[&str] = &[
    "jsx",
    "tsx",
    "javascript",
    "js",
    "typescript",
    "ts",
    "react",
];

impl Snippet {
    /// Parse a snippet from the store's JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Declared parameters, empty when none were stored.
    pub fn parameters(&self) -> &[InputParameter] {
        self.input_parameters.as_deref().unwrap_or_default()
    }

    /// Creation time, if recorded and representable.
    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created_at.and_then(DateTime::from_timestamp_millis)
    }

    /// Last update time, if recorded and representable.
    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.updated_at.and_then(DateTime::from_timestamp_millis)
    }

    /// Choose the pipeline for this snippet.
    pub fn target(&self) -> SnippetTarget<'_> {
        let language = self.language.trim().to_ascii_lowercase();
        if SCRIPT_LANGUAGES.contains(&language.as_str()) {
            return SnippetTarget::Script { source: &self.code };
        }
        if self.has_preview && COMPONENT_LANGUAGES.contains(&language.as_str()) {
            return SnippetTarget::Preview {
                source: &self.code,
                export_name: self.function_name.as_deref().filter(|name| !name.is_empty()),
                parameters: self.parameters(),
            };
        }
        SnippetTarget::DisplayOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_snippet_targets_script() {
        let snippet = Snippet::from_json(
            r#"{"id":"1","title":"Hello","code":"print('hi')","language":"Python","hasPreview":false,"inputParameters":null,"createdAt":1700000000000}"#,
        )
        .unwrap();
        assert_eq!(
            snippet.target(),
            SnippetTarget::Script {
                source: "print('hi')"
            }
        );
        assert!(snippet.parameters().is_empty());
        assert_eq!(snippet.created().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_previewable_component_targets_preview() {
        let snippet = Snippet::from_json(
            r#"{"code":"export default function Card() { return <div/>; }","language":"tsx","hasPreview":true,"functionName":"Card",
                "inputParameters":[{"name":"title","type":"string","defaultValue":"'Hi'"}]}"#,
        )
        .unwrap();
        match snippet.target() {
            SnippetTarget::Preview {
                export_name,
                parameters,
                ..
            } => {
                assert_eq!(export_name, Some("Card"));
                assert_eq!(parameters.len(), 1);
                assert_eq!(parameters[0].name, "title");
            }
            other => panic!("expected preview, got {other:?}"),
        }
    }

    #[test]
    fn test_component_without_preview_is_display_only() {
        let snippet =
            Snippet::from_json(r#"{"code":"const x = 1;","language":"javascript"}"#).unwrap();
        assert_eq!(snippet.target(), SnippetTarget::DisplayOnly);
    }
}
