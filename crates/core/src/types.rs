// Tool description and result types

use crate::error::{FailureKind, ToolError};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;

/// Arguments passed to a tool, keyed by parameter name.
pub type Arguments = Map<String, Value>;

/// Supported parameter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Integer,
    Float,
    Boolean,
    Array,
    Object,
    FilePath,
    Url,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::FilePath => "file_path",
            Self::Url => "url",
        }
    }

    /// Whether a JSON value has the shape of this type.
    ///
    /// Integral floats such as `3.0` count as integers. Content checks for
    /// paths and URLs live in the validator.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String | Self::FilePath | Self::Url => value.is_string(),
            Self::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false)
            }
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

impl std::fmt::Display for ParameterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Definition of a single tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Open constraint map (min/max/pattern/enum/allowed_extensions, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub constraints: BTreeMap<String, Value>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, param_type: ParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: String::new(),
            required: false,
            default: None,
            constraints: BTreeMap::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn constraint(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraints.insert(key.into(), value.into());
        self
    }
}

/// Immutable description of a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Capability tags; drive security evaluation and discovery.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation_message: Option<String>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: "1.0.0".to_string(),
            author: None,
            category: None,
            tags: BTreeSet::new(),
            parameters: Vec::new(),
            deprecated: false,
            deprecation_message: None,
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn deprecated(mut self, message: impl Into<String>) -> Self {
        self.deprecated = true;
        self.deprecation_message = Some(message.into());
        self
    }

    /// Look up a parameter by name.
    pub fn param(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Names of required parameters, in declaration order.
    pub fn required_parameters(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Check the tool spec is well-formed before it is registered.
    pub fn validate(&self) -> Result<(), ToolError> {
        if self.name.trim().is_empty() {
            return Err(ToolError::invalid_spec(&self.name, "tool name cannot be empty"));
        }
        if self.name.chars().any(char::is_whitespace) {
            return Err(ToolError::invalid_spec(
                &self.name,
                "tool name cannot contain whitespace",
            ));
        }

        let mut seen = HashSet::new();
        for param in &self.parameters {
            if !is_identifier(&param.name) {
                return Err(ToolError::invalid_spec(
                    &self.name,
                    format!("invalid parameter name: {}", param.name),
                ));
            }
            if !seen.insert(param.name.as_str()) {
                return Err(ToolError::invalid_spec(
                    &self.name,
                    format!("duplicate parameter name: {}", param.name),
                ));
            }
            if let Some(default) = &param.default {
                if !param.param_type.matches(default) {
                    return Err(ToolError::invalid_spec(
                        &self.name,
                        format!(
                            "default for '{}' does not match type {}",
                            param.name, param.param_type
                        ),
                    ));
                }
            }
            if let Some(exts) = param.constraints.get("allowed_extensions") {
                let valid = exts
                    .as_array()
                    .map(|items| items.iter().all(Value::is_string))
                    .unwrap_or(false);
                if !valid {
                    return Err(ToolError::invalid_spec(
                        &self.name,
                        format!("allowed_extensions must be a list of strings for {}", param.name),
                    ));
                }
            }
            if let Some(pattern) = param.constraints.get("pattern") {
                let compiles = pattern
                    .as_str()
                    .map(|p| Regex::new(p).is_ok())
                    .unwrap_or(false);
                if !compiles {
                    return Err(ToolError::invalid_spec(
                        &self.name,
                        format!("pattern for '{}' is not a valid regex", param.name),
                    ));
                }
            }
        }

        Ok(())
    }
}

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Payload produced by a successful tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ToolOutput {
    Text(String),
    Binary(Vec<u8>),
    Json(Value),
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn json(value: impl Serialize) -> anyhow::Result<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// Outcome of a tool execution.
///
/// Exactly one of `data` and `error` is set; the constructors are the only way
/// to build one, so `success()` always agrees with `error().is_none()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<ToolOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<FailureKind>,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(with = "duration_millis")]
    execution_time: Duration,
    timestamp: DateTime<Utc>,
}

impl ToolResult {
    pub fn ok(data: impl Into<ToolOutput>) -> Self {
        Self {
            success: true,
            data: Some(data.into()),
            error: None,
            kind: None,
            metadata: Map::new(),
            execution_time: Duration::ZERO,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(kind: FailureKind, error: impl Into<String>) -> Self {
        let mut metadata = Map::new();
        metadata.insert("error_kind".to_string(), Value::from(kind.as_str()));
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            kind: Some(kind),
            metadata,
            execution_time: Duration::ZERO,
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_execution_time(mut self, elapsed: Duration) -> Self {
        self.execution_time = elapsed;
        self
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn data(&self) -> Option<&ToolOutput> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<ToolOutput> {
        self.data
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn kind(&self) -> Option<FailureKind> {
        self.kind
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl From<ToolError> for ToolResult {
    fn from(err: ToolError) -> Self {
        ToolResult::failure(err.kind(), err.to_string())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(millis.max(0.0) / 1000.0))
    }
}
