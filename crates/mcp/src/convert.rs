// Conversion between registry types and MCP wire types

use crate::protocol::{CallToolResult, McpTool, ResourceContents, ToolContent};
use base64::Engine;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use toolmesh_core::{FailureKind, ParameterSpec, ParameterType, ToolOutput, ToolResult, ToolSpec};

const BINARY_MIME: &str = "application/octet-stream";
const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Schema keys that describe the parameter itself rather than a constraint.
const RESERVED_KEYS: &[&str] = &["type", "format", "description", "default"];

fn type_to_schema(param_type: ParameterType) -> Map<String, Value> {
    let (ty, format) = match param_type {
        ParameterType::String => ("string", None),
        ParameterType::Integer => ("integer", None),
        ParameterType::Float => ("number", None),
        ParameterType::Boolean => ("boolean", None),
        ParameterType::Array => ("array", None),
        ParameterType::Object => ("object", None),
        ParameterType::FilePath => ("string", Some("path")),
        ParameterType::Url => ("string", Some("uri")),
    };
    let mut node = Map::new();
    node.insert("type".to_string(), Value::from(ty));
    if let Some(format) = format {
        node.insert("format".to_string(), Value::from(format));
    }
    node
}

fn schema_to_type(node: &Value) -> ParameterType {
    let ty = node.get("type").and_then(Value::as_str).unwrap_or("string");
    let format = node.get("format").and_then(Value::as_str).unwrap_or("");
    match (ty, format) {
        ("string", "path") => ParameterType::FilePath,
        ("string", "uri") => ParameterType::Url,
        ("integer", _) => ParameterType::Integer,
        ("number", _) => ParameterType::Float,
        ("boolean", _) => ParameterType::Boolean,
        ("array", _) => ParameterType::Array,
        ("object", _) => ParameterType::Object,
        _ => ParameterType::String,
    }
}

/// Describe a registered tool on the wire.
pub fn tool_to_mcp(spec: &ToolSpec) -> McpTool {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in &spec.parameters {
        let mut node = type_to_schema(param.param_type);
        if !param.description.is_empty() {
            node.insert("description".to_string(), Value::from(param.description.clone()));
        }
        if let Some(default) = &param.default {
            node.insert("default".to_string(), default.clone());
        }
        for (key, value) in &param.constraints {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                node.insert(key.clone(), value.clone());
            }
        }
        properties.insert(param.name.clone(), Value::Object(node));
        if param.required {
            required.push(Value::from(param.name.clone()));
        }
    }

    let mut schema = Map::new();
    schema.insert("type".to_string(), Value::from("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), Value::Array(required));
    }

    McpTool {
        name: spec.name.clone(),
        description: spec.description.clone(),
        input_schema: Value::Object(schema),
    }
}

/// Recover a tool spec from its wire description.
///
/// Unknown or missing schema types map to `string`; every schema key other
/// than type, format, description and default becomes a constraint.
pub fn tool_from_mcp(tool: &McpTool) -> ToolSpec {
    let description = if tool.description.is_empty() {
        format!("MCP tool: {}", tool.name)
    } else {
        tool.description.clone()
    };
    let mut spec = ToolSpec::new(tool.name.clone(), description).category("mcp");

    let required: Vec<&str> = tool
        .input_schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    if let Some(properties) = tool.input_schema.get("properties").and_then(Value::as_object) {
        for (name, node) in properties {
            let mut param = ParameterSpec::new(name.clone(), schema_to_type(node));
            param.required = required.contains(&name.as_str());
            param.description = node
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            param.default = node.get("default").cloned();
            if let Some(fields) = node.as_object() {
                param.constraints = fields
                    .iter()
                    .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect::<BTreeMap<_, _>>();
            }
            spec = spec.parameter(param);
        }
    }

    spec
}

/// Render a tool result as MCP content.
///
/// Result metadata travels in `_meta` so the content blocks carry only the
/// payload.
pub fn result_to_mcp(result: &ToolResult) -> CallToolResult {
    let meta = (!result.metadata().is_empty()).then(|| Value::Object(result.metadata().clone()));

    if !result.success() {
        return CallToolResult {
            content: vec![ToolContent::error(result.error().unwrap_or("unknown error"))],
            is_error: true,
            meta,
        };
    }

    let block = match result.data() {
        Some(ToolOutput::Text(text)) => ToolContent::text(text.clone()),
        Some(ToolOutput::Binary(bytes)) => ToolContent::Resource {
            resource: ResourceContents {
                uri: format!("data:{BINARY_MIME}"),
                mime_type: Some(BINARY_MIME.to_string()),
                text: None,
                blob: Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            },
        },
        Some(ToolOutput::Json(value)) => json_to_block(value),
        None => ToolContent::text(String::new()),
    };

    CallToolResult {
        content: vec![block],
        is_error: false,
        meta,
    }
}

fn json_to_block(value: &Value) -> ToolContent {
    if let Some(image) = value.get("image").and_then(Value::as_str) {
        let mime_type = value
            .get("mimeType")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_IMAGE_MIME);
        return ToolContent::Image {
            data: image.to_string(),
            mime_type: mime_type.to_string(),
        };
    }
    if value.is_null() {
        return ToolContent::text(String::new());
    }
    ToolContent::text(serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()))
}

/// Turn MCP content back into a tool result.
pub fn result_from_mcp(result: &CallToolResult) -> ToolResult {
    let texts: Vec<&str> = result
        .content
        .iter()
        .filter_map(|block| match block {
            ToolContent::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();

    if result.is_error {
        let message = if texts.is_empty() {
            "MCP tool execution failed".to_string()
        } else {
            texts
                .iter()
                .map(|t| t.strip_prefix("Error: ").unwrap_or(*t))
                .collect::<Vec<_>>()
                .join("\n")
        };
        return ToolResult::failure(FailureKind::Execution, message);
    }

    let mut extra = Map::new();
    let mut blob: Option<Vec<u8>> = None;
    for block in &result.content {
        match block {
            ToolContent::Text { .. } => {}
            ToolContent::Image { data, mime_type } => {
                extra.insert("image".to_string(), Value::from(data.clone()));
                extra.insert("mimeType".to_string(), Value::from(mime_type.clone()));
            }
            ToolContent::Resource { resource } => {
                if let Some(bytes) = resource
                    .blob
                    .as_deref()
                    .and_then(|b| base64::engine::general_purpose::STANDARD.decode(b).ok())
                {
                    blob = Some(bytes);
                }
                extra.insert(
                    "resource".to_string(),
                    json!({
                        "uri": resource.uri,
                        "mimeType": resource.mime_type,
                        "text": resource.text,
                        "blob": resource.blob,
                    }),
                );
            }
        }
    }

    let output = match (texts.is_empty(), extra.is_empty()) {
        (_, true) => ToolOutput::Text(texts.join("\n")),
        (true, false) if result.content.len() == 1 && blob.is_some() => {
            ToolOutput::Binary(blob.unwrap_or_default())
        }
        (true, false) => ToolOutput::Json(Value::Object(extra)),
        (false, false) => {
            extra.insert("text".to_string(), Value::from(texts.join("\n")));
            ToolOutput::Json(Value::Object(extra))
        }
    };

    let mut converted = ToolResult::ok(output);
    if let Some(Value::Object(meta)) = &result.meta {
        for (key, value) in meta {
            converted = converted.with_metadata(key.clone(), value.clone());
        }
    }
    converted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn sample_spec() -> ToolSpec {
        ToolSpec::new("fetch_page", "Fetch a web page")
            .parameter(
                ParameterSpec::new("url", ParameterType::Url)
                    .description("Page address")
                    .required(),
            )
            .parameter(ParameterSpec::new("save_to", ParameterType::FilePath))
            .parameter(
                ParameterSpec::new("retries", ParameterType::Integer)
                    .default_value(3)
                    .constraint("minimum", 0)
                    .constraint("maximum", 10),
            )
            .parameter(ParameterSpec::new("ratio", ParameterType::Float).required())
            .parameter(ParameterSpec::new("verbose", ParameterType::Boolean))
            .parameter(ParameterSpec::new("headers", ParameterType::Object))
            .parameter(ParameterSpec::new("tags", ParameterType::Array))
            .parameter(
                ParameterSpec::new("mode", ParameterType::String)
                    .constraint("enum", json!(["fast", "slow"])),
            )
    }

    #[test]
    fn test_tool_to_mcp_schema() {
        let tool = tool_to_mcp(&sample_spec());
        let props = &tool.input_schema["properties"];

        assert_eq!(tool.input_schema["type"], json!("object"));
        assert_eq!(props["url"], json!({"type": "string", "format": "uri", "description": "Page address"}));
        assert_eq!(props["save_to"], json!({"type": "string", "format": "path"}));
        assert_eq!(props["ratio"]["type"], json!("number"));
        assert_eq!(props["retries"]["default"], json!(3));
        assert_eq!(props["retries"]["maximum"], json!(10));
        assert_eq!(props["mode"]["enum"], json!(["fast", "slow"]));
        assert_eq!(tool.input_schema["required"], json!(["url", "ratio"]));
    }

    #[test]
    fn test_spec_round_trip() {
        let spec = sample_spec();
        let back = tool_from_mcp(&tool_to_mcp(&spec));

        assert_eq!(back.name, spec.name);
        let names = |s: &ToolSpec| s.parameters.iter().map(|p| p.name.clone()).collect::<BTreeSet<_>>();
        assert_eq!(names(&back), names(&spec));
        let required = |s: &ToolSpec| {
            s.parameters
                .iter()
                .filter(|p| p.required)
                .map(|p| p.name.clone())
                .collect::<BTreeSet<_>>()
        };
        assert_eq!(required(&back), required(&spec));

        for param in &spec.parameters {
            let recovered = back.param(&param.name).unwrap();
            assert_eq!(recovered.param_type, param.param_type, "type of {}", param.name);
            assert_eq!(recovered.default, param.default);
            assert_eq!(recovered.constraints, param.constraints);
        }
    }

    #[test]
    fn test_unknown_schema_type_defaults_to_string() {
        let tool = McpTool {
            name: "odd".into(),
            description: String::new(),
            input_schema: json!({
                "type": "object",
                "properties": {"when": {"type": "date"}, "any": {}}
            }),
        };
        let spec = tool_from_mcp(&tool);
        assert_eq!(spec.description, "MCP tool: odd");
        assert_eq!(spec.param("when").unwrap().param_type, ParameterType::String);
        assert_eq!(spec.param("any").unwrap().param_type, ParameterType::String);
        assert!(spec.required_parameters().is_empty());
    }

    #[test]
    fn test_result_to_mcp_blocks() {
        let text = result_to_mcp(&ToolResult::ok("hello"));
        assert!(!text.is_error);
        assert_eq!(text.content, vec![ToolContent::text("hello")]);

        let binary = result_to_mcp(&ToolResult::ok(ToolOutput::Binary(vec![1, 2, 3])));
        match &binary.content[0] {
            ToolContent::Resource { resource } => {
                assert_eq!(resource.blob.as_deref(), Some("AQID"));
                assert_eq!(resource.mime_type.as_deref(), Some(BINARY_MIME));
            }
            other => panic!("expected resource block, got {other:?}"),
        }

        let image = result_to_mcp(&ToolResult::ok(json!({"image": "aGk="})));
        assert_eq!(
            image.content,
            vec![ToolContent::Image {
                data: "aGk=".into(),
                mime_type: "image/png".into()
            }]
        );

        let structured = result_to_mcp(&ToolResult::ok(json!({"count": 2})));
        assert_eq!(
            structured.content,
            vec![ToolContent::text("{\n  \"count\": 2\n}")]
        );
    }

    #[test]
    fn test_failure_to_mcp() {
        let failed = ToolResult::failure(FailureKind::Execution, "disk full");
        let mcp = result_to_mcp(&failed);
        assert!(mcp.is_error);
        assert_eq!(mcp.content, vec![ToolContent::text("Error: disk full")]);
        assert_eq!(mcp.meta.unwrap()["error_kind"], json!("execution"));
    }

    #[test]
    fn test_result_from_mcp() {
        let joined = result_from_mcp(&CallToolResult {
            content: vec![ToolContent::text("a"), ToolContent::text("b")],
            is_error: false,
            meta: None,
        });
        assert_eq!(joined.data(), Some(&ToolOutput::text("a\nb")));

        let failed = result_from_mcp(&CallToolResult {
            content: vec![ToolContent::text("Error: nope")],
            is_error: true,
            meta: None,
        });
        assert!(!failed.success());
        assert_eq!(failed.error(), Some("nope"));

        let empty_error = result_from_mcp(&CallToolResult {
            content: vec![],
            is_error: true,
            meta: None,
        });
        assert!(!empty_error.success());

        let binary = result_from_mcp(&result_to_mcp(&ToolResult::ok(ToolOutput::Binary(
            b"raw".to_vec(),
        ))));
        assert_eq!(binary.data(), Some(&ToolOutput::Binary(b"raw".to_vec())));

        let mixed = result_from_mcp(&CallToolResult {
            content: vec![
                ToolContent::text("caption"),
                ToolContent::Image {
                    data: "aGk=".into(),
                    mime_type: "image/jpeg".into(),
                },
            ],
            is_error: false,
            meta: Some(json!({"tool_name": "snap"})),
        });
        let ToolOutput::Json(value) = mixed.data().unwrap() else {
            panic!("expected structured output");
        };
        assert_eq!(value["text"], json!("caption"));
        assert_eq!(value["mimeType"], json!("image/jpeg"));
        assert_eq!(mixed.metadata()["tool_name"], json!("snap"));
    }
}
