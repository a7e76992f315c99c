// Resource and prompt sources served over resources/* and prompts/*

use crate::error::{McpError, McpResult};
use crate::protocol::{
    error_codes, GetPromptResult, JsonRpcError, Prompt, PromptMessage, Resource, ResourceContents,
    Role, ToolContent,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn list(&self) -> McpResult<Vec<Resource>>;

    /// Contents for `uri`; unknown URIs are `RESOURCE_NOT_FOUND`.
    async fn read(&self, uri: &str) -> McpResult<Vec<ResourceContents>>;
}

#[async_trait]
pub trait PromptProvider: Send + Sync {
    async fn list(&self) -> McpResult<Vec<Prompt>>;

    /// Render prompt `name`; unknown names are `PROMPT_NOT_FOUND`.
    async fn get(&self, name: &str, arguments: &HashMap<String, String>)
        -> McpResult<GetPromptResult>;
}

/// Fixed set of text resources held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticResources {
    entries: BTreeMap<String, (Resource, String)>,
}

impl StaticResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(
        mut self,
        uri: impl Into<String>,
        name: impl Into<String>,
        mime_type: Option<&str>,
        text: impl Into<String>,
    ) -> Self {
        let uri = uri.into();
        let resource = Resource {
            uri: uri.clone(),
            name: name.into(),
            description: None,
            mime_type: mime_type.map(str::to_string),
        };
        self.entries.insert(uri, (resource, text.into()));
        self
    }
}

#[async_trait]
impl ResourceProvider for StaticResources {
    async fn list(&self) -> McpResult<Vec<Resource>> {
        Ok(self.entries.values().map(|(r, _)| r.clone()).collect())
    }

    async fn read(&self, uri: &str) -> McpResult<Vec<ResourceContents>> {
        let (resource, text) = self.entries.get(uri).ok_or_else(|| {
            McpError::from(JsonRpcError::custom(
                error_codes::RESOURCE_NOT_FOUND,
                format!("Resource not found: {uri}"),
            ))
        })?;
        Ok(vec![ResourceContents {
            uri: resource.uri.clone(),
            mime_type: resource.mime_type.clone(),
            text: Some(text.clone()),
            blob: None,
        }])
    }
}

/// Prompt templates with `{name}` placeholders filled from the arguments.
#[derive(Debug, Clone, Default)]
pub struct StaticPrompts {
    entries: BTreeMap<String, (Prompt, String)>,
}

impl StaticPrompts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn template(mut self, prompt: Prompt, template: impl Into<String>) -> Self {
        self.entries
            .insert(prompt.name.clone(), (prompt, template.into()));
        self
    }
}

#[async_trait]
impl PromptProvider for StaticPrompts {
    async fn list(&self) -> McpResult<Vec<Prompt>> {
        Ok(self.entries.values().map(|(p, _)| p.clone()).collect())
    }

    async fn get(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> McpResult<GetPromptResult> {
        let (prompt, template) = self.entries.get(name).ok_or_else(|| {
            McpError::from(JsonRpcError::custom(
                error_codes::PROMPT_NOT_FOUND,
                format!("Prompt not found: {name}"),
            ))
        })?;

        let mut text = template.clone();
        for argument in &prompt.arguments {
            match arguments.get(&argument.name) {
                Some(value) => text = text.replace(&format!("{{{}}}", argument.name), value),
                None if argument.required => {
                    return Err(JsonRpcError::invalid_params(format!(
                        "missing required argument '{}'",
                        argument.name
                    ))
                    .into())
                }
                None => text = text.replace(&format!("{{{}}}", argument.name), ""),
            }
        }

        Ok(GetPromptResult {
            description: prompt.description.clone(),
            messages: vec![PromptMessage {
                role: Role::User,
                content: ToolContent::text(text),
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PromptArgument;

    #[tokio::test]
    async fn test_static_resources() {
        let resources = StaticResources::new().text(
            "memo://readme",
            "readme",
            Some("text/plain"),
            "hello",
        );
        assert_eq!(resources.list().await.unwrap().len(), 1);

        let contents = resources.read("memo://readme").await.unwrap();
        assert_eq!(contents[0].text.as_deref(), Some("hello"));

        let err = resources.read("memo://missing").await.unwrap_err();
        assert_eq!(err.code(), Some(error_codes::RESOURCE_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_static_prompt_fills_arguments() {
        let prompts = StaticPrompts::new().template(
            Prompt {
                name: "review".into(),
                description: Some("Review a file".into()),
                arguments: vec![PromptArgument {
                    name: "path".into(),
                    description: None,
                    required: true,
                }],
            },
            "Please review {path}.",
        );

        let args = HashMap::from([("path".to_string(), "src/lib.rs".to_string())]);
        let result = prompts.get("review", &args).await.unwrap();
        assert_eq!(
            result.messages[0].content,
            ToolContent::text("Please review src/lib.rs.")
        );

        let err = prompts.get("review", &HashMap::new()).await.unwrap_err();
        assert_eq!(err.code(), Some(error_codes::INVALID_PARAMS));

        let err = prompts.get("ghost", &args).await.unwrap_err();
        assert_eq!(err.code(), Some(error_codes::PROMPT_NOT_FOUND));
    }
}
