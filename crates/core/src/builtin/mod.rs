// Built-in tools shipped with every registry host

pub mod fs;

use crate::error::ToolError;
use crate::registry::ToolRegistry;
use crate::tool::ToolHandler;
use crate::types::{ParameterSpec, ParameterType, ToolOutput, ToolSpec};
use std::path::PathBuf;

pub use fs::{
    CreateDirectoryTool, DeleteFileTool, FileInfoTool, FsRoot, ReadFileTool, WriteFileTool,
};

pub fn echo_spec() -> ToolSpec {
    ToolSpec::new("echo", "Echo a message back to the caller")
        .category("utility")
        .parameter(
            ParameterSpec::new("message", ParameterType::String)
                .description("Message to echo")
                .required(),
        )
}

pub fn echo_handler() -> ToolHandler {
    ToolHandler::blocking(|_ctx, args| {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        Ok(ToolOutput::text(format!("Echo: {message}")))
    })
}

/// Register `echo` and the file system tools rooted at `root`.
pub fn register_builtin_tools(
    registry: &ToolRegistry,
    root: impl Into<PathBuf>,
) -> Result<(), ToolError> {
    let root = FsRoot::new(root).map_err(|e| ToolError::invalid_spec("builtin", format!("{e:#}")))?;

    registry.register(echo_spec(), echo_handler())?;
    registry.register(
        fs::read_file_spec(),
        ToolHandler::from_tool(ReadFileTool::new(root.clone())),
    )?;
    registry.register(
        fs::write_file_spec(),
        ToolHandler::from_tool(WriteFileTool::new(root.clone())),
    )?;
    registry.register(
        fs::file_info_spec(),
        ToolHandler::from_tool(FileInfoTool::new(root.clone())),
    )?;
    registry.register(
        fs::delete_file_spec(),
        ToolHandler::from_tool(DeleteFileTool::new(root.clone())),
    )?;
    registry.register(
        fs::create_directory_spec(),
        ToolHandler::from_tool(CreateDirectoryTool::new(root.clone())),
    )?;

    let exists_root = root.clone();
    registry.register(
        fs::file_exists_spec(),
        ToolHandler::blocking(move |_ctx, args| fs::file_exists(&exists_root, args)),
    )?;

    let list_root = root.clone();
    registry.register(
        fs::list_directory_spec(),
        ToolHandler::blocking(move |_ctx, args| fs::list_directory(&list_root, args)),
    )?;

    tracing::info!(root = %root.path().display(), tools = registry.len(), "Registered built-in tools");
    Ok(())
}
