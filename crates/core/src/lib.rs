// Tool registry, validation and security policy for Toolmesh

pub mod builtin;
pub mod error;
pub mod registry;
pub mod sandbox;
pub mod security;
pub mod tool;
pub mod types;
pub mod validation;

pub use error::{FailureKind, ToolError};
pub use registry::{RegisterOptions, RegisteredTool, SearchFields, ToolFilter, ToolRegistry, ToolStats};
pub use sandbox::{DeadlineSandbox, ExecutionLimits, Sandbox, ToolContext};
pub use security::{DenyTable, SecurityLevel, SecurityPolicy};
pub use tool::{Tool, ToolHandler};
pub use types::*;
