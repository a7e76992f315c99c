// Tool implementations and the handles the registry stores for them

use crate::sandbox::ToolContext;
use crate::types::{Arguments, ToolOutput};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// An asynchronous tool body.
///
/// `args` have already been validated and carry defaults for omitted
/// optional parameters.
#[async_trait]
pub trait Tool: Send + Sync {
    async fn call(&self, ctx: ToolContext, args: Arguments) -> anyhow::Result<ToolOutput>;
}

type BlockingFn = dyn Fn(ToolContext, Arguments) -> anyhow::Result<ToolOutput> + Send + Sync;

/// How a registered tool is invoked.
#[derive(Clone)]
pub enum ToolHandler {
    /// Synchronous body; run on the blocking pool so it never stalls a
    /// transport reader.
    Blocking(Arc<BlockingFn>),
    Async(Arc<dyn Tool>),
}

impl ToolHandler {
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn(ToolContext, Arguments) -> anyhow::Result<ToolOutput> + Send + Sync + 'static,
    {
        Self::Blocking(Arc::new(f))
    }

    pub fn from_tool<T: Tool + 'static>(tool: T) -> Self {
        Self::Async(Arc::new(tool))
    }

    /// Wrap an async closure.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(ToolContext, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ToolOutput>> + Send + 'static,
    {
        Self::Async(Arc::new(FnTool(f)))
    }
}

impl std::fmt::Debug for ToolHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocking(_) => f.write_str("ToolHandler::Blocking"),
            Self::Async(_) => f.write_str("ToolHandler::Async"),
        }
    }
}

struct FnTool<F>(F);

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(ToolContext, Arguments) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<ToolOutput>> + Send + 'static,
{
    async fn call(&self, ctx: ToolContext, args: Arguments) -> anyhow::Result<ToolOutput> {
        (self.0)(ctx, args).await
    }
}
