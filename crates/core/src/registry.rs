// Tool registry: catalog, discovery indexes, policy-gated execution and statistics

use crate::error::ToolError;
use crate::sandbox::{DeadlineSandbox, ExecutionLimits, Sandbox, ToolContext};
use crate::security::{SecurityLevel, SecurityPolicy};
use crate::tool::ToolHandler;
use crate::types::{Arguments, ToolResult, ToolSpec};
use crate::validation::validate_arguments;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Per-tool execution statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub total_time: Duration,
    pub min_time: Option<Duration>,
    pub max_time: Option<Duration>,
    pub last_executed: Option<DateTime<Utc>>,
}

impl ToolStats {
    fn record(&mut self, success: bool, elapsed: Duration) {
        self.total += 1;
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.total_time += elapsed;
        self.min_time = Some(self.min_time.map_or(elapsed, |m| m.min(elapsed)));
        self.max_time = Some(self.max_time.map_or(elapsed, |m| m.max(elapsed)));
        self.last_executed = Some(Utc::now());
    }

    pub fn average_time(&self) -> Option<Duration> {
        if self.total == 0 {
            return None;
        }
        let divisor = u32::try_from(self.total).unwrap_or(u32::MAX);
        Some(self.total_time / divisor)
    }
}

/// A tool as held by the registry.
#[derive(Debug)]
pub struct RegisteredTool {
    spec: ToolSpec,
    handler: ToolHandler,
    aliases: Vec<String>,
    stats: Mutex<ToolStats>,
}

impl RegisteredTool {
    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    pub fn handler(&self) -> &ToolHandler {
        &self.handler
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn stats(&self) -> ToolStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, success: bool, elapsed: Duration) {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(success, elapsed);
    }
}

/// Options for [`ToolRegistry::register_with`].
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    pub aliases: Vec<String>,
    /// Remove an existing tool with the same name first.
    pub replace: bool,
}

impl RegisterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn replace(mut self) -> Self {
        self.replace = true;
        self
    }
}

/// Predicate for [`ToolRegistry::list`].
#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    pub category: Option<String>,
    pub tags: Vec<String>,
    /// Require every tag rather than any of them.
    pub match_all: bool,
    pub include_deprecated: bool,
}

impl ToolFilter {
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn match_all(mut self) -> Self {
        self.match_all = true;
        self
    }

    pub fn include_deprecated(mut self) -> Self {
        self.include_deprecated = true;
        self
    }

    pub fn matches(&self, spec: &ToolSpec) -> bool {
        if spec.deprecated && !self.include_deprecated {
            return false;
        }
        if let Some(category) = &self.category {
            if spec.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if self.tags.is_empty() {
            return true;
        }
        if self.match_all {
            self.tags.iter().all(|t| spec.tags.contains(t))
        } else {
            self.tags.iter().any(|t| spec.tags.contains(t))
        }
    }
}

/// Fields considered by [`ToolRegistry::search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchFields {
    pub name: bool,
    pub description: bool,
    pub tags: bool,
}

impl Default for SearchFields {
    fn default() -> Self {
        Self {
            name: true,
            description: true,
            tags: true,
        }
    }
}

#[derive(Default)]
struct RegistryState {
    tools: HashMap<String, Arc<RegisteredTool>>,
    aliases: HashMap<String, String>,
    by_category: HashMap<String, BTreeSet<String>>,
    by_tag: HashMap<String, BTreeSet<String>>,
    by_author: HashMap<String, BTreeSet<String>>,
}

impl RegistryState {
    fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    fn lookup(&self, name: &str) -> Option<Arc<RegisteredTool>> {
        self.tools.get(self.resolve(name)).cloned()
    }

    fn is_taken(&self, name: &str) -> bool {
        self.tools.contains_key(name) || self.aliases.contains_key(name)
    }

    fn index(&mut self, spec: &ToolSpec) {
        if let Some(category) = &spec.category {
            self.by_category
                .entry(category.clone())
                .or_default()
                .insert(spec.name.clone());
        }
        for tag in &spec.tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(spec.name.clone());
        }
        if let Some(author) = &spec.author {
            self.by_author
                .entry(author.clone())
                .or_default()
                .insert(spec.name.clone());
        }
    }

    /// Remove a tool by canonical name, with its aliases and index entries.
    fn remove(&mut self, name: &str) -> Option<Arc<RegisteredTool>> {
        let entry = self.tools.remove(name)?;
        for alias in &entry.aliases {
            self.aliases.remove(alias);
        }

        let spec = &entry.spec;
        if let Some(category) = &spec.category {
            unindex(&mut self.by_category, category, name);
        }
        for tag in &spec.tags {
            unindex(&mut self.by_tag, tag, name);
        }
        if let Some(author) = &spec.author {
            unindex(&mut self.by_author, author, name);
        }
        Some(entry)
    }
}

fn unindex(index: &mut HashMap<String, BTreeSet<String>>, key: &str, name: &str) {
    if let Some(names) = index.get_mut(key) {
        names.remove(name);
        if names.is_empty() {
            index.remove(key);
        }
    }
}

/// Catalog of tools.
///
/// Lookups and executions take a shared lock only long enough to clone the
/// tool handle; registration takes the exclusive lock around index updates.
pub struct ToolRegistry {
    state: RwLock<RegistryState>,
    policy: Arc<SecurityPolicy>,
    sandbox: Arc<dyn Sandbox>,
    limits: ExecutionLimits,
}

impl ToolRegistry {
    pub fn new(level: SecurityLevel) -> Self {
        Self::with_policy(Arc::new(SecurityPolicy::new(level)))
    }

    pub fn with_policy(policy: Arc<SecurityPolicy>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            policy,
            sandbox: Arc::new(DeadlineSandbox),
            limits: ExecutionLimits::default(),
        }
    }

    /// Replace the sandbox hook wrapped around every execution.
    pub fn with_sandbox(mut self, sandbox: Arc<dyn Sandbox>) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn policy(&self) -> &Arc<SecurityPolicy> {
        &self.policy
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.policy.level()
    }

    pub fn set_security_level(&self, level: SecurityLevel) {
        self.policy.set_level(level);
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a tool under its spec name.
    pub fn register(&self, spec: ToolSpec, handler: ToolHandler) -> Result<(), ToolError> {
        self.register_with(spec, handler, RegisterOptions::default())
    }

    /// Register a tool with aliases and/or replacement of an existing entry.
    pub fn register_with(
        &self,
        spec: ToolSpec,
        handler: ToolHandler,
        options: RegisterOptions,
    ) -> Result<(), ToolError> {
        spec.validate()?;

        let mut aliases: Vec<String> = Vec::new();
        for alias in options.aliases {
            if alias != spec.name && !aliases.contains(&alias) {
                aliases.push(alias);
            }
        }

        let mut state = self.write();

        // Every conflict is checked before anything is removed, so a failed
        // registration leaves the registry untouched.
        let replacing = state.tools.contains_key(&spec.name);
        if replacing && !options.replace {
            return Err(ToolError::AlreadyRegistered(spec.name));
        }
        if !replacing && state.aliases.contains_key(&spec.name) {
            return Err(ToolError::AlreadyRegistered(spec.name));
        }

        let owned_by_replaced =
            |alias: &str| replacing && state.aliases.get(alias) == Some(&spec.name);
        if let Some(taken) = aliases
            .iter()
            .find(|a| state.is_taken(a) && !owned_by_replaced(a))
        {
            return Err(ToolError::AlreadyRegistered(taken.clone()));
        }

        if replacing {
            state.remove(&spec.name);
        }

        if spec.deprecated {
            tracing::warn!(tool = %spec.name, "Registering deprecated tool");
        }

        for alias in &aliases {
            state.aliases.insert(alias.clone(), spec.name.clone());
        }
        state.index(&spec);
        let name = spec.name.clone();
        state.tools.insert(
            name.clone(),
            Arc::new(RegisteredTool {
                spec,
                handler,
                aliases,
                stats: Mutex::new(ToolStats::default()),
            }),
        );

        tracing::debug!(tool = %name, "Registered tool");
        Ok(())
    }

    /// Remove a tool (by name or alias) with its aliases and statistics.
    pub fn unregister(&self, name: &str) -> Result<(), ToolError> {
        let mut state = self.write();
        let canonical = state.resolve(name).to_string();
        match state.remove(&canonical) {
            Some(_) => {
                tracing::debug!(tool = %canonical, "Unregistered tool");
                Ok(())
            }
            None => Err(ToolError::NotFound(name.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<RegisteredTool>> {
        self.read().lookup(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.read().lookup(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tool specs matching `filter`, sorted by name.
    pub fn list(&self, filter: &ToolFilter) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .read()
            .tools
            .values()
            .filter(|entry| filter.matches(&entry.spec))
            .map(|entry| entry.spec.clone())
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Tools the current security level would allow, sorted by name.
    pub fn list_allowed(&self, filter: &ToolFilter) -> Vec<ToolSpec> {
        self.list(filter)
            .into_iter()
            .filter(|spec| self.policy.allows(&spec.tags))
            .collect()
    }

    /// Case-insensitive substring search over the selected fields.
    pub fn search(&self, query: &str, fields: SearchFields) -> Vec<ToolSpec> {
        let needle = query.to_lowercase();
        let hit = |haystack: &str| haystack.to_lowercase().contains(&needle);

        let mut specs: Vec<ToolSpec> = self
            .read()
            .tools
            .values()
            .map(|entry| &entry.spec)
            .filter(|spec| {
                (fields.name && hit(&spec.name))
                    || (fields.description && hit(&spec.description))
                    || (fields.tags && spec.tags.iter().any(|t| hit(t)))
            })
            .cloned()
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn by_category(&self, category: &str) -> Vec<String> {
        indexed(&self.read().by_category, category)
    }

    pub fn by_tag(&self, tag: &str) -> Vec<String> {
        indexed(&self.read().by_tag, tag)
    }

    pub fn by_author(&self, author: &str) -> Vec<String> {
        indexed(&self.read().by_author, author)
    }

    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self.read().by_category.keys().cloned().collect();
        categories.sort();
        categories
    }

    pub fn statistics(&self, name: &str) -> Option<ToolStats> {
        self.get(name).map(|entry| entry.stats())
    }

    pub fn all_statistics(&self) -> HashMap<String, ToolStats> {
        self.read()
            .tools
            .iter()
            .map(|(name, entry)| (name.clone(), entry.stats()))
            .collect()
    }

    /// Execute a tool by name or alias.
    ///
    /// Unknown tools, policy denials and invalid arguments are returned as
    /// typed errors before the tool body runs. Failures inside the body
    /// (errors, panics, timeouts) come back as a failed `ToolResult`.
    pub async fn execute(&self, name: &str, args: Arguments) -> Result<ToolResult, ToolError> {
        let entry = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let spec = &entry.spec;

        self.policy.check(spec)?;

        let started = Instant::now();
        let args = match validate_arguments(spec, &args) {
            Ok(args) => args,
            Err(err) => {
                entry.record(false, started.elapsed());
                return Err(err);
            }
        };

        if spec.deprecated {
            tracing::warn!(
                tool = %spec.name,
                message = spec.deprecation_message.as_deref().unwrap_or(""),
                "Executing deprecated tool"
            );
        }

        let ctx = ToolContext::new(spec.name.clone(), &self.limits);
        let task = match entry.handler.clone() {
            ToolHandler::Blocking(f) => {
                let ctx = ctx.clone();
                tokio::task::spawn_blocking(move || f(ctx, args))
            }
            ToolHandler::Async(tool) => {
                let ctx = ctx.clone();
                tokio::spawn(async move { tool.call(ctx, args).await })
            }
        };

        let outcome = self.sandbox.run(&ctx, task).await;
        let elapsed = started.elapsed();
        entry.record(outcome.is_ok(), elapsed);

        let result = match outcome {
            Ok(output) => {
                tracing::debug!(tool = %spec.name, elapsed_ms = elapsed.as_millis() as u64, "Tool executed");
                ToolResult::ok(output)
            }
            Err(err) => {
                tracing::warn!(tool = %spec.name, error = %err, "Tool execution failed");
                ToolResult::from(err)
            }
        };

        Ok(result
            .with_execution_time(elapsed)
            .with_metadata("tool_name", spec.name.clone()))
    }

    /// Flattened boundary for callers that only want a `ToolResult`.
    pub async fn invoke(&self, name: &str, args: Arguments) -> ToolResult {
        match self.execute(name, args).await {
            Ok(result) => result,
            Err(err) => ToolResult::from(err).with_metadata("tool_name", name.to_string()),
        }
    }

    /// Blocking variant of [`invoke`](Self::invoke) for callers outside an
    /// async runtime.
    ///
    /// Runs on a scoped thread with its own current-thread runtime, so it is
    /// also safe to call from inside a runtime worker.
    pub fn execute_blocking(&self, name: &str, args: Arguments) -> ToolResult {
        std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(runtime) => runtime.block_on(self.invoke(name, args)),
                        Err(err) => ToolResult::failure(
                            crate::error::FailureKind::Execution,
                            format!("failed to start runtime: {err}"),
                        ),
                    }
                })
                .join()
                .unwrap_or_else(|_| {
                    ToolResult::failure(crate::error::FailureKind::Execution, "executor thread panicked")
                })
        })
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(SecurityLevel::default())
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.len())
            .field("level", &self.security_level())
            .field("limits", &self.limits)
            .finish()
    }
}

fn indexed(index: &HashMap<String, BTreeSet<String>>, key: &str) -> Vec<String> {
    index
        .get(key)
        .map(|names| names.iter().cloned().collect())
        .unwrap_or_default()
}
