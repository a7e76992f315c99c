// File system tools confined to a root directory

use crate::sandbox::ToolContext;
use crate::tool::Tool;
use crate::types::{Arguments, ParameterSpec, ParameterType, ToolOutput, ToolSpec};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

const SECRET_PATTERNS: &[&str] = &[
    ".env",
    "credentials",
    "secrets",
    "id_rsa",
    "id_ed25519",
    ".pem",
    ".key",
    "password",
    "api_key",
    ".git/config",
];

/// Resolves caller-supplied paths inside a fixed root.
#[derive(Debug, Clone)]
pub struct FsRoot {
    root: PathBuf,
}

impl FsRoot {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let root = root
            .canonicalize()
            .with_context(|| format!("Invalid tool root: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Whether a root-relative path looks like it holds secrets.
    fn is_secret(relative: &Path) -> bool {
        let lowered = relative.to_string_lossy().replace('\\', "/").to_lowercase();
        SECRET_PATTERNS.iter().any(|p| lowered.contains(p))
    }

    /// Map a caller path onto the root, refusing escapes and secret files.
    ///
    /// Absolute paths are accepted only when they already lie under the
    /// root. The target need not exist; its nearest existing ancestor is
    /// canonicalised so symlinks cannot lead outside the root.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf> {
        let requested = Path::new(raw);
        let relative = if requested.is_absolute() {
            requested
                .strip_prefix(&self.root)
                .with_context(|| format!("Access denied: {raw} is outside the tool root"))?
                .to_path_buf()
        } else {
            requested.to_path_buf()
        };

        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            bail!("Access denied: {raw} escapes the tool root");
        }
        if Self::is_secret(&relative) {
            bail!("Access denied: {raw} appears to be a secret file");
        }

        let joined = self.root.join(&relative);
        let mut existing = joined.as_path();
        while !existing.exists() {
            existing = match existing.parent() {
                Some(parent) => parent,
                None => break,
            };
        }
        let canonical = existing
            .canonicalize()
            .with_context(|| format!("Failed to resolve {raw}"))?;
        if !canonical.starts_with(&self.root) {
            bail!("Access denied: {raw} is outside the tool root");
        }

        Ok(joined)
    }

    fn display(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}

pub fn read_file_spec() -> ToolSpec {
    ToolSpec::new("read_file", "Read the contents of a text file")
        .category("file_system")
        .tags(["filesystem", "file_read"])
        .parameter(
            ParameterSpec::new("path", ParameterType::FilePath)
                .description("Path to the file, relative to the tool root")
                .required(),
        )
        .parameter(
            ParameterSpec::new("max_bytes", ParameterType::Integer)
                .description("Refuse files larger than this many bytes")
                .default_value(1024 * 1024)
                .constraint("minimum", 1),
        )
}

pub fn write_file_spec() -> ToolSpec {
    ToolSpec::new("write_file", "Write text content to a file")
        .category("file_system")
        .tags(["filesystem", "file_write"])
        .parameter(
            ParameterSpec::new("path", ParameterType::FilePath)
                .description("Path to the file, relative to the tool root")
                .required(),
        )
        .parameter(
            ParameterSpec::new("content", ParameterType::String)
                .description("Content to write")
                .required(),
        )
        .parameter(
            ParameterSpec::new("create_dirs", ParameterType::Boolean)
                .description("Create missing parent directories")
                .default_value(false),
        )
        .parameter(
            ParameterSpec::new("overwrite", ParameterType::Boolean)
                .description("Replace the file if it already exists")
                .default_value(false),
        )
}

pub fn list_directory_spec() -> ToolSpec {
    ToolSpec::new("list_directory", "List the contents of a directory")
        .category("file_system")
        .tags(["filesystem", "file_read"])
        .parameter(
            ParameterSpec::new("path", ParameterType::FilePath)
                .description("Directory to list, relative to the tool root")
                .default_value("."),
        )
        .parameter(
            ParameterSpec::new("recursive", ParameterType::Boolean)
                .description("Descend into subdirectories")
                .default_value(false),
        )
        .parameter(
            ParameterSpec::new("include_hidden", ParameterType::Boolean)
                .description("Include entries whose name starts with '.'")
                .default_value(false),
        )
        .parameter(
            ParameterSpec::new("pattern", ParameterType::String)
                .description("Wildcard filter on entry names (* and ?)"),
        )
}

pub fn file_info_spec() -> ToolSpec {
    ToolSpec::new("file_info", "Describe a file or directory")
        .category("file_system")
        .tags(["filesystem", "file_read"])
        .parameter(
            ParameterSpec::new("path", ParameterType::FilePath)
                .description("Path to inspect, relative to the tool root")
                .required(),
        )
}

pub fn delete_file_spec() -> ToolSpec {
    ToolSpec::new("delete_file", "Delete a file or directory")
        .category("file_system")
        .tags(["filesystem", "file_write", "dangerous"])
        .parameter(
            ParameterSpec::new("path", ParameterType::FilePath)
                .description("Path to delete, relative to the tool root")
                .required(),
        )
        .parameter(
            ParameterSpec::new("force", ParameterType::Boolean)
                .description("Also delete non-empty directories")
                .default_value(false),
        )
}

pub fn create_directory_spec() -> ToolSpec {
    ToolSpec::new("create_directory", "Create a directory")
        .category("file_system")
        .tags(["filesystem", "file_write"])
        .parameter(
            ParameterSpec::new("path", ParameterType::FilePath)
                .description("Directory to create, relative to the tool root")
                .required(),
        )
        .parameter(
            ParameterSpec::new("parents", ParameterType::Boolean)
                .description("Create missing parent directories")
                .default_value(true),
        )
        .parameter(
            ParameterSpec::new("exist_ok", ParameterType::Boolean)
                .description("Succeed if the directory already exists")
                .default_value(true),
        )
}

pub fn file_exists_spec() -> ToolSpec {
    ToolSpec::new("file_exists", "Check whether a file or directory exists")
        .category("file_system")
        .tags(["filesystem", "file_read"])
        .parameter(
            ParameterSpec::new("path", ParameterType::FilePath)
                .description("Path to check, relative to the tool root")
                .required(),
        )
}

#[derive(Debug, Deserialize)]
struct ReadArgs {
    path: String,
    max_bytes: u64,
}

/// Tool to read text files under the root.
pub struct ReadFileTool {
    root: FsRoot,
}

impl ReadFileTool {
    pub fn new(root: FsRoot) -> Self {
        Self { root }
    }
}

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    async fn call(&self, _ctx: ToolContext, args: Arguments) -> Result<ToolOutput> {
        let args: ReadArgs = serde_json::from_value(args.into())
            .context("Invalid arguments for read_file")?;
        let path = self.root.resolve(&args.path)?;

        let meta = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("File not found: {}", args.path))?;
        if !meta.is_file() {
            bail!("Path is not a file: {}", args.path);
        }
        if meta.len() > args.max_bytes {
            bail!(
                "File too large: {} is {} bytes (limit {})",
                args.path,
                meta.len(),
                args.max_bytes
            );
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {} as UTF-8 text", args.path))?;
        Ok(ToolOutput::Text(content))
    }
}

#[derive(Debug, Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
    create_dirs: bool,
    overwrite: bool,
}

/// Tool to write text files under the root.
pub struct WriteFileTool {
    root: FsRoot,
}

impl WriteFileTool {
    pub fn new(root: FsRoot) -> Self {
        Self { root }
    }
}

#[async_trait::async_trait]
impl Tool for WriteFileTool {
    async fn call(&self, _ctx: ToolContext, args: Arguments) -> Result<ToolOutput> {
        let args: WriteArgs = serde_json::from_value(args.into())
            .context("Invalid arguments for write_file")?;
        let path = self.root.resolve(&args.path)?;

        let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);
        if existed && !args.overwrite {
            bail!(
                "File already exists: {}. Set overwrite=true to replace it.",
                args.path
            );
        }

        if let Some(parent) = path.parent() {
            if args.create_dirs {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            } else if !parent.is_dir() {
                bail!("Parent directory does not exist for {}", args.path);
            }
        }

        tokio::fs::write(&path, args.content.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", args.path))?;

        Ok(ToolOutput::Json(json!({
            "path": self.root.display(&path),
            "written_bytes": args.content.len(),
            "created": !existed,
        })))
    }
}

#[derive(Debug, Deserialize)]
struct ListArgs {
    path: String,
    recursive: bool,
    include_hidden: bool,
    pattern: Option<String>,
}

/// Synchronous directory listing; registered as a blocking handler.
pub fn list_directory(root: &FsRoot, args: Arguments) -> Result<ToolOutput> {
    let args: ListArgs = serde_json::from_value(args.into())
        .context("Invalid arguments for list_directory")?;
    let dir = root.resolve(&args.path)?;
    if !dir.is_dir() {
        bail!("Path is not a directory: {}", args.path);
    }

    let matcher = args
        .pattern
        .as_deref()
        .map(wildcard_regex)
        .transpose()?;
    let max_depth = if args.recursive { usize::MAX } else { 1 };

    let mut entries = Vec::new();
    let walker = walkdir::WalkDir::new(&dir)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| args.include_hidden || !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(error = %err, "Skipping unreadable entry");
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(re) = &matcher {
            if !re.is_match(&name) {
                continue;
            }
        }
        let relative = match entry.path().strip_prefix(root.path()) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        if FsRoot::is_secret(relative) {
            continue;
        }

        let meta = entry.metadata().ok();
        let is_dir = entry.file_type().is_dir();
        entries.push(json!({
            "name": name,
            "path": relative.to_string_lossy(),
            "type": if is_dir { "directory" } else { "file" },
            "size": meta.as_ref().filter(|m| m.is_file()).map(|m| m.len()),
            "modified": meta.as_ref().and_then(|m| m.modified().ok()).map(rfc3339),
        }));
    }

    Ok(ToolOutput::Json(json!({
        "directory": root.display(&dir),
        "count": entries.len(),
        "entries": entries,
    })))
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

fn wildcard_regex(pattern: &str) -> Result<regex::Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    regex::Regex::new(&re).with_context(|| format!("Invalid pattern: {pattern}"))
}

fn rfc3339(time: SystemTime) -> String {
    chrono::DateTime::<chrono::Utc>::from(time).to_rfc3339()
}

#[derive(Debug, Deserialize)]
struct InfoArgs {
    path: String,
}

/// Tool to describe a path under the root.
pub struct FileInfoTool {
    root: FsRoot,
}

impl FileInfoTool {
    pub fn new(root: FsRoot) -> Self {
        Self { root }
    }
}

#[async_trait::async_trait]
impl Tool for FileInfoTool {
    async fn call(&self, _ctx: ToolContext, args: Arguments) -> Result<ToolOutput> {
        let args: InfoArgs = serde_json::from_value(args.into())
            .context("Invalid arguments for file_info")?;
        let path = self.root.resolve(&args.path)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("Path does not exist: {}", args.path))?;

        Ok(ToolOutput::Json(json!({
            "path": self.root.display(&path),
            "type": if meta.is_dir() { "directory" } else { "file" },
            "size": meta.len(),
            "readonly": meta.permissions().readonly(),
            "modified": meta.modified().ok().map(rfc3339),
            "extension": path.extension().map(|e| e.to_string_lossy().into_owned()),
        })))
    }
}

#[derive(Debug, Deserialize)]
struct DeleteArgs {
    path: String,
    force: bool,
}

/// Tool to delete files and directories under the root.
pub struct DeleteFileTool {
    root: FsRoot,
}

impl DeleteFileTool {
    pub fn new(root: FsRoot) -> Self {
        Self { root }
    }
}

#[async_trait::async_trait]
impl Tool for DeleteFileTool {
    async fn call(&self, _ctx: ToolContext, args: Arguments) -> Result<ToolOutput> {
        let args: DeleteArgs = serde_json::from_value(args.into())
            .context("Invalid arguments for delete_file")?;
        let path = self.root.resolve(&args.path)?;
        if path == self.root.path() {
            bail!("Refusing to delete the tool root");
        }

        let meta = tokio::fs::symlink_metadata(&path)
            .await
            .with_context(|| format!("Path does not exist: {}", args.path))?;

        let kind = if meta.is_dir() {
            let removed = if args.force {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_dir(&path).await
            };
            removed.with_context(|| {
                format!(
                    "Failed to delete directory {} (set force=true if it is not empty)",
                    args.path
                )
            })?;
            "directory"
        } else {
            tokio::fs::remove_file(&path)
                .await
                .with_context(|| format!("Failed to delete {}", args.path))?;
            "file"
        };

        tracing::info!(path = %args.path, kind, "Deleted path");
        Ok(ToolOutput::Json(json!({
            "deleted": self.root.display(&path),
            "type": kind,
        })))
    }
}

#[derive(Debug, Deserialize)]
struct CreateDirArgs {
    path: String,
    parents: bool,
    exist_ok: bool,
}

/// Tool to create directories under the root.
pub struct CreateDirectoryTool {
    root: FsRoot,
}

impl CreateDirectoryTool {
    pub fn new(root: FsRoot) -> Self {
        Self { root }
    }
}

#[async_trait::async_trait]
impl Tool for CreateDirectoryTool {
    async fn call(&self, _ctx: ToolContext, args: Arguments) -> Result<ToolOutput> {
        let args: CreateDirArgs = serde_json::from_value(args.into())
            .context("Invalid arguments for create_directory")?;
        let path = self.root.resolve(&args.path)?;

        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if !meta.is_dir() {
                bail!("A file already exists at {}", args.path);
            }
            if !args.exist_ok {
                bail!("Directory already exists: {}", args.path);
            }
            return Ok(ToolOutput::Json(json!({
                "path": self.root.display(&path),
                "created": false,
            })));
        }

        let created = if args.parents {
            tokio::fs::create_dir_all(&path).await
        } else {
            tokio::fs::create_dir(&path).await
        };
        created.with_context(|| format!("Failed to create directory {}", args.path))?;

        Ok(ToolOutput::Json(json!({
            "path": self.root.display(&path),
            "created": true,
        })))
    }
}

/// Synchronous existence check; registered as a blocking handler.
pub fn file_exists(root: &FsRoot, args: Arguments) -> Result<ToolOutput> {
    let args: InfoArgs = serde_json::from_value(args.into())
        .context("Invalid arguments for file_exists")?;
    let path = root.resolve(&args.path)?;
    let meta = std::fs::metadata(&path).ok();

    Ok(ToolOutput::Json(json!({
        "path": root.display(&path),
        "exists": meta.is_some(),
        "is_file": meta.as_ref().map(|m| m.is_file()),
        "is_directory": meta.as_ref().map(|m| m.is_dir()),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::ExecutionLimits;
    use tempfile::TempDir;

    fn ctx() -> ToolContext {
        ToolContext::new("fs", &ExecutionLimits::default())
    }

    fn args(value: serde_json::Value) -> Arguments {
        value.as_object().cloned().unwrap()
    }

    fn fixture() -> (TempDir, FsRoot) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::write(dir.path().join("README.md"), "# Toolmesh\n").unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        std::fs::write(dir.path().join("src/nested/lib.rs"), "").unwrap();
        std::fs::write(dir.path().join(".env"), "TOKEN=1").unwrap();
        let root = FsRoot::new(dir.path()).unwrap();
        (dir, root)
    }

    #[test]
    fn test_resolve_rejects_escapes_and_secrets() {
        let (_dir, root) = fixture();
        assert!(root.resolve("README.md").is_ok());
        assert!(root.resolve("src/new_file.rs").is_ok());
        assert!(root.resolve("../outside.txt").is_err());
        assert!(root.resolve("/etc/passwd").is_err());
        assert!(root.resolve(".env").is_err());
        assert!(root.resolve("config/credentials.json").is_err());
        assert!(root.resolve("keys/server.pem").is_err());
        assert!(root.resolve(".git/config").is_err());
    }

    #[tokio::test]
    async fn test_read_file() {
        let (_dir, root) = fixture();
        let tool = ReadFileTool::new(root);
        let output = tool
            .call(ctx(), args(json!({"path": "README.md", "max_bytes": 1024})))
            .await
            .unwrap();
        assert_eq!(output, ToolOutput::text("# Toolmesh\n"));

        let err = tool
            .call(ctx(), args(json!({"path": "missing.txt", "max_bytes": 1024})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("File not found"));

        let err = tool
            .call(ctx(), args(json!({"path": "README.md", "max_bytes": 2})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[tokio::test]
    async fn test_write_file_respects_overwrite() {
        let (dir, root) = fixture();
        let tool = WriteFileTool::new(root);

        let output = tool
            .call(
                ctx(),
                args(json!({
                    "path": "out/notes.txt",
                    "content": "hello",
                    "create_dirs": true,
                    "overwrite": false
                })),
            )
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out/notes.txt")).unwrap(),
            "hello"
        );
        match output {
            ToolOutput::Json(value) => {
                assert_eq!(value["written_bytes"], json!(5));
                assert_eq!(value["created"], json!(true));
            }
            other => panic!("unexpected output {other:?}"),
        }

        let err = tool
            .call(
                ctx(),
                args(json!({
                    "path": "out/notes.txt",
                    "content": "again",
                    "create_dirs": false,
                    "overwrite": false
                })),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_list_directory() {
        let (_dir, root) = fixture();

        let shallow = list_directory(
            &root,
            args(json!({"path": ".", "recursive": false, "include_hidden": false})),
        )
        .unwrap();
        let ToolOutput::Json(shallow) = shallow else {
            panic!("expected json output");
        };
        let names: Vec<&str> = shallow["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["README.md", "src"]);

        let deep = list_directory(
            &root,
            args(json!({
                "path": "src",
                "recursive": true,
                "include_hidden": true,
                "pattern": "*.rs"
            })),
        )
        .unwrap();
        let ToolOutput::Json(deep) = deep else {
            panic!("expected json output");
        };
        assert_eq!(deep["count"], json!(2));
    }

    #[test]
    fn test_hidden_secrets_never_listed() {
        let (_dir, root) = fixture();
        let output = list_directory(
            &root,
            args(json!({"path": ".", "recursive": false, "include_hidden": true})),
        )
        .unwrap();
        let ToolOutput::Json(value) = output else {
            panic!("expected json output");
        };
        assert!(value["entries"]
            .as_array()
            .unwrap()
            .iter()
            .all(|e| e["name"] != json!(".env")));
    }

    #[tokio::test]
    async fn test_file_info() {
        let (_dir, root) = fixture();
        let tool = FileInfoTool::new(root);
        let ToolOutput::Json(info) = tool
            .call(ctx(), args(json!({"path": "src/main.rs"})))
            .await
            .unwrap()
        else {
            panic!("expected json output");
        };
        assert_eq!(info["type"], json!("file"));
        assert_eq!(info["extension"], json!("rs"));
        assert_eq!(info["size"], json!(13));
    }
    #[tokio::test]
    async fn test_delete_file_and_directories() {
        let (dir, root) = fixture();
        let tool = DeleteFileTool::new(root);

        let output = tool
            .call(ctx(), args(json!({"path": "README.md", "force": false})))
            .await
            .unwrap();
        assert_eq!(
            output,
            ToolOutput::Json(json!({"deleted": "README.md", "type": "file"}))
        );
        assert!(!dir.path().join("README.md").exists());

        let err = tool
            .call(ctx(), args(json!({"path": "src", "force": false})))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("force=true"));
        assert!(dir.path().join("src/main.rs").exists());

        tool.call(ctx(), args(json!({"path": "src", "force": true})))
            .await
            .unwrap();
        assert!(!dir.path().join("src").exists());

        assert!(tool
            .call(ctx(), args(json!({"path": ".", "force": true})))
            .await
            .is_err());
        assert!(tool
            .call(ctx(), args(json!({"path": "missing.txt", "force": false})))
            .await
            .is_err());
        assert!(tool
            .call(ctx(), args(json!({"path": ".env", "force": false})))
            .await
            .is_err());
        assert!(dir.path().join(".env").exists());
    }

    #[tokio::test]
    async fn test_create_directory() {
        let (dir, root) = fixture();
        let tool = CreateDirectoryTool::new(root);

        let output = tool
            .call(
                ctx(),
                args(json!({"path": "a/b/c", "parents": true, "exist_ok": true})),
            )
            .await
            .unwrap();
        let ToolOutput::Json(output) = output else {
            panic!("expected json output");
        };
        assert_eq!(output["created"], json!(true));
        assert!(dir.path().join("a/b/c").is_dir());

        let ToolOutput::Json(again) = tool
            .call(
                ctx(),
                args(json!({"path": "a/b/c", "parents": true, "exist_ok": true})),
            )
            .await
            .unwrap()
        else {
            panic!("expected json output");
        };
        assert_eq!(again["created"], json!(false));

        assert!(tool
            .call(
                ctx(),
                args(json!({"path": "a/b/c", "parents": true, "exist_ok": false})),
            )
            .await
            .is_err());
        assert!(tool
            .call(
                ctx(),
                args(json!({"path": "x/y", "parents": false, "exist_ok": true})),
            )
            .await
            .is_err());
        assert!(tool
            .call(
                ctx(),
                args(json!({"path": "README.md", "parents": true, "exist_ok": true})),
            )
            .await
            .is_err());
    }

    #[test]
    fn test_file_exists() {
        let (_dir, root) = fixture();

        let ToolOutput::Json(file) = file_exists(&root, args(json!({"path": "src/main.rs"}))).unwrap()
        else {
            panic!("expected json output");
        };
        assert_eq!(file["exists"], json!(true));
        assert_eq!(file["is_file"], json!(true));
        assert_eq!(file["is_directory"], json!(false));

        let ToolOutput::Json(missing) = file_exists(&root, args(json!({"path": "nope.txt"}))).unwrap()
        else {
            panic!("expected json output");
        };
        assert_eq!(missing["exists"], json!(false));
        assert_eq!(missing["is_file"], json!(null));

        assert!(file_exists(&root, args(json!({"path": "../escape"}))).is_err());
    }
}
