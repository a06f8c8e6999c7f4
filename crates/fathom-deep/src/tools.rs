//! Built-in filesystem tools: thin translators over the [`Backend`]
//! contract.
//!
//! Backend failures are reported to the model as `{error_kind, message}`
//! payloads rather than run-level errors, so the agent can react and
//! continue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fathom_core::{error_payload, AnyTool, FathomError, Tool};
use serde_json::{json, Value};

use crate::backend::{Backend, FsError, GrepOptions};
use crate::pathutil;

const DEFAULT_READ_LIMIT: usize = 2000;
const EMPTY_CONTENT_WARNING: &str = "System reminder: file exists but has empty contents";

/// Create the built-in filesystem tools for a backend.
///
/// Returns `ls`, `read_file`, `write_file`, `edit_file`, `glob`, and
/// `grep`, plus `execute` when the backend advertises the capability.
pub fn create_filesystem_tools(backend: Arc<dyn Backend>) -> Vec<AnyTool> {
    let mut tools: Vec<AnyTool> = vec![
        AnyTool::Simple(Arc::new(LsTool {
            backend: backend.clone(),
        })),
        AnyTool::Simple(Arc::new(ReadFileTool {
            backend: backend.clone(),
        })),
        AnyTool::Simple(Arc::new(WriteFileTool {
            backend: backend.clone(),
        })),
        AnyTool::Simple(Arc::new(EditFileTool {
            backend: backend.clone(),
        })),
        AnyTool::Simple(Arc::new(GlobTool {
            backend: backend.clone(),
        })),
        AnyTool::Simple(Arc::new(GrepTool {
            backend: backend.clone(),
        })),
    ];
    if backend.supports_execution() {
        tools.push(AnyTool::Simple(Arc::new(ExecuteTool { backend })));
    }
    tools
}

fn str_arg(args: &Value, name: &str) -> Result<String, FathomError> {
    args.get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| FathomError::BadArguments(format!("missing '{name}' parameter")))
}

fn opt_str_arg(args: &Value, name: &str) -> Option<String> {
    args.get(name).and_then(Value::as_str).map(str::to_string)
}

/// Surface a backend failure as a structured payload the model can read.
fn fs_err(e: FsError) -> Value {
    error_payload(e.kind(), &e.to_string())
}

struct LsTool {
    backend: Arc<dyn Backend>,
}

#[async_trait]
impl Tool for LsTool {
    fn name(&self) -> &'static str {
        "ls"
    }

    fn description(&self) -> &'static str {
        "List the files in a directory. The path must be absolute."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Absolute directory path to list"}
            },
            "required": ["path"]
        }))
    }

    async fn call(&self, args: Value) -> Result<Value, FathomError> {
        let path = str_arg(&args, "path")?;
        match self.backend.ls_info(&path).await {
            Ok(entries) => serde_json::to_value(entries)
                .map_err(|e| FathomError::Tool(format!("serialization: {e}"))),
            Err(e) => Ok(fs_err(e)),
        }
    }
}

struct ReadFileTool {
    backend: Arc<dyn Backend>,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read a file with optional line-based pagination. Output uses cat -n \
         formatting with 1-based line numbers; lines longer than 2000 \
         characters are truncated."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Absolute file path to read"},
                "offset": {"type": "integer", "description": "Starting line (0-based, default 0)"},
                "limit": {"type": "integer", "description": "Maximum lines to read (default 2000)"}
            },
            "required": ["path"]
        }))
    }

    async fn call(&self, args: Value) -> Result<Value, FathomError> {
        let path = str_arg(&args, "path")?;
        let offset = args.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize;
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_READ_LIMIT as u64) as usize;

        let content = match self.backend.read(&path, 0, None).await {
            Ok(content) => content,
            Err(e) => return Ok(fs_err(e)),
        };
        if content.is_empty() {
            return Ok(Value::String(EMPTY_CONTENT_WARNING.to_string()));
        }
        let lines = pathutil::slice_lines(&content, offset, limit);
        Ok(Value::String(pathutil::format_with_line_numbers(
            &lines, offset,
        )))
    }
}

struct WriteFileTool {
    backend: Arc<dyn Backend>,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Create or overwrite a file with the given content. The path must be absolute."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Absolute file path to write"},
                "content": {"type": "string", "description": "Content to write"}
            },
            "required": ["path", "content"]
        }))
    }

    async fn call(&self, args: Value) -> Result<Value, FathomError> {
        let path = str_arg(&args, "path")?;
        let content = str_arg(&args, "content")?;
        match self.backend.write(&path, &content).await {
            Ok(()) => Ok(Value::String("ok".to_string())),
            Err(e) => Ok(fs_err(e)),
        }
    }
}

struct EditFileTool {
    backend: Arc<dyn Backend>,
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &'static str {
        "edit_file"
    }

    fn description(&self) -> &'static str {
        "Perform an exact string replacement in a file. Fails if old_string \
         is absent, or ambiguous without replace_all."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Absolute file path to edit"},
                "old_string": {"type": "string", "description": "Text to find"},
                "new_string": {"type": "string", "description": "Replacement text"},
                "replace_all": {"type": "boolean", "description": "Replace every occurrence (default false)"}
            },
            "required": ["path", "old_string", "new_string"]
        }))
    }

    async fn call(&self, args: Value) -> Result<Value, FathomError> {
        let path = str_arg(&args, "path")?;
        let old = str_arg(&args, "old_string")?;
        let new = str_arg(&args, "new_string")?;
        let replace_all = args
            .get("replace_all")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        match self.backend.edit(&path, &old, &new, replace_all).await {
            Ok(count) => Ok(json!(count)),
            Err(e) => Ok(fs_err(e)),
        }
    }
}

struct GlobTool {
    backend: Arc<dyn Backend>,
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &'static str {
        "glob"
    }

    fn description(&self) -> &'static str {
        "Find files matching a glob pattern (`*`, `**`, `?`). Returns sorted absolute paths."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Glob pattern, e.g. **/*.rs"},
                "path": {"type": "string", "description": "Directory to search under (default /)"}
            },
            "required": ["pattern"]
        }))
    }

    async fn call(&self, args: Value) -> Result<Value, FathomError> {
        let pattern = str_arg(&args, "pattern")?;
        let root = opt_str_arg(&args, "path").unwrap_or_else(|| "/".to_string());
        match self.backend.glob(&pattern, &root).await {
            Ok(matches) => Ok(json!(matches)),
            Err(e) => Ok(fs_err(e)),
        }
    }
}

struct GrepTool {
    backend: Arc<dyn Backend>,
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &'static str {
        "grep"
    }

    fn description(&self) -> &'static str {
        "Search file contents with a regular expression. Hits are returned \
         as path:line:text, ordered by path then line number."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Regex pattern to search for"},
                "path": {"type": "string", "description": "Directory to search under (default /)"},
                "include": {"type": "string", "description": "Glob filter on file names, e.g. *.rs"},
                "-i": {"type": "boolean", "description": "Case-insensitive search"}
            },
            "required": ["pattern"]
        }))
    }

    async fn call(&self, args: Value) -> Result<Value, FathomError> {
        let pattern = str_arg(&args, "pattern")?;
        let root = opt_str_arg(&args, "path").unwrap_or_else(|| "/".to_string());
        let options = GrepOptions {
            include: opt_str_arg(&args, "include"),
            case_insensitive: args.get("-i").and_then(Value::as_bool).unwrap_or(false),
            max_hits: None,
        };
        match self.backend.grep(&pattern, &root, options).await {
            Ok(hits) => {
                let rendered = hits
                    .iter()
                    .map(|h| format!("{}:{}:{}", h.path, h.line_no, h.line))
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(Value::String(rendered))
            }
            Err(e) => Ok(fs_err(e)),
        }
    }
}

struct ExecuteTool {
    backend: Arc<dyn Backend>,
}

#[async_trait]
impl Tool for ExecuteTool {
    fn name(&self) -> &'static str {
        "execute"
    }

    fn description(&self) -> &'static str {
        "Run a shell command in the backend's sandbox. Returns stdout, stderr, and the exit code."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "Shell command to run"},
                "cwd": {"type": "string", "description": "Working directory (absolute, default /)"},
                "timeout": {"type": "integer", "description": "Timeout in seconds"}
            },
            "required": ["command"]
        }))
    }

    async fn call(&self, args: Value) -> Result<Value, FathomError> {
        let command = str_arg(&args, "command")?;
        let cwd = opt_str_arg(&args, "cwd");
        let timeout = args
            .get("timeout")
            .and_then(Value::as_u64)
            .map(Duration::from_secs);
        match self
            .backend
            .execute(&command, cwd.as_deref(), timeout)
            .await
        {
            Ok(result) => Ok(json!({
                "stdout": result.stdout,
                "stderr": result.stderr,
                "exit_code": result.exit_code,
            })),
            Err(e) => Ok(fs_err(e)),
        }
    }
}
