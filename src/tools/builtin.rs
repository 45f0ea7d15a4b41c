//! Builtin tools: the minimal file/command surface an agent needs to
//! make a code change inside its worktree.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

use super::{Tool, ToolContext, ToolResult};

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read"
    }

    fn description(&self) -> &'static str {
        "Read the contents of a file in the worktree."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(path) = input.get("path").and_then(Value::as_str) else {
            return ToolResult::error("missing required argument 'path'");
        };

        let resolved = match ctx.validate_path(std::path::Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => {
                ctx.track_read(std::path::Path::new(path)).await;
                ToolResult::success(content)
            }
            Err(e) => ToolResult::error(format!("failed to read {path}: {e}")),
        }
    }
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write"
    }

    fn description(&self) -> &'static str {
        "Write content to a file in the worktree, creating parent directories as needed."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "content": { "type": "string" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(path) = input.get("path").and_then(Value::as_str) else {
            return ToolResult::error("missing required argument 'path'");
        };
        let Some(content) = input.get("content").and_then(Value::as_str) else {
            return ToolResult::error("missing required argument 'content'");
        };

        let resolved = match ctx.validate_path(std::path::Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if let Some(parent) = resolved.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::error(format!("failed to create parent dirs for {path}: {e}"));
            }
        }

        match tokio::fs::write(&resolved, content).await {
            Ok(()) => ToolResult::success(format!("wrote {} bytes to {path}", content.len())),
            Err(e) => ToolResult::error(format!("failed to write {path}: {e}")),
        }
    }
}

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &'static str {
        "edit"
    }

    fn description(&self) -> &'static str {
        "Replace an exact, unique string occurrence in a file that has already been read this iteration."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "old_string": { "type": "string" },
                "new_string": { "type": "string" },
                "replace_all": { "type": "boolean" }
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(path) = input.get("path").and_then(Value::as_str) else {
            return ToolResult::error("missing required argument 'path'");
        };
        let Some(old_string) = input.get("old_string").and_then(Value::as_str) else {
            return ToolResult::error("missing required argument 'old_string'");
        };
        let Some(new_string) = input.get("new_string").and_then(Value::as_str) else {
            return ToolResult::error("missing required argument 'new_string'");
        };
        let replace_all = input.get("replace_all").and_then(Value::as_bool).unwrap_or(false);

        if !ctx.was_read(std::path::Path::new(path)).await {
            return ToolResult::error(format!("must read {path} before editing it"));
        }

        let resolved = match ctx.validate_path(std::path::Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let content = match tokio::fs::read_to_string(&resolved).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("failed to read {path}: {e}")),
        };

        let occurrences = content.matches(old_string).count();
        if occurrences == 0 {
            return ToolResult::error(format!("pattern not found in {path}"));
        }
        if occurrences > 1 && !replace_all {
            return ToolResult::error(format!(
                "pattern found {occurrences} times in {path}, expected 1 (pass replace_all=true for multiple)"
            ));
        }

        let updated = content.replacen(old_string, new_string, if replace_all { occurrences } else { 1 });

        match tokio::fs::write(&resolved, updated).await {
            Ok(()) => ToolResult::success(format!("applied {occurrences} replacement(s) to {path}")),
            Err(e) => ToolResult::error(format!("failed to write {path}: {e}")),
        }
    }
}

pub struct ListDirectoryTool;

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &'static str {
        "list"
    }

    fn description(&self) -> &'static str {
        "List entries in a directory within the worktree."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let path = input.get("path").and_then(Value::as_str).unwrap_or(".");

        let resolved = match ctx.validate_path(std::path::Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let mut entries = match tokio::fs::read_dir(&resolved).await {
            Ok(e) => e,
            Err(e) => return ToolResult::error(format!("failed to list {path}: {e}")),
        };

        let mut names = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => names.push(entry.file_name().to_string_lossy().to_string()),
                Ok(None) => break,
                Err(e) => return ToolResult::error(format!("failed to list {path}: {e}")),
            }
        }
        names.sort();
        ToolResult::success(names.join("\n"))
    }
}

pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &'static str {
        "glob"
    }

    fn description(&self) -> &'static str {
        "Find files in the worktree matching a glob pattern."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "pattern": { "type": "string" } },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(pattern) = input.get("pattern").and_then(Value::as_str) else {
            return ToolResult::error("missing required argument 'pattern'");
        };

        let full_pattern = ctx.worktree.join(pattern);
        let matches: Vec<String> = match glob::glob(&full_pattern.to_string_lossy()) {
            Ok(paths) => paths
                .filter_map(Result::ok)
                .map(|p| p.to_string_lossy().to_string())
                .collect(),
            Err(e) => return ToolResult::error(format!("invalid glob pattern: {e}")),
        };

        ToolResult::success(matches.join("\n"))
    }
}

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &'static str {
        "grep"
    }

    fn description(&self) -> &'static str {
        "Search file contents in the worktree for a regular expression."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string" },
                "path": { "type": "string" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(pattern) = input.get("pattern").and_then(Value::as_str) else {
            return ToolResult::error("missing required argument 'pattern'");
        };
        let path = input.get("path").and_then(Value::as_str).unwrap_or(".");

        let re = match regex::Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => return ToolResult::error(format!("invalid pattern: {e}")),
        };

        let resolved = match ctx.validate_path(std::path::Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let mut matches = Vec::new();
        Self::walk(&resolved, &re, &mut matches).await;
        ToolResult::success(matches.join("\n"))
    }
}

impl GrepTool {
    fn walk<'a>(
        dir: &'a std::path::Path,
        re: &'a regex::Regex,
        out: &'a mut Vec<String>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + 'a>> {
        Box::pin(async move {
            if dir.is_file() {
                if let Ok(content) = tokio::fs::read_to_string(dir).await {
                    for (i, line) in content.lines().enumerate() {
                        if re.is_match(line) {
                            out.push(format!("{}:{}:{}", dir.display(), i + 1, line));
                        }
                    }
                }
                return;
            }

            let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
                return;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if path.is_dir() {
                    if path.file_name().map(|n| n == ".git").unwrap_or(false) {
                        continue;
                    }
                    Self::walk(&path, re, out).await;
                } else {
                    Self::walk(&path, re, out).await;
                }
            }
        })
    }
}

pub struct RunCommandTool;

const DEFAULT_TIMEOUT_MS: u64 = 120_000;

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &'static str {
        "bash"
    }

    fn description(&self) -> &'static str {
        "Run a shell command inside the worktree and capture its output."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string" },
                "timeout_ms": { "type": "integer" }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(command) = input.get("command").and_then(Value::as_str) else {
            return ToolResult::error("missing required argument 'command'");
        };
        let timeout_ms = input
            .get("timeout_ms")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        let mut child = match Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&ctx.worktree)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("failed to spawn command: {e}")),
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(mut out) = child.stdout.take() {
            let _ = out.read_to_string(&mut stdout).await;
        }
        if let Some(mut err) = child.stderr.take() {
            let _ = err.read_to_string(&mut stderr).await;
        }

        match timeout(Duration::from_millis(timeout_ms), child.wait()).await {
            Ok(Ok(status)) => {
                let combined = format!("{stdout}{stderr}");
                if status.success() {
                    ToolResult::success(combined)
                } else {
                    ToolResult::error(combined)
                }
            }
            Ok(Err(e)) => ToolResult::error(format!("command failed to complete: {e}")),
            Err(_) => ToolResult::error(format!("command timed out after {timeout_ms}ms")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ctx(worktree: std::path::PathBuf) -> ToolContext {
        ToolContext::new(worktree, "test-exec".to_string())
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let c = ctx(dir.path().to_path_buf());

        let write = WriteFileTool
            .execute(json!({"path": "a.txt", "content": "hello"}), &c)
            .await;
        assert!(!write.is_error);

        let read = ReadFileTool.execute(json!({"path": "a.txt"}), &c).await;
        assert_eq!(read.content, "hello");
    }

    #[tokio::test]
    async fn edit_requires_prior_read() {
        let dir = tempdir().unwrap();
        let c = ctx(dir.path().to_path_buf());
        WriteFileTool.execute(json!({"path": "a.txt", "content": "hello"}), &c).await;

        let edit = EditFileTool
            .execute(json!({"path": "a.txt", "old_string": "hello", "new_string": "bye"}), &c)
            .await;
        assert!(edit.is_error);
    }

    #[tokio::test]
    async fn edit_replaces_unique_occurrence() {
        let dir = tempdir().unwrap();
        let c = ctx(dir.path().to_path_buf());
        WriteFileTool.execute(json!({"path": "a.txt", "content": "hello world"}), &c).await;
        ReadFileTool.execute(json!({"path": "a.txt"}), &c).await;

        let edit = EditFileTool
            .execute(json!({"path": "a.txt", "old_string": "hello", "new_string": "bye"}), &c)
            .await;
        assert!(!edit.is_error);

        let read = ReadFileTool.execute(json!({"path": "a.txt"}), &c).await;
        assert_eq!(read.content, "bye world");
    }

    #[tokio::test]
    async fn edit_rejects_ambiguous_pattern_without_replace_all() {
        let dir = tempdir().unwrap();
        let c = ctx(dir.path().to_path_buf());
        WriteFileTool.execute(json!({"path": "a.txt", "content": "a a a"}), &c).await;
        ReadFileTool.execute(json!({"path": "a.txt"}), &c).await;

        let edit = EditFileTool
            .execute(json!({"path": "a.txt", "old_string": "a", "new_string": "b"}), &c)
            .await;
        assert!(edit.is_error);
    }

    #[tokio::test]
    async fn list_directory_sorts_entries() {
        let dir = tempdir().unwrap();
        let c = ctx(dir.path().to_path_buf());
        WriteFileTool.execute(json!({"path": "b.txt", "content": ""}), &c).await;
        WriteFileTool.execute(json!({"path": "a.txt", "content": ""}), &c).await;

        let listing = ListDirectoryTool.execute(json!({"path": "."}), &c).await;
        assert_eq!(listing.content, "a.txt\nb.txt");
    }

    #[tokio::test]
    async fn grep_finds_matching_lines() {
        let dir = tempdir().unwrap();
        let c = ctx(dir.path().to_path_buf());
        WriteFileTool
            .execute(json!({"path": "a.txt", "content": "fn main() {}\nfn helper() {}"}), &c)
            .await;

        let result = GrepTool.execute(json!({"pattern": "fn main"}), &c).await;
        assert!(result.content.contains("fn main"));
    }

    #[tokio::test]
    async fn bash_runs_command_in_worktree() {
        let dir = tempdir().unwrap();
        let c = ctx(dir.path().to_path_buf());
        let result = RunCommandTool.execute(json!({"command": "echo hi"}), &c).await;
        assert!(result.content.contains("hi"));
    }

    #[tokio::test]
    async fn read_refuses_to_escape_worktree() {
        let dir = tempdir().unwrap();
        let c = ctx(dir.path().to_path_buf());
        let result = ReadFileTool.execute(json!({"path": "/etc/passwd"}), &c).await;
        assert!(result.is_error);
    }
}
