//! Built-in tools: shell execution and file reads.

use async_trait::async_trait;
use tokio::process::Command;

use super::{JsonMap, Observation, Tool, ToolError, ToolErrorKind};
use crate::utils::truncate_with_marker;

const MAX_CAPTURE_BYTES: usize = 64 * 1024;

/// Runs a command through `sh -c` and captures exit code, stdout and stderr.
pub struct ShellTool;

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "execute a shell command and capture its output and exit code"
    }

    fn invocation_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": { "type": "string" }
            },
            "required": ["command"]
        })
    }

    async fn invoke(&self, args: &JsonMap) -> Result<Observation, ToolError> {
        let command = args.get("command").and_then(|v| v.as_str()).ok_or_else(|| {
            ToolError::new("shell", ToolErrorKind::RuntimeError, "missing 'command' arg")
        })?;

        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|e| ToolError::new("shell", ToolErrorKind::RuntimeError, e.to_string()))?;

        let mut content = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.stderr.is_empty() {
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str(&String::from_utf8_lossy(&output.stderr));
        }

        Ok(Observation::new("shell", truncate_with_marker(&content, MAX_CAPTURE_BYTES))
            .with_exit_code(output.status.code().unwrap_or(-1)))
    }

    async fn probe(&self) -> bool {
        Command::new("sh")
            .arg("-c")
            .arg("true")
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// Reads a file and returns its contents as the observation body.
pub struct FileReadTool;

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "read a file from disk and return its contents"
    }

    fn invocation_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" }
            },
            "required": ["path"]
        })
    }

    async fn invoke(&self, args: &JsonMap) -> Result<Observation, ToolError> {
        let path = args.get("path").and_then(|v| v.as_str()).ok_or_else(|| {
            ToolError::new("read_file", ToolErrorKind::RuntimeError, "missing 'path' arg")
        })?;

        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                Ok(Observation::new("read_file", truncate_with_marker(&content, MAX_CAPTURE_BYTES))
                    .with_exit_code(0))
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Err(ToolError::new(
                "read_file",
                ToolErrorKind::Unauthorized,
                format!("{}: permission denied", path),
            )),
            Err(e) => Err(ToolError::new(
                "read_file",
                ToolErrorKind::RuntimeError,
                format!("{}: {}", path, e),
            )),
        }
    }
}
