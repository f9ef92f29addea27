//! Built-in capabilities: reading and writing notes under the memory
//! directory. Paths are relative to that root; absolute paths and `..`
//! are refused.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use vigil_core::{Result, VigilError};

use crate::registry::{Capability, ToolDescriptor};

/// Root-confined file access shared by the memory tools.
#[derive(Debug, Clone)]
pub struct MemoryDir {
    root: PathBuf,
}

impl MemoryDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, tool: &str, relative: &str) -> Result<PathBuf> {
        let path = Path::new(relative);
        let confined = !relative.is_empty()
            && path
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !confined {
            return Err(VigilError::ToolExecution {
                tool: tool.into(),
                reason: format!("path '{relative}' escapes the memory directory"),
            });
        }
        Ok(self.root.join(path))
    }
}

fn str_arg<'a>(tool: &str, args: &'a Value, key: &str) -> Result<&'a str> {
    args[key].as_str().ok_or_else(|| VigilError::ToolExecution {
        tool: tool.into(),
        reason: format!("missing '{key}' argument"),
    })
}

pub struct ReadFile(pub MemoryDir);

#[async_trait]
impl Capability for ReadFile {
    async fn execute(&self, args: &Value) -> Result<String> {
        let rel = str_arg("read_file", args, "path")?;
        let path = self.0.resolve("read_file", rel)?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| VigilError::ToolExecution {
                tool: "read_file".into(),
                reason: format!("reading {rel}: {e}"),
            })?;
        Ok(content.chars().take(50_000).collect())
    }
}

pub struct WriteFile(pub MemoryDir);

#[async_trait]
impl Capability for WriteFile {
    async fn execute(&self, args: &Value) -> Result<String> {
        let rel = str_arg("write_file", args, "path")?;
        let content = str_arg("write_file", args, "content")?;
        let path = self.0.resolve("write_file", rel)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| VigilError::ToolExecution {
                tool: "write_file".into(),
                reason: format!("writing {rel}: {e}"),
            })?;
        info!(path = %rel, bytes = content.len(), "memory file written");
        Ok(format!("Wrote {} bytes to {}", content.len(), rel))
    }
}

/// `read_file` and `write_file`, with approval flags taken from the
/// configured approval list.
pub fn memory_tools(dir: MemoryDir, approval_required: &[String]) -> Vec<ToolDescriptor> {
    let needs = |name: &str| approval_required.iter().any(|n| n == name);
    vec![
        ToolDescriptor::new(
            "read_file",
            "Read a note from the agent's memory directory",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path relative to the memory directory"
                    }
                },
                "required": ["path"]
            }),
            Arc::new(ReadFile(dir.clone())),
        )
        .requiring_approval(needs("read_file")),
        ToolDescriptor::new(
            "write_file",
            "Write (create or overwrite) a note in the agent's memory directory",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path relative to the memory directory"
                    },
                    "content": {
                        "type": "string",
                        "description": "Full file contents"
                    }
                },
                "required": ["path", "content"]
            }),
            Arc::new(WriteFile(dir)),
        )
        .requiring_approval(needs("write_file")),
    ]
}
