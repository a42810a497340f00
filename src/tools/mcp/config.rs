// How to launch the MCP tool server as a child process

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Command line for a STDIO MCP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Command to execute
    pub command: String,

    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables (the parent environment is inherited)
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl McpServerConfig {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: HashMap::new(),
        }
    }

    /// Re-run the current executable with `serve`
    pub fn current_exe_serve() -> anyhow::Result<Self> {
        let exe = std::env::current_exe()?;
        Ok(Self::new(exe.to_string_lossy(), vec!["serve".to_string()]))
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.command.trim().is_empty() {
            anyhow::bail!("MCP server command must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let config = McpServerConfig::new("aas-query", vec!["serve".to_string()]);
        assert!(config.validate().is_ok());

        let config = McpServerConfig::new("  ", vec![]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_current_exe_serve() {
        let config = McpServerConfig::current_exe_serve().unwrap();
        assert_eq!(config.args, vec!["serve".to_string()]);
        assert!(!config.command.is_empty());
    }
}
