// Configuration loader
// Loads ~/.aas-query/config.toml (optional), then applies environment variables.
// `main` merges a .env file from the working directory into the environment
// before the async runtime starts.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::settings::Config;
use crate::errors::QueryError;

/// Load configuration from the config file and environment
pub fn load_config() -> Result<Config> {
    let mut config = match default_config_path() {
        Some(path) => load_config_file(&path)?.unwrap_or_default(),
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    Ok(config)
}

/// ~/.aas-query/config.toml
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".aas-query").join("config.toml"))
}

/// Parse a TOML config file. Returns Ok(None) when the file does not exist.
pub fn load_config_file(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;

    tracing::debug!("Loaded config file {}", path.display());
    Ok(Some(config))
}

/// Merge `KEY=VALUE` lines from a dotenv file into the process environment.
///
/// Variables that are already set win. Returns how many were applied.
/// Mutates the environment, so call it while the process is single-threaded.
pub fn load_dotenv(path: &Path) -> Result<usize> {
    let pending = dotenv_assignments(path, |key| std::env::var_os(key).is_some())?;
    for (key, value) in &pending {
        std::env::set_var(key, value);
    }
    Ok(pending.len())
}

/// The dotenv entries that `load_dotenv` would apply, given which keys are set
pub fn dotenv_assignments<F>(path: &Path, is_set: F) -> Result<Vec<(String, String)>>
where
    F: Fn(&str) -> bool,
{
    if !path.exists() {
        return Ok(Vec::new());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    Ok(parse_dotenv(&contents)
        .into_iter()
        .filter(|(key, _)| !is_set(key))
        .collect())
}

/// Parse dotenv text: blank lines and `#` comments are skipped, optional
/// `export ` prefix and matching surrounding quotes are stripped.
pub fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unquote(value.trim()).to_string()))
        })
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Apply environment variables on top of file settings.
///
/// `lookup` abstracts `std::env::var` so tests don't touch the process environment.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), QueryError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(url) = get("AZURE_FUNCTION_URL") {
        config.backend.function_url = Some(url);
    }
    if let Some(secs) = get("AZURE_FUNCTION_TIMEOUT_SECS") {
        config.backend.timeout_secs = parse_number("AZURE_FUNCTION_TIMEOUT_SECS", &secs)?;
    }
    if let Some(key) = get("AZURE_OPENAI_API_KEY") {
        config.llm.api_key = Some(key);
    }
    if let Some(endpoint) = get("AZURE_OPENAI_ENDPOINT") {
        config.llm.endpoint = Some(endpoint);
    }
    if let Some(deployment) = get("AZURE_OPENAI_DEPLOYMENT") {
        config.llm.deployment = deployment;
    }
    if let Some(version) = get("AZURE_OPENAI_API_VERSION") {
        config.llm.api_version = version;
    }
    if let Some(rounds) = get("AAS_AGENT_MAX_TOOL_ROUNDS") {
        config.agent.max_tool_rounds = parse_number("AAS_AGENT_MAX_TOOL_ROUNDS", &rounds)?;
    }
    if let Some(chars) = get("AAS_AGENT_MAX_RESULT_CHARS") {
        config.agent.max_tool_result_chars = parse_number("AAS_AGENT_MAX_RESULT_CHARS", &chars)?;
    }

    Ok(())
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, QueryError> {
    value.trim().parse().map_err(|_| {
        QueryError::StartupConfiguration(format!("{} must be a number, got '{}'", name, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_dotenv() {
        let parsed = parse_dotenv(
            "# comment\n\nAZURE_OPENAI_API_KEY = abc\nexport AZURE_OPENAI_ENDPOINT=\"https://x\"\nnot a pair\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("AZURE_OPENAI_API_KEY".to_string(), "abc".to_string()),
                ("AZURE_OPENAI_ENDPOINT".to_string(), "https://x".to_string()),
            ]
        );
    }

    #[test]
    fn test_dotenv_never_overrides_set_variables() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "AZURE_FUNCTION_URL=http://from-dotenv\nAZURE_OPENAI_API_KEY=from-dotenv\n"
        )
        .unwrap();

        let pending =
            dotenv_assignments(file.path(), |key| key == "AZURE_OPENAI_API_KEY").unwrap();
        assert_eq!(
            pending,
            vec![(
                "AZURE_FUNCTION_URL".to_string(),
                "http://from-dotenv".to_string()
            )]
        );

        let dir = tempfile::tempdir().unwrap();
        assert!(dotenv_assignments(&dir.path().join(".env"), |_| false)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config::default();
        config.backend.function_url = Some("http://from-file".into());

        let vars = env(&[
            ("AZURE_FUNCTION_URL", "http://from-env/api/query"),
            ("AZURE_FUNCTION_TIMEOUT_SECS", "5"),
            ("AZURE_OPENAI_DEPLOYMENT", "gpt-4o-mini"),
            ("AAS_AGENT_MAX_TOOL_ROUNDS", "3"),
        ]);
        apply_env_overrides(&mut config, |k| vars.get(k).cloned()).unwrap();

        assert_eq!(
            config.backend.function_url.as_deref(),
            Some("http://from-env/api/query")
        );
        assert_eq!(config.backend.timeout_secs, 5);
        assert_eq!(config.llm.deployment, "gpt-4o-mini");
        assert_eq!(config.agent.max_tool_rounds, 3);
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = Config::default();
        let vars = env(&[("AZURE_OPENAI_API_KEY", "  ")]);
        apply_env_overrides(&mut config, |k| vars.get(k).cloned()).unwrap();
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn test_bad_number_is_startup_error() {
        let mut config = Config::default();
        let vars = env(&[("AZURE_FUNCTION_TIMEOUT_SECS", "soon")]);
        let err = apply_env_overrides(&mut config, |k| vars.get(k).cloned()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[backend]\nfunction_url = \"http://localhost:7071/api/query\"\n\n[agent]\nmax_tool_result_chars = 1000\n"
        )
        .unwrap();

        let config = load_config_file(file.path()).unwrap().unwrap();
        assert_eq!(
            config.backend.function_url.as_deref(),
            Some("http://localhost:7071/api/query")
        );
        assert_eq!(config.backend.timeout_secs, 60);
        assert_eq!(config.agent.max_tool_result_chars, 1000);
    }

    #[test]
    fn test_missing_config_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config_file(&dir.path().join("nope.toml")).unwrap().is_none());
    }
}
