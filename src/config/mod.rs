// Configuration module
// Public interface for configuration loading

pub mod constants;
mod loader;
mod settings;

pub use loader::{
    apply_env_overrides, default_config_path, dotenv_assignments, load_config, load_config_file,
    load_dotenv, parse_dotenv,
};
pub use settings::{AgentConfig, BackendConfig, Config, LlmConfig};
