use std::path::PathBuf;

use chrono::Utc;
use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults — the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Directory that timestamped run directories are created under
    /// (overrides the `runs/` default).
    pub runs_root: Option<PathBuf>,
    /// External stage commands.
    pub stages: StagesConfig,
}

/// Commands for the three external pipeline stages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StagesConfig {
    pub clip_analyzer: StageCommand,
    pub music_analyzer: StageCommand,
    pub renderer: StageCommand,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            clip_analyzer: StageCommand::new("clip-analyzer"),
            music_analyzer: StageCommand::new("music-analyzer"),
            renderer: StageCommand::new("montage-render"),
        }
    }
}

/// How to launch one external stage.
#[derive(Debug, Clone, Deserialize)]
pub struct StageCommand {
    /// Argv to launch the stage, program first.
    pub command: Vec<String>,
    /// Working directory the stage runs in.
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
    /// Directories prepended to the stage's module search path.
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
    /// Environment variable the search path is written to.
    #[serde(default = "default_search_path_env")]
    pub search_path_env: String,
}

impl StageCommand {
    pub fn new(program: &str) -> Self {
        Self {
            command: vec![program.to_string()],
            workdir: default_workdir(),
            search_paths: Vec::new(),
            search_path_env: default_search_path_env(),
        }
    }
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".")
}

fn default_search_path_env() -> String {
    "PYTHONPATH".to_string()
}

impl AppConfig {
    /// Load config from `~/.config/supercut/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match config_path {
            Some(path) if path.exists() => {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => {
                        match toml::from_str::<AppConfig>(&contents) {
                            Ok(config) => {
                                log::info!("Loaded config from {}", path.display());
                                config
                            }
                            Err(e) => {
                                log::warn!(
                                    "Failed to parse {}: {}. Using defaults.",
                                    path.display(),
                                    e
                                );
                                Self::default()
                            }
                        }
                    }
                    Err(e) => {
                        log::warn!(
                            "Failed to read {}: {}. Using defaults.",
                            path.display(),
                            e
                        );
                        Self::default()
                    }
                }
            }
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// A fresh UTC-timestamped run directory under the configured runs root.
    pub fn fresh_run_dir(&self) -> PathBuf {
        let root = self
            .runs_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("runs"));
        root.join(Utc::now().format("%Y%m%dT%H%M%SZ").to_string())
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
