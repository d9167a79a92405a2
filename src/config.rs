use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub modes: ModesConfig,
    #[serde(default)]
    pub reflect: ReflectConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// e.g. "127.0.0.1:11434"
    pub host: String,
    pub model: String,
    pub timeout_ms: u64,
    /// Retry once with web snippets when the reply sounds uncertain.
    pub uncertainty_retry: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:11434".to_string(),
            model: "llama3.2".to_string(),
            timeout_ms: 30_000,
            uncertainty_retry: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    pub enabled: bool,
    /// Host serving the html.duckduckgo.com endpoint shape (plain HTTP).
    pub host: String,
    pub timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1:8080".to_string(),
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Extensions (without dot) the updater refuses to overwrite.
    pub restricted_extensions: Vec<String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            restricted_extensions: vec![
                "yaml".into(),
                "yml".into(),
                "toml".into(),
                "lock".into(),
            ],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModesConfig {
    /// Require a y/n decision before any file is overwritten.
    pub patch_approval: bool,
    /// Silence on the approval prompt counts as "n" after this long.
    pub approval_timeout_secs: u64,
    /// "static" or "llm"
    pub reflect_strategy: String,
}

impl Default for ModesConfig {
    fn default() -> Self {
        Self {
            patch_approval: true,
            approval_timeout_secs: 120,
            reflect_strategy: "static".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReflectConfig {
    /// Fallback patch target when an insight names no file.
    pub default_target: String,
    pub complexity_threshold: u32,
}

impl Default for ReflectConfig {
    fn default() -> Self {
        Self {
            default_target: "src/main.rs".to_string(),
            complexity_threshold: 8,
        }
    }
}

impl Config {
    /// Project-local config wins; fall back to the user config dir; else defaults.
    pub fn load(project_config: &Path) -> Result<Self> {
        if project_config.exists() {
            return Self::from_file(project_config);
        }
        if let Some(base) = dirs::config_dir() {
            let user = base.join("patchpilot").join("config.toml");
            if user.exists() {
                return Self::from_file(&user);
            }
        }
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn extension_restricted(&self, path: &Path) -> bool {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        self.access
            .restricted_extensions
            .iter()
            .any(|r| r.eq_ignore_ascii_case(&ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_absent() {
        let cfg = Config::load(Path::new("/nonexistent/patchpilot.toml")).unwrap();
        assert!(cfg.modes.patch_approval);
        assert_eq!(cfg.generation.model, "llama3.2");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[modes]\npatch_approval = false\napproval_timeout_secs = 5\nreflect_strategy = \"static\"\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert!(!cfg.modes.patch_approval);
        // untouched sections keep their defaults
        assert_eq!(cfg.generation.timeout_ms, 30_000);
    }

    #[test]
    fn restricted_extension_check_is_case_insensitive() {
        let cfg = Config::default();
        assert!(cfg.extension_restricted(Path::new("deploy/config.YAML")));
        assert!(!cfg.extension_restricted(Path::new("src/lib.rs")));
        assert!(!cfg.extension_restricted(Path::new("Makefile")));
    }
}
