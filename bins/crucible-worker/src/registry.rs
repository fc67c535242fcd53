// Language registry: the static language -> image/entrypoint/filename table.
// Loaded once at startup and validated for completeness; adding a language
// is a configuration change, never a code change.
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: String,
    pub image: String,
    pub entrypoint: Vec<String>,
    pub source_filename: String,
    /// Container memory ceiling. Untrusted code always runs pinned.
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u32,
    /// CPU allotment in whole cores (0.5 = half a core).
    #[serde(default = "default_cpu_limit")]
    pub cpu_limit: f64,
}

fn default_memory_limit_mb() -> u32 {
    256
}

fn default_cpu_limit() -> f64 {
    0.5
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageConfig>,
}

/// Immutable registry of configured languages.
/// This is the authoritative source for which languages are enabled.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    configs: HashMap<String, LanguageConfig>,
}

impl LanguageRegistry {
    /// Load language configurations from languages.json
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path).context("Failed to read languages.json")?;

        let languages_json: LanguagesJson =
            serde_json::from_str(&content).context("Failed to parse languages.json")?;

        Self::from_configs(languages_json.languages)
    }

    /// Load with default path (config/languages.json)
    pub fn load_default() -> Result<Self> {
        let default_path = Path::new("config/languages.json");
        Self::load(default_path)
    }

    /// Build a registry, rejecting incomplete or duplicate entries up front
    /// instead of failing ad hoc at lookup time.
    pub fn from_configs(languages: Vec<LanguageConfig>) -> Result<Self> {
        if languages.is_empty() {
            bail!("Language registry is empty: at least one language must be configured");
        }

        let mut configs = HashMap::new();
        for lang in languages {
            if lang.name.is_empty() {
                bail!("Language entry with empty name");
            }
            if lang.image.is_empty() {
                bail!("Language '{}' has no image configured", lang.name);
            }
            if lang.entrypoint.is_empty() {
                bail!("Language '{}' has no entrypoint configured", lang.name);
            }
            if lang.source_filename.is_empty() {
                bail!("Language '{}' has no source filename configured", lang.name);
            }
            if lang.memory_limit_mb == 0 {
                bail!("Language '{}' has a zero memory limit", lang.name);
            }
            if lang.cpu_limit <= 0.0 {
                bail!("Language '{}' has a non-positive CPU limit", lang.name);
            }
            if configs.insert(lang.name.clone(), lang).is_some() {
                bail!("Duplicate language entry in registry");
            }
        }

        Ok(Self { configs })
    }

    /// Resolve the configuration for a language identifier.
    /// Unsupported identifiers are rejected here, before any workspace or
    /// container is created.
    pub fn resolve(&self, language: &str) -> Option<&LanguageConfig> {
        self.configs.get(language)
    }

    /// List all supported languages
    pub fn list_languages(&self) -> Vec<String> {
        self.configs.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python_config() -> LanguageConfig {
        LanguageConfig {
            name: "python".to_string(),
            image: "python:3.11-slim".to_string(),
            entrypoint: vec!["python".to_string(), "main.py".to_string()],
            source_filename: "main.py".to_string(),
            memory_limit_mb: 256,
            cpu_limit: 0.5,
        }
    }

    #[test]
    fn resolves_configured_language() {
        let registry = LanguageRegistry::from_configs(vec![python_config()]).unwrap();
        let config = registry.resolve("python").expect("python should resolve");
        assert_eq!(config.image, "python:3.11-slim");
        assert_eq!(config.source_filename, "main.py");
    }

    #[test]
    fn unknown_language_does_not_resolve() {
        let registry = LanguageRegistry::from_configs(vec![python_config()]).unwrap();
        assert!(registry.resolve("cobol").is_none());
    }

    #[test]
    fn rejects_empty_registry() {
        assert!(LanguageRegistry::from_configs(vec![]).is_err());
    }

    #[test]
    fn rejects_incomplete_entry() {
        let mut config = python_config();
        config.entrypoint.clear();
        assert!(LanguageRegistry::from_configs(vec![config]).is_err());
    }

    #[test]
    fn rejects_duplicate_entries() {
        let result = LanguageRegistry::from_configs(vec![python_config(), python_config()]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_zero_memory_limit() {
        let mut config = python_config();
        config.memory_limit_mb = 0;
        assert!(LanguageRegistry::from_configs(vec![config]).is_err());
    }

    #[test]
    fn parses_languages_json() {
        let json = r#"{
            "languages": [
                {
                    "name": "python",
                    "image": "python:3.11-slim",
                    "entrypoint": ["python", "main.py"],
                    "source_filename": "main.py",
                    "memory_limit_mb": 512,
                    "cpu_limit": 1.0
                }
            ]
        }"#;
        let parsed: LanguagesJson = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.languages[0].memory_limit_mb, 512);
        let registry = LanguageRegistry::from_configs(parsed.languages).unwrap();
        assert_eq!(registry.list_languages(), vec!["python".to_string()]);
    }

    #[test]
    fn resource_limits_default_when_omitted() {
        let json = r#"{
            "languages": [
                {
                    "name": "python",
                    "image": "python:3.11-slim",
                    "entrypoint": ["python", "main.py"],
                    "source_filename": "main.py"
                }
            ]
        }"#;
        let parsed: LanguagesJson = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.languages[0].memory_limit_mb, 256);
        assert!((parsed.languages[0].cpu_limit - 0.5).abs() < f64::EPSILON);
    }
}
