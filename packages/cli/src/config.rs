use flowtree_common::{FileSystem, RealFileSystem};
use flowtree_editor::{CatalogueError, EditorSettings, Registry, SuggestionEngine, SuggestionScope};
use flowtree_parser::NestedText;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CONFIG_NAME: &str = "flowtree.config.json";

/// Flowtree configuration file format
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// JSON type catalogue; the built-in one is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalogue: Option<String>,

    /// Rule file for component suggestions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_rules: Option<String>,

    /// Rule file for external reference suggestions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_rules: Option<String>,

    /// Types offered when no actor rule matches
    #[serde(default)]
    pub default_suggestions: Vec<String>,

    #[serde(default)]
    pub settings: EditorSettings,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl Config {
    /// Load config from a directory; a missing file means defaults
    pub fn load(cwd: &Path) -> Result<Self, ConfigError> {
        let path = cwd.join(DEFAULT_CONFIG_NAME);
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn registry(&self, cwd: &Path) -> Result<Registry, CatalogueError> {
        match &self.catalogue {
            Some(path) => Registry::load(&RealFileSystem, &cwd.join(path)),
            None => Registry::builtin(),
        }
    }

    pub fn codec(&self) -> NestedText {
        NestedText::with_indent_width(self.settings.indent_width)
    }

    /// Suggestion engine for `scope`, from the configured rule file or the
    /// built-in rules
    pub fn suggestions(
        &self,
        cwd: &Path,
        registry: &Registry,
        scope: SuggestionScope,
    ) -> anyhow::Result<SuggestionEngine> {
        let (rules, defaults) = match scope {
            SuggestionScope::Actor => (&self.actor_rules, self.default_suggestions.clone()),
            SuggestionScope::External => (&self.external_rules, Vec::new()),
        };

        let engine = match rules {
            Some(path) => {
                let source = RealFileSystem.read_to_string(&cwd.join(path))?;
                SuggestionEngine::load(scope, registry, &source, defaults)
            }
            None if !defaults.is_empty() => SuggestionEngine::builtin(scope, registry).with_defaults(defaults),
            None => SuggestionEngine::builtin(scope, registry),
        };
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "catalogue": "types.json",
            "actorRules": "rules/actors.txt",
            "defaultSuggestions": ["Null"],
            "settings": { "maxUndo": 10, "indentWidth": 4 }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.catalogue.as_deref(), Some("types.json"));
        assert_eq!(config.actor_rules.as_deref(), Some("rules/actors.txt"));
        assert_eq!(config.external_rules, None);
        assert_eq!(config.default_suggestions, vec!["Null"]);
        assert_eq!(config.settings.max_undo, 10);
        assert_eq!(config.codec().indent_width(), 4);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.settings.indent_width, 2);
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(DEFAULT_CONFIG_NAME), "{ not json").unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(DEFAULT_CONFIG_NAME));
    }

    #[test]
    fn test_rule_file_and_defaults_are_used() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("actors.txt"), "# custom\nIF ISFIRST THEN Start\n").unwrap();
        let config = Config {
            actor_rules: Some("actors.txt".to_string()),
            default_suggestions: vec!["Null".to_string()],
            ..Config::default()
        };
        let registry = config.registry(dir.path()).unwrap();

        let actor = config.suggestions(dir.path(), &registry, SuggestionScope::Actor).unwrap();
        assert_eq!(actor.rules().len(), 1);
        assert_eq!(actor.defaults(), &["Null".to_string()]);

        let external = config.suggestions(dir.path(), &registry, SuggestionScope::External).unwrap();
        assert_eq!(external.rules().len(), 4);
    }
}
