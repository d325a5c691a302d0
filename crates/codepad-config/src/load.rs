use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::validate;

/// Written into a freshly created global config file.
const DEFAULT_CONFIG_CONTENT: &str = r#"# codepad configuration
# Uncomment and edit settings below to override defaults.

# [session]
# request_timeout_ms = 10000
# auto_close = true

# [sync]
# debounce_ms = 500

# [formatting]
# tab_size = 4
# insert_spaces = true

# [log]
# level = "info"
# file = "/tmp/codepad.log"

# [lsp.servers.c]
# command = "clangd"
# args = ["--log=error"]
# extensions = ["c", "h"]
"#;

/// Directory name searched for project-local overrides.
const PROJECT_DIR_NAME: &str = ".codepad";

/// Load and merge configuration.
///
/// 1. Reads `config_dir/config.toml`, creating it with commented-out
///    defaults when missing.
/// 2. Looks for `.codepad/config.toml` from `project_dir` upward.
/// 3. Merges `Config::default() <- global <- project` and validates.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let global_path = config_dir.join("config.toml");

    if !global_path.exists() {
        std::fs::create_dir_all(config_dir)?;
        std::fs::write(&global_path, DEFAULT_CONFIG_CONTENT)
            .map_err(|e| ConfigError::CreateDefault(e.to_string()))?;
        tracing::info!(path = %global_path.display(), "created default config");
    }

    let mut config = Config::default();

    let global_content = std::fs::read_to_string(&global_path)?;
    if has_non_comment_content(&global_content) {
        config = merge_configs(&config, &global_content)?;
    }

    if let Some(project_path) = project_dir.and_then(find_project_config) {
        tracing::debug!(path = %project_path.display(), "merging project config");
        let project_content = std::fs::read_to_string(&project_path)?;
        config = merge_configs(&config, &project_content)?;
    }

    check(config)
}

/// Load a single explicitly named config file on top of the defaults.
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    check(merge_configs(&Config::default(), &content)?)
}

/// Parse a TOML string directly into a validated [`Config`].
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    check(config)
}

fn check(config: Config) -> Result<Config, ConfigError> {
    match validate(&config) {
        Ok(()) => Ok(config),
        Err(errors) => {
            for error in errors.iter().skip(1) {
                tracing::warn!("{error}");
            }
            Err(errors
                .into_iter()
                .next()
                .unwrap_or_else(|| ConfigError::Validation {
                    field: "unknown".to_string(),
                    message: "validation failed".to_string(),
                }))
        }
    }
}

/// Walk from `start` upward looking for `.codepad/config.toml`.
fn find_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_DIR_NAME).join("config.toml"))
        .find(|candidate| candidate.is_file())
}

/// `true` when the content has at least one non-empty, non-comment line.
fn has_non_comment_content(content: &str) -> bool {
    content.lines().any(|l| {
        let trimmed = l.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_config_creates_default_when_missing() {
        let tmp = TempDir::new().unwrap();
        let cfg_dir = tmp.path().join("config");

        let config = load_config(&cfg_dir, None).unwrap();
        assert_eq!(config, Config::default());
        assert!(cfg_dir.join("config.toml").exists());
    }

    #[test]
    fn load_config_reads_existing_global() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("config.toml"), "[sync]\ndebounce_ms = 50\n").unwrap();

        let config = load_config(tmp.path(), None).unwrap();
        assert_eq!(config.sync.debounce_ms, 50);
        assert_eq!(config.session.request_timeout_ms, 10_000);
    }

    #[test]
    fn load_config_merges_project_over_global() {
        let tmp = TempDir::new().unwrap();
        let cfg_dir = tmp.path().join("config");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            "[formatting]\ntab_size = 8\ninsert_spaces = false\n",
        )
        .unwrap();

        let proj_dir = tmp.path().join("project");
        let dot_dir = proj_dir.join(PROJECT_DIR_NAME);
        std::fs::create_dir_all(&dot_dir).unwrap();
        std::fs::write(dot_dir.join("config.toml"), "[formatting]\ntab_size = 2\n").unwrap();

        let config = load_config(&cfg_dir, Some(&proj_dir)).unwrap();
        assert_eq!(config.formatting.tab_size, 2);
        assert!(!config.formatting.insert_spaces);
    }

    #[test]
    fn load_config_rejects_invalid_merged_values() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[session]\nrequest_timeout_ms = 0\n",
        )
        .unwrap();
        let err = load_config(tmp.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn load_file_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.toml");
        let err = load_file(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(p) if p == missing));
    }

    #[test]
    fn load_file_reads_overrides() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("codepad.toml");
        std::fs::write(&path, "[log]\nlevel = \"debug\"\n").unwrap();
        let config = load_file(&path).unwrap();
        assert_eq!(config.log.level, crate::config::LogLevel::Debug);
    }

    #[test]
    fn load_from_str_parses_and_validates() {
        assert_eq!(load_from_str("[formatting]\ntab_size = 6\n").unwrap().formatting.tab_size, 6);
        assert!(load_from_str("{{bad}}").is_err());
        assert!(load_from_str("[formatting]\ntab_size = 0\n").is_err());
    }

    #[test]
    fn find_project_config_walks_up() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("repo");
        let dot_dir = root.join(PROJECT_DIR_NAME);
        std::fs::create_dir_all(&dot_dir).unwrap();
        std::fs::write(dot_dir.join("config.toml"), "").unwrap();

        let deep = root.join("src").join("module");
        std::fs::create_dir_all(&deep).unwrap();

        let found = find_project_config(&deep).unwrap();
        assert!(found.ends_with(".codepad/config.toml"));
        assert!(found.starts_with(&root));
    }

    #[test]
    fn default_config_content_is_comments_only() {
        assert!(!has_non_comment_content(DEFAULT_CONFIG_CONTENT));
        let uncommented: String = DEFAULT_CONFIG_CONTENT
            .lines()
            .map(|l| l.strip_prefix("# ").unwrap_or(l))
            .filter(|l| !l.starts_with('#') && !l.starts_with("codepad") && !l.starts_with("Uncomment"))
            .collect::<Vec<_>>()
            .join("\n");
        let parsed = load_from_str(&uncommented).unwrap();
        assert_eq!(parsed.lsp.servers["c"].command, "clangd");
    }

    #[test]
    fn has_non_comment_content_detects_values() {
        assert!(!has_non_comment_content(""));
        assert!(!has_non_comment_content("# comment\n"));
        assert!(has_non_comment_content("# comment\n[sync]\n"));
    }
}
