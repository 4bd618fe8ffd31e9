use crate::config::types::{Config, DomainConfigs, FeedEntry};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Loads and parses a configuration file from the given path
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content, stamped into
/// run metadata so operators can tell which configuration produced a given
/// output batch.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Resolves a side-file path named in the TOML relative to the directory the
/// config file itself lives in, so `engine.toml` and its side files can be
/// moved together.
fn resolve_relative(config_path: &Path, side_path: &str) -> PathBuf {
    let candidate = Path::new(side_path);
    if candidate.is_absolute() {
        return candidate.to_path_buf();
    }
    config_path
        .parent()
        .map(|dir| dir.join(candidate))
        .unwrap_or_else(|| candidate.to_path_buf())
}

/// Loads `seeds.json`: a JSON array of seed URL strings.
pub fn load_seeds(config_path: &Path, side_path: &str) -> Result<Vec<String>, ConfigError> {
    let path = resolve_relative(config_path, side_path);
    let content = std::fs::read_to_string(&path)?;
    serde_json::from_str(&content)
        .map_err(|e| ConfigError::Validation(format!("invalid seeds file {:?}: {}", path, e)))
}

/// Loads `feeds.json`: entries consumed by the external RSS collaborator.
pub fn load_feeds(config_path: &Path, side_path: &str) -> Result<Vec<FeedEntry>, ConfigError> {
    let path = resolve_relative(config_path, side_path);
    let content = std::fs::read_to_string(&path)?;
    serde_json::from_str(&content)
        .map_err(|e| ConfigError::Validation(format!("invalid feeds file {:?}: {}", path, e)))
}

/// Loads `blacklist.txt`: newline-separated host patterns, `#` comments.
pub fn load_blacklist_file(config_path: &Path, side_path: &str) -> Result<Vec<String>, ConfigError> {
    let path = resolve_relative(config_path, side_path);
    let content = std::fs::read_to_string(&path)?;
    let mut patterns = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        crate::config::validation::validate_domain_pattern(line)?;
        patterns.push(line.to_string());
    }
    Ok(patterns)
}

/// Loads `domain_configs.json`: per-host overrides.
pub fn load_domain_configs(config_path: &Path, side_path: &str) -> Result<DomainConfigs, ConfigError> {
    let path = resolve_relative(config_path, side_path);
    let content = std::fs::read_to_string(&path)?;
    serde_json::from_str(&content).map_err(|e| {
        ConfigError::Validation(format!("invalid domain configs file {:?}: {}", path, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID_CONFIG: &str = r#"
[engine]
network-workers = 4
max-per-worker = 16
max-depth = 3
max-queue-size = 10000

[user-agent]
crawler-name = "TestCrawler"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[storage]
output-dir = "./out"
durable-path = "./state.db"
spill-dir = "./spill"
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.engine.max_depth, 3);
        assert_eq!(config.engine.network_workers, 4);
        assert_eq!(config.user_agent.crawler_name, "TestCrawler");
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let bad = VALID_CONFIG.replace("network-workers = 4", "network-workers = 0");
        let file = create_temp_config(&bad);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");
        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");
        assert_ne!(
            compute_config_hash(file1.path()).unwrap(),
            compute_config_hash(file2.path()).unwrap()
        );
    }

    #[test]
    fn loads_seeds_relative_to_config_directory() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("engine.toml");
        std::fs::write(&config_path, VALID_CONFIG).unwrap();
        std::fs::write(
            dir.path().join("seeds.json"),
            r#"["https://example.com/a", "https://example.com/b"]"#,
        )
        .unwrap();

        let seeds = load_seeds(&config_path, "seeds.json").unwrap();
        assert_eq!(seeds, vec!["https://example.com/a", "https://example.com/b"]);
    }

    #[test]
    fn loads_blacklist_skipping_comments_and_blank_lines() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("engine.toml");
        std::fs::write(&config_path, VALID_CONFIG).unwrap();
        std::fs::write(
            dir.path().join("blacklist.txt"),
            "# spammy hosts\nspam.example.com\n\n*.ads.example.com\n",
        )
        .unwrap();

        let patterns = load_blacklist_file(&config_path, "blacklist.txt").unwrap();
        assert_eq!(patterns, vec!["spam.example.com", "*.ads.example.com"]);
    }

    #[test]
    fn loads_domain_configs_overrides() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("engine.toml");
        std::fs::write(&config_path, VALID_CONFIG).unwrap();
        std::fs::write(
            dir.path().join("domain_configs.json"),
            r#"{"domains": {"example.com": {"priority_multiplier": 2.0, "enabled": true}}}"#,
        )
        .unwrap();

        let configs = load_domain_configs(&config_path, "domain_configs.json").unwrap();
        let entry = configs.domains.get("example.com").unwrap();
        assert_eq!(entry.priority_multiplier, Some(2.0));
        assert_eq!(entry.enabled, Some(true));
    }
}
