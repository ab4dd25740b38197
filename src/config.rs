use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Optional `rebind.toml` settings for the CLI.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RebindConfig {
    /// Directory holding module sources
    pub root: Option<String>,
    /// Module file extension, without the dot
    pub extension: Option<String>,
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("rebind.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<RebindConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: RebindConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rebind.toml");
        assert!(load_config(Some(&path)).unwrap().is_none());
    }

    #[test]
    fn test_load_reads_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rebind.toml");
        std::fs::write(&path, "root = \"modules\"\nextension = \"scr\"\n").unwrap();
        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.root.as_deref(), Some("modules"));
        assert_eq!(loaded.extension.as_deref(), Some("scr"));
    }
}
