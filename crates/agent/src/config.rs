use std::path::Path;

use streamcast_protocol::StreamConfig;

/// Loads a `StreamConfig` from a TOML file, falling back to defaults
/// with a warning if the file does not exist.
pub fn load_config(path: &Path) -> anyhow::Result<StreamConfig> {
    if !path.exists() {
        tracing::warn!(
            path = %path.display(),
            "config file not found, using defaults"
        );
        return Ok(StreamConfig::default());
    }
    let raw = std::fs::read_to_string(path)?;
    let config: StreamConfig = toml::from_str(&raw)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = load_config(Path::new("/nonexistent/streamcast.toml")).unwrap();
        assert_eq!(cfg.server.port, 9000);
    }
}
