use serde::{Deserialize, Serialize};

/// Process-wide stream configuration, loaded once at startup and
/// updated in place once real dimensions arrive from the SPS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub video: VideoConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            server: ServerConfig::default(),
            video: VideoConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the viewer-facing WebSocket endpoint.
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Initial fallback width, replaced once the SPS reports real dimensions.
    #[serde(default = "default_width")]
    pub width: u16,
    #[serde(default = "default_height")]
    pub height: u16,
    #[serde(default = "default_framerate")]
    pub framerate: u32,
    /// Opaque hint passed through to the Config message; the pipeline
    /// does not interpret it.
    #[serde(default = "default_quality")]
    pub quality: u32,
    /// Force a specific encoder candidate by name, skipping preference order.
    pub encoder: Option<String>,
}

impl Default for VideoConfig {
    fn default() -> Self {
        VideoConfig {
            width: default_width(),
            height: default_height(),
            framerate: default_framerate(),
            quality: default_quality(),
            encoder: None,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9000
}

fn default_width() -> u16 {
    1920
}

fn default_height() -> u16 {
    1080
}

fn default_framerate() -> u32 {
    30
}

fn default_quality() -> u32 {
    80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = StreamConfig::default();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.video.width, 1920);
        assert_eq!(cfg.video.framerate, 30);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let toml = "[video]\nwidth = 640\nheight = 480\n";
        let cfg: StreamConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.video.width, 640);
        assert_eq!(cfg.video.framerate, 30);
        assert_eq!(cfg.server.port, 9000);
    }
}
