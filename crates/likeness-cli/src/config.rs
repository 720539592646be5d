use likeness_core::{CascadeParams, LabelPolicy, DEFAULT_THRESHOLD_DISTANCE};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Config file read from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "likeness.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Tool configuration: defaults, then a TOML file, then `LIKENESS_*` environment
/// variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory holding the enrolled `.jpg` samples.
    pub training_dir: PathBuf,
    /// Where the trained model is written and read.
    pub model_path: PathBuf,
    /// Pretrained cascade for the face detector.
    pub cascade_path: PathBuf,
    /// Distance at which confidence reaches 0%.
    pub threshold_distance: f64,
    /// Eigenfaces to keep; 0 keeps all meaningful ones.
    pub num_components: usize,
    pub label_policy: LabelPolicy,
    pub scale_factor: f32,
    pub score_threshold: f64,
    pub min_face_size: u32,
    /// 0 means no limit.
    pub max_face_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        let cascade = CascadeParams::default();
        Self {
            camera_device: "/dev/video0".to_string(),
            training_dir: PathBuf::from("TrainingImages"),
            model_path: PathBuf::from("Resources/faceRecognizer.json"),
            cascade_path: PathBuf::from("Resources/seeta_fd_frontal_v1.0.bin"),
            threshold_distance: DEFAULT_THRESHOLD_DISTANCE,
            num_components: 0,
            label_policy: LabelPolicy::default(),
            scale_factor: cascade.scale_factor,
            score_threshold: cascade.score_threshold,
            min_face_size: cascade.min_size,
            max_face_size: cascade.max_size,
        }
    }
}

impl Config {
    /// Load `path` (or `./likeness.toml` if present) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.is_file()),
        };

        let config = match file {
            Some(p) => {
                let text = std::fs::read_to_string(&p).map_err(|source| ConfigError::Read {
                    path: p.display().to_string(),
                    source,
                })?;
                let config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
                    path: p.display().to_string(),
                    source,
                })?;
                tracing::debug!(path = %p.display(), "config file loaded");
                config
            }
            None => Self::default(),
        };

        Ok(config.with_env())
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply `LIKENESS_*` environment variables on top of `self`.
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(self, get: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            camera_device: get("LIKENESS_CAMERA_DEVICE").unwrap_or(self.camera_device),
            training_dir: get("LIKENESS_TRAINING_DIR")
                .map(PathBuf::from)
                .unwrap_or(self.training_dir),
            model_path: get("LIKENESS_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(self.model_path),
            cascade_path: get("LIKENESS_CASCADE_PATH")
                .map(PathBuf::from)
                .unwrap_or(self.cascade_path),
            threshold_distance: parsed(get("LIKENESS_THRESHOLD_DISTANCE"), self.threshold_distance),
            num_components: parsed(get("LIKENESS_NUM_COMPONENTS"), self.num_components),
            label_policy: parsed(get("LIKENESS_LABEL_POLICY"), self.label_policy),
            scale_factor: parsed(get("LIKENESS_SCALE_FACTOR"), self.scale_factor),
            score_threshold: parsed(get("LIKENESS_SCORE_THRESHOLD"), self.score_threshold),
            min_face_size: parsed(get("LIKENESS_MIN_FACE_SIZE"), self.min_face_size),
            max_face_size: parsed(get("LIKENESS_MAX_FACE_SIZE"), self.max_face_size),
        }
    }

    pub fn cascade_params(&self) -> CascadeParams {
        CascadeParams {
            scale_factor: self.scale_factor,
            min_size: self.min_face_size,
            max_size: self.max_face_size,
            score_threshold: self.score_threshold,
            ..CascadeParams::default()
        }
    }
}

/// Unparseable values keep the previous setting.
fn parsed<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.camera_device, "/dev/video0");
        assert_eq!(config.training_dir, PathBuf::from("TrainingImages"));
        assert_eq!(config.threshold_distance, 12_000.0);
        assert_eq!(config.label_policy, LabelPolicy::PerImage);
        assert_eq!(config.cascade_params(), CascadeParams::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            camera_device = "/dev/video2"
            threshold_distance = 8000.0
            label_policy = "from-file-name"
            "#,
        )
        .unwrap();
        assert_eq!(config.camera_device, "/dev/video2");
        assert_eq!(config.threshold_distance, 8_000.0);
        assert_eq!(config.label_policy, LabelPolicy::FromFileName);
        assert_eq!(config.model_path, Config::default().model_path);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::from_toml("camera = \"/dev/video1\"").is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let config = Config::default().with_overrides(env(&[
            ("LIKENESS_MODEL_PATH", "/tmp/model.json"),
            ("LIKENESS_NUM_COMPONENTS", "12"),
            ("LIKENESS_MIN_FACE_SIZE", "48"),
            ("LIKENESS_LABEL_POLICY", "from-file-name"),
        ]));
        assert_eq!(config.model_path, PathBuf::from("/tmp/model.json"));
        assert_eq!(config.num_components, 12);
        assert_eq!(config.cascade_params().min_size, 48);
        assert_eq!(config.label_policy, LabelPolicy::FromFileName);
    }

    #[test]
    fn test_bad_env_value_keeps_setting() {
        let config =
            Config::default().with_overrides(env(&[("LIKENESS_THRESHOLD_DISTANCE", "far")]));
        assert_eq!(config.threshold_distance, 12_000.0);
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = std::env::temp_dir().join(format!("likeness-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("likeness.toml");
        std::fs::write(&path, "training_dir = \"faces\"\nscale_factor = 1.2\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.training_dir, PathBuf::from("faces"));
        assert_eq!(config.cascade_params().scale_factor, 1.2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let result = Config::load(Some(Path::new("/nonexistent/likeness.toml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
