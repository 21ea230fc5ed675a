use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

pub const DEFAULT_SEED_SENTENCE: &str = "Our thoughts and prayers go out to the families and loved ones of the brave troops lost in the helicopter crash on the Iraq-Syria border yesterday.";

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    JsonError(serde_json::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "Config IO error: {}", e),
            ConfigError::JsonError(e) => write!(f, "Config JSON error: {}", e),
            ConfigError::Invalid(s) => write!(f, "Invalid config: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::JsonError(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> ConfigError {
        ConfigError::IoError(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> ConfigError {
        ConfigError::JsonError(err)
    }
}

/// Hyperparameters and resource locations for one run.
///
/// Built once (from JSON, defaults, then CLI overrides) and handed by
/// reference to every component. Nothing mutates it afterwards.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Full vector length, including the trailing end-of-text flag.
    pub vector_len: usize,
    pub maxlen: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub data_fraction: f32,
    pub validation_fraction: f32,
    pub total_epochs: usize,
    pub shuffle_on_epoch: bool,
    pub generate_on_epoch: bool,
    pub generated_text_size: usize,
    pub temperatures: Vec<f32>,
    pub seed: u64,
    pub seed_sentence: String,
    pub embeddings_path: PathBuf,
    pub corpus_path: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            vector_len: 26,
            maxlen: 5,
            batch_size: 1000,
            learning_rate: 0.002,
            data_fraction: 1.0,
            validation_fraction: 0.1,
            total_epochs: 30,
            shuffle_on_epoch: false,
            generate_on_epoch: false,
            generated_text_size: 20,
            temperatures: vec![1.0],
            seed: 42,
            seed_sentence: DEFAULT_SEED_SENTENCE.to_string(),
            embeddings_path: PathBuf::from("data/glove.twitter.27B.25d.txt"),
            corpus_path: PathBuf::from("data/tweets.txt"),
            output_dir: PathBuf::from("data/models"),
        }
    }
}

impl RunConfig {
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let mut file = File::open(config_path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let config: RunConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vector_len < 2 {
            return Err(ConfigError::Invalid(format!(
                "vector_len must be at least 2 (got {})",
                self.vector_len
            )));
        }
        if self.maxlen == 0 {
            return Err(ConfigError::Invalid("maxlen must be greater than 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be greater than 0".to_string()));
        }
        for (name, value) in [
            ("data_fraction", self.data_fraction),
            ("validation_fraction", self.validation_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must lie in [0, 1] (got {})",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Run name derived from the hyperparameters, used as the output folder.
    pub fn model_name(&self) -> String {
        format!(
            "w{}-{}-{}-{}",
            self.maxlen,
            self.batch_size,
            self.learning_rate.to_string().replace('.', ","),
            self.data_fraction.to_string().replace('.', ",")
        )
    }

    /// Folder holding every run of this configuration.
    pub fn model_dir(&self) -> PathBuf {
        self.output_dir.join(self.model_name())
    }

    /// Output folder for one run: `<output_dir>/<model_name>/<timestamp>/`.
    pub fn run_dir(&self, timestamp: &str) -> PathBuf {
        self.model_dir().join(timestamp)
    }
}
