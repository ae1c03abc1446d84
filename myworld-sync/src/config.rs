use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upload plugin configuration
///
/// Loaded from JSON with durations expressed in seconds. Missing keys take
/// their default values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Upload on a timer and when the application closes
    pub auto_upload: bool,

    /// Interval between automatic uploads; `None` disables the timer
    #[serde(with = "optional_secs", rename = "upload_interval_secs")]
    pub upload_interval: Option<Duration>,

    /// Require a logged-in user before uploading
    pub require_login: bool,

    /// Ask before closing with changes that were not uploaded
    pub confirm_close_with_changes: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            auto_upload: true,
            upload_interval: Some(Duration::from_secs(300)),
            require_login: true,
            confirm_close_with_changes: true,
        }
    }
}

impl UploadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_upload(mut self, enabled: bool) -> Self {
        self.auto_upload = enabled;
        self
    }

    pub fn with_upload_interval(mut self, interval: Option<Duration>) -> Self {
        self.upload_interval = interval;
        self
    }

    pub fn with_require_login(mut self, required: bool) -> Self {
        self.require_login = required;
        self
    }

    pub fn with_confirm_close(mut self, confirm: bool) -> Self {
        self.confirm_close_with_changes = confirm;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.upload_interval == Some(Duration::ZERO) {
            return Err("upload_interval must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Read and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read upload config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Invalid upload config {}", path.display()))?;
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }
}

mod optional_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}
