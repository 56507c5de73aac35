use serde::{Deserialize, Serialize};

use crate::device::cipher::CipherLayer;
use crate::device::codec::CommandCodec;
use crate::device::constants::{make_service_hints, DEFAULT_SHADE_PREFIX};
use crate::device::types::DeviceFilter;
use crate::error::ConfigError;

/// Who owns the command sequence counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum SequenceScope {
    /// every shade gets its own counter
    #[default]
    PerSession,
    /// one counter for the whole process
    Shared,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub encryption_key: Option<String>,
    pub shade_prefix: String,
    pub sequence_scope: SequenceScope,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            encryption_key: None,
            shade_prefix: DEFAULT_SHADE_PREFIX.to_string(),
            sequence_scope: SequenceScope::default(),
        }
    }
}

impl Config {
    /// Command line / environment values win over the config file.
    pub fn apply_overrides(&mut self, key: Option<String>, prefix: Option<String>) {
        if let Some(key) = key {
            self.encryption_key = Some(key);
        }
        if let Some(prefix) = prefix {
            self.shade_prefix = prefix;
        }
    }

    /// Check the key and produce the settings sessions are built from. Must succeed before any
    /// session is created.
    pub fn validate(&self) -> Result<ShadeSettings, ConfigError> {
        let cipher = CipherLayer::from_hex(self.encryption_key.as_deref())?;

        Ok(ShadeSettings {
            cipher,
            shade_prefix: self.shade_prefix.clone(),
            sequence_scope: self.sequence_scope,
            shared_codec: CommandCodec::new(),
        })
    }

    pub fn redacted(&self) -> Config {
        let mut config = self.clone();
        config.encryption_key = self.encryption_key.as_ref().map(|_| "********".to_string());
        config
    }
}

#[derive(Debug, Clone)]
pub struct ShadeSettings {
    pub cipher: CipherLayer,
    pub shade_prefix: String,
    pub sequence_scope: SequenceScope,
    shared_codec: CommandCodec,
}

impl ShadeSettings {
    pub fn filter(&self, address: Option<&str>) -> DeviceFilter {
        DeviceFilter {
            name_prefix: self.shade_prefix.clone(),
            service_hints: make_service_hints(),
            address: address.map(str::to_string),
        }
    }

    pub fn codec_for_session(&self) -> CommandCodec {
        match self.sequence_scope {
            SequenceScope::PerSession => CommandCodec::new(),
            SequenceScope::Shared => self.shared_codec.clone(),
        }
    }
}
