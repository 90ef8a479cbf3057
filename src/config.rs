use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::bridge::{BridgeSettings, BridgedCallSettings, EndpointDescriptor};
use crate::dialog::{DialogMode, DialogSettings};
use crate::scaling::Deployment;
use crate::session::{CallConfig, DEFAULT_CALL_HISTORY};

pub const DEFAULT_CONFIG_PATH: &str = "config/voice-dialog";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub nats: NatsConfig,
    pub call: CallSection,
    pub dialog: DialogSection,
    pub scaling: ScalingConfig,
    pub bridge: BridgeSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    /// AudioSocket listen address
    pub listen: String,
    /// Finished calls kept for the status API
    pub call_history: usize,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voice-dialog".to_string(),
            listen: "0.0.0.0:8080".to_string(),
            call_history: DEFAULT_CALL_HISTORY,
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub url: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CallSection {
    pub max_call_secs: u64,
    pub recognition_timeout_secs: u64,
    pub language: String,
    pub sample_rate: u32,
    pub chunk_size: usize,
    pub phrase_hints: Vec<String>,
}

impl Default for CallSection {
    fn default() -> Self {
        let call = CallConfig::default();
        Self {
            max_call_secs: call.max_call.as_secs(),
            recognition_timeout_secs: call.recognition_timeout.as_secs(),
            language: call.language,
            sample_rate: call.sample_rate,
            chunk_size: call.chunk_size,
            phrase_hints: call.phrase_hints,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DialogSection {
    pub mode: DialogMode,
    pub max_retries: u32,
    pub max_replicas: u32,
}

impl Default for DialogSection {
    fn default() -> Self {
        let dialog = DialogSettings::default();
        Self {
            mode: dialog.mode,
            max_retries: dialog.max_retries,
            max_replicas: dialog.max_replicas,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    pub namespace: String,
    pub deployment: String,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            namespace: "voip".to_string(),
            deployment: "asterisk".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
    /// Control-plane application calls arrive on
    pub application: String,
    /// Where the AudioSocket service is reachable from the PBX
    pub audiosocket_host: String,
    pub audiosocket_port: u16,
    pub answer_timeout_ms: u64,
    pub leg_retries: u32,
    pub settle_delay_ms: u64,
    pub max_call_secs: u64,
}

impl Default for BridgeSection {
    fn default() -> Self {
        let bridged = BridgedCallSettings::default();
        Self {
            application: "audiosocket".to_string(),
            audiosocket_host: bridged.endpoint.host,
            audiosocket_port: bridged.endpoint.port,
            answer_timeout_ms: bridged.bridge.answer_timeout.as_millis() as u64,
            leg_retries: bridged.bridge.leg_retries,
            settle_delay_ms: bridged.settle_delay.as_millis() as u64,
            max_call_secs: bridged.max_call.as_secs(),
        }
    }
}

impl Config {
    /// Load from an optional file at `path` (any extension the `config`
    /// crate understands), then `VOICE_DIALOG__SECTION__KEY` overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("VOICE_DIALOG")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn call_config(&self) -> CallConfig {
        CallConfig {
            max_call: Duration::from_secs(self.call.max_call_secs),
            recognition_timeout: Duration::from_secs(self.call.recognition_timeout_secs),
            language: self.call.language.clone(),
            sample_rate: self.call.sample_rate,
            chunk_size: self.call.chunk_size,
            phrase_hints: self.call.phrase_hints.clone(),
        }
    }

    pub fn dialog_settings(&self) -> DialogSettings {
        DialogSettings {
            mode: self.dialog.mode,
            max_retries: self.dialog.max_retries,
            max_replicas: self.dialog.max_replicas,
        }
    }

    pub fn deployment(&self) -> Deployment {
        Deployment::new(&self.scaling.namespace, &self.scaling.deployment)
    }

    pub fn bridged_call_settings(&self) -> BridgedCallSettings {
        BridgedCallSettings {
            endpoint: EndpointDescriptor::new(
                &self.bridge.audiosocket_host,
                self.bridge.audiosocket_port,
            ),
            bridge: BridgeSettings {
                answer_timeout: Duration::from_millis(self.bridge.answer_timeout_ms),
                leg_retries: self.bridge.leg_retries,
            },
            settle_delay: Duration::from_millis(self.bridge.settle_delay_ms),
            max_call: Duration::from_secs(self.bridge.max_call_secs),
        }
    }
}
