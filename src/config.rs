//! Named tunables for the evaluation poller and the service client.
//!
//! The two presets reflect the two places the poller runs: replaying a
//! finished game ([`PollConfig::analysis`]) starts shallow and gives up
//! quickly, while a live game ([`PollConfig::live_play`]) starts deeper and
//! waits longer for each answer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::GameError;
use crate::score::MateScaling;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub starting_depth: u32,
    pub depth_increment: u32,
    /// Consecutive equal rounded scores needed to stop.
    pub stabilization_count: u32,
    #[serde(rename = "request_timeout_ms", with = "millis")]
    pub request_timeout: Duration,
    /// Hard cap on requests per session.
    pub max_iterations: u32,
    pub mate_scaling: MateScaling,
}

impl PollConfig {
    pub fn analysis() -> Self {
        Self {
            starting_depth: 10,
            depth_increment: 1,
            stabilization_count: 3,
            request_timeout: Duration::from_millis(5000),
            max_iterations: 20,
            mate_scaling: MateScaling::Saturating,
        }
    }

    pub fn live_play() -> Self {
        Self {
            starting_depth: 20,
            request_timeout: Duration::from_millis(10_000),
            ..Self::analysis()
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::analysis()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Scheme and authority of the evaluation/move service, no trailing path.
    pub base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub client: ClientConfig,
    pub analysis: PollConfig,
    pub live_play: PollConfig,
    /// Where [`FileStorage`](crate::storage::FileStorage) keeps session state.
    pub storage_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            analysis: PollConfig::analysis(),
            live_play: PollConfig::live_play(),
            storage_path: PathBuf::from("chess-annotator-state.json"),
        }
    }
}

impl AppConfig {
    pub fn from_json(text: &str) -> Result<Self, GameError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, GameError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_differ_in_depth_and_timeout() {
        let a = PollConfig::analysis();
        let l = PollConfig::live_play();
        assert_eq!(a.starting_depth, 10);
        assert_eq!(l.starting_depth, 20);
        assert_eq!(a.request_timeout, Duration::from_secs(5));
        assert_eq!(l.request_timeout, Duration::from_secs(10));
        assert_eq!(a.stabilization_count, 3);
        assert_eq!(l.stabilization_count, 3);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = AppConfig::from_json(
            r#"{
                "client": { "base_url": "http://engine:8080" },
                "analysis": { "request_timeout_ms": 250, "mate_scaling": "distance" }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.client.base_url, "http://engine:8080");
        assert_eq!(cfg.analysis.request_timeout, Duration::from_millis(250));
        assert_eq!(cfg.analysis.mate_scaling, MateScaling::Distance);
        assert_eq!(cfg.analysis.starting_depth, 10);
        assert_eq!(cfg.live_play, PollConfig::live_play());
    }

    #[test]
    fn rejects_bad_json() {
        assert!(matches!(
            AppConfig::from_json("{ not json"),
            Err(GameError::Storage(_))
        ));
    }
}
