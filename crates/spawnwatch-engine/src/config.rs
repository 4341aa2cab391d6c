use std::time::Duration;

use spawnwatch_contracts::corrections::{DEFAULT_CORRECTION_CAPACITY, DEFAULT_CORRECTION_TTL};

use crate::http::{api_base_from_env, first_non_empty_env};

/// Account id of the upstream game bot whose messages announce spawns.
pub const DEFAULT_UPSTREAM_BOT_ID: u64 = 716390085896962058;
pub const DEFAULT_VISION_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_POKEAPI_BASE: &str = "https://pokeapi.co/api/v2";
pub const DEFAULT_COLOR_CACHE_CAPACITY: usize = 2048;

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub primary_timeout: Duration,
    pub retry_timeout: Duration,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            model: DEFAULT_VISION_MODEL.to_string(),
            primary_timeout: Duration::from_secs(10),
            retry_timeout: Duration::from_secs(7),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub persistence_tick: Duration,
    pub persistence_interval: Duration,
    pub presence_interval: Duration,
    pub presence_jitter: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            persistence_tick: Duration::from_secs(60),
            persistence_interval: Duration::from_secs(300),
            presence_interval: Duration::from_secs(300),
            presence_jitter: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub upstream_bot_id: u64,
    pub vision: VisionConfig,
    pub pokeapi_base: String,
    pub segmenter_url: Option<String>,
    pub segmenter_timeout: Duration,
    pub fetch_timeout: Duration,
    pub lookup_timeout: Duration,
    pub color_cache_capacity: usize,
    pub correction_capacity: usize,
    pub correction_ttl: Duration,
    pub loops: LoopConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            upstream_bot_id: DEFAULT_UPSTREAM_BOT_ID,
            vision: VisionConfig::default(),
            pokeapi_base: DEFAULT_POKEAPI_BASE.to_string(),
            segmenter_url: None,
            segmenter_timeout: Duration::from_secs(20),
            fetch_timeout: Duration::from_secs(15),
            lookup_timeout: Duration::from_secs(15),
            color_cache_capacity: DEFAULT_COLOR_CACHE_CAPACITY,
            correction_capacity: DEFAULT_CORRECTION_CAPACITY,
            correction_ttl: DEFAULT_CORRECTION_TTL,
            loops: LoopConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.vision.api_key = first_non_empty_env(&["GEMINI_API_KEY", "GOOGLE_API_KEY"]);
        config.vision.api_base = api_base_from_env(&["GEMINI_API_BASE"], DEFAULT_GEMINI_API_BASE);
        if let Some(model) = first_non_empty_env(&["SPAWNWATCH_VISION_MODEL"]) {
            config.vision.model = model;
        }
        config.pokeapi_base = api_base_from_env(&["POKEAPI_BASE"], DEFAULT_POKEAPI_BASE);
        config.segmenter_url = first_non_empty_env(&["SPAWNWATCH_SEGMENTER_URL"])
            .map(|value| value.trim_end_matches('/').to_string());
        if let Some(id) = env_u64("SPAWNWATCH_UPSTREAM_BOT_ID") {
            config.upstream_bot_id = id;
        }
        if let Some(secs) = env_u64("SPAWNWATCH_CORRECTION_TTL_SECS") {
            config.correction_ttl = Duration::from_secs(secs);
        }
        config
    }
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = first_non_empty_env(&[key])?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring non-numeric environment value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_timeouts_and_intervals() {
        let config = EngineConfig::default();
        assert_eq!(config.vision.primary_timeout, Duration::from_secs(10));
        assert_eq!(config.vision.retry_timeout, Duration::from_secs(7));
        assert_eq!(config.loops.persistence_tick, Duration::from_secs(60));
        assert_eq!(config.loops.persistence_interval, Duration::from_secs(300));
        assert_eq!(config.upstream_bot_id, DEFAULT_UPSTREAM_BOT_ID);
        assert!(config.segmenter_url.is_none());
    }
}
