//! Rate limiter payloads

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    pub name: String,
    pub limits: Vec<String>,
}

/// Payload of `UpdateLimiters`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterUpdate {
    pub limiter: String,
    pub data: LimiterConfig,
}

/// Payload of `DeleteLimiters`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterRef {
    pub limiter: String,
}

/// Symmetric budget string understood by the agent: `$ <up>MB <down>MB`
pub fn limit_expression(speed_mb: u32) -> String {
    format!("$ {}MB {}MB", speed_mb, speed_mb)
}

pub fn encode_limiter(name: &str, speed_mb: u32) -> LimiterConfig {
    LimiterConfig {
        name: name.to_string(),
        limits: vec![limit_expression(speed_mb)],
    }
}

pub fn encode_limiter_update(name: &str, speed_mb: u32) -> LimiterUpdate {
    LimiterUpdate {
        limiter: name.to_string(),
        data: encode_limiter(name, speed_mb),
    }
}
