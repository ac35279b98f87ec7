use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// TTL: 60s; heartbeat period: 30s (§3).
pub const REGISTRATION_TTL_SECS: i64 = 60;
pub const HEARTBEAT_PERIOD_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRegistration {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub health_url: String,
    pub registered_at: i64,
    pub last_heartbeat: i64,
    pub healthy: bool,
    pub metadata: HashMap<String, String>,
}

impl ServiceRegistration {
    pub fn is_expired(&self, now: i64) -> bool {
        now - self.last_heartbeat > REGISTRATION_TTL_SECS
    }
}
