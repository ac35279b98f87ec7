//! Service registry with TTL heartbeats (§3, §4.C item 5), grounded in
//! `original_source/shared/service_discovery.py`. The registry handle is a
//! process-wide singleton per §9 ("Global state").

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::ServiceRegistration;

#[derive(Default)]
pub struct ServiceRegistry {
    entries: RwLock<HashMap<String, ServiceRegistration>>,
}

impl ServiceRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, name: &str, host: &str, port: u16, health_url: &str) {
        let now = chrono::Utc::now().timestamp();
        let mut entries = self.entries.write();
        entries.insert(
            name.to_string(),
            ServiceRegistration {
                name: name.to_string(),
                host: host.to_string(),
                port,
                health_url: health_url.to_string(),
                registered_at: now,
                last_heartbeat: now,
                healthy: true,
                metadata: HashMap::new(),
            },
        );
    }

    pub fn heartbeat(&self, name: &str) {
        let mut entries = self.entries.write();
        if let Some(reg) = entries.get_mut(name) {
            reg.last_heartbeat = chrono::Utc::now().timestamp();
            reg.healthy = true;
        }
    }

    pub fn unregister(&self, name: &str) {
        self.entries.write().remove(name);
    }

    /// Entries whose heartbeat has exceeded the TTL are dropped lazily on
    /// read, matching "Registrations expire via TTL if heartbeat stops" (§3).
    pub fn active(&self) -> Vec<ServiceRegistration> {
        let now = chrono::Utc::now().timestamp();
        let entries = self.entries.read();
        entries
            .values()
            .filter(|reg| !reg.is_expired(now))
            .cloned()
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<ServiceRegistration> {
        let now = chrono::Utc::now().timestamp();
        self.entries
            .read()
            .get(name)
            .filter(|reg| !reg.is_expired(now))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::REGISTRATION_TTL_SECS;

    #[test]
    fn registration_expires_after_ttl() {
        let mut reg = ServiceRegistration {
            name: "svc".into(),
            host: "localhost".into(),
            port: 8080,
            health_url: "http://localhost:8080/health".into(),
            registered_at: 0,
            last_heartbeat: 0,
            healthy: true,
            metadata: Default::default(),
        };
        assert!(reg.is_expired(REGISTRATION_TTL_SECS + 1));
        reg.last_heartbeat = REGISTRATION_TTL_SECS;
        assert!(!reg.is_expired(REGISTRATION_TTL_SECS));
    }

    #[test]
    fn register_and_unregister_round_trip() {
        let registry = ServiceRegistry::new();
        registry.register("svc", "localhost", 9000, "http://localhost:9000/health");
        assert!(registry.get("svc").is_some());
        registry.unregister("svc");
        assert!(registry.get("svc").is_none());
    }
}
