//! Agent registry
//!
//! Durable directory of known agents and their liveness. Registration and
//! heartbeats mark agents online; a periodic liveness sweep flips them
//! offline once heartbeats go stale. The table is persisted to a flat JSON
//! file after registrations; a cold process reloads every record as
//! offline because it cannot vouch for liveness it did not observe.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::knowledge::ExpertiseIndex;

/// Default seconds without a heartbeat before an agent goes offline
pub const DEFAULT_OFFLINE_THRESHOLD: Duration = Duration::from_secs(90);
/// Default liveness sweep interval
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15);

/// Agent liveness as computed by the sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
}

/// Payment terms an agent advertises
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTerms {
    pub amount: u64,
    pub unit: String,
}

/// What an agent submits on registration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentProfile {
    pub agent_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub connection_key: String,
    #[serde(default)]
    pub expertise_index: Option<ExpertiseIndex>,
    #[serde(default)]
    pub payment: Option<PaymentTerms>,
}

/// One registry entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Opaque connection locator handed out on /connect
    pub connection_key: String,
    #[serde(default)]
    pub expertise_index: Option<ExpertiseIndex>,
    #[serde(default)]
    pub payment: Option<PaymentTerms>,
    pub status: AgentStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

/// Agent directory with liveness sweeps and crash-safe persistence
pub struct AgentRegistry {
    agents: DashMap<String, AgentRecord>,
    persist_path: PathBuf,
    offline_threshold: Duration,
    sweep_interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl AgentRegistry {
    /// Open a registry, reloading any persisted snapshot. Every reloaded
    /// record is forced offline; a corrupt or missing snapshot means an
    /// empty registry, never a crash.
    pub fn open(
        persist_path: PathBuf,
        offline_threshold: Duration,
        sweep_interval: Duration,
    ) -> Arc<Self> {
        let agents = DashMap::new();
        match std::fs::read_to_string(&persist_path) {
            Ok(content) => match serde_json::from_str::<Vec<AgentRecord>>(&content) {
                Ok(records) => {
                    let count = records.len();
                    for mut record in records {
                        record.status = AgentStatus::Offline;
                        agents.insert(record.agent_id.clone(), record);
                    }
                    info!("Reloaded {} agent(s) from snapshot, all offline", count);
                }
                Err(e) => {
                    warn!(
                        "Corrupt registry snapshot at {}, starting empty: {}",
                        persist_path.display(),
                        e
                    );
                }
            },
            Err(_) => {
                debug!("No registry snapshot at {}", persist_path.display());
            }
        }

        Arc::new(Self {
            agents,
            persist_path,
            offline_threshold,
            sweep_interval,
            sweeper: Mutex::new(None),
        })
    }

    pub fn open_with_defaults(persist_path: PathBuf) -> Arc<Self> {
        Self::open(persist_path, DEFAULT_OFFLINE_THRESHOLD, DEFAULT_SWEEP_INTERVAL)
    }

    /// Register or re-register an agent. Preserves `registered_at` across
    /// re-registration and persists the table.
    pub fn register(&self, profile: AgentProfile) -> AgentRecord {
        let now = Utc::now();
        let registered_at = self
            .agents
            .get(&profile.agent_id)
            .map(|existing| existing.registered_at)
            .unwrap_or(now);

        let record = AgentRecord {
            agent_id: profile.agent_id.clone(),
            display_name: profile.display_name,
            connection_key: profile.connection_key,
            expertise_index: profile.expertise_index,
            payment: profile.payment,
            status: AgentStatus::Online,
            registered_at,
            last_heartbeat: now,
        };
        self.agents.insert(profile.agent_id, record.clone());
        self.persist();
        record
    }

    /// Record a heartbeat. Returns false for unknown agents so callers can
    /// tell "no such agent" from a server error.
    pub fn heartbeat(&self, agent_id: &str) -> bool {
        match self.agents.get_mut(agent_id) {
            Some(mut record) => {
                record.last_heartbeat = Utc::now();
                record.status = AgentStatus::Online;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentRecord> {
        self.agents.get(agent_id).map(|r| r.clone())
    }

    pub fn online_agents(&self) -> Vec<AgentRecord> {
        self.agents
            .iter()
            .filter(|r| r.status == AgentStatus::Online)
            .map(|r| r.clone())
            .collect()
    }

    /// (total, online)
    pub fn counts(&self) -> (usize, usize) {
        let online = self
            .agents
            .iter()
            .filter(|r| r.status == AgentStatus::Online)
            .count();
        (self.agents.len(), online)
    }

    /// One bounded liveness pass: flip stale online agents offline.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let threshold =
            chrono::Duration::from_std(self.offline_threshold).unwrap_or(chrono::Duration::zero());
        let mut flipped = 0;
        for mut record in self.agents.iter_mut() {
            if record.status == AgentStatus::Online && now - record.last_heartbeat > threshold {
                record.status = AgentStatus::Offline;
                flipped += 1;
            }
        }
        if flipped > 0 {
            info!("Liveness sweep marked {} agent(s) offline", flipped);
        }
        flipped
    }

    /// Start the background liveness sweep. Idempotent.
    pub fn start_sweeper(self: &Arc<Self>) {
        let mut guard = self.sweeper.lock().unwrap();
        if guard.is_some() {
            return;
        }
        let registry = Arc::clone(self);
        *guard = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(registry.sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                registry.sweep();
            }
        }));
    }

    /// Stop the sweep and drop all state. For graceful shutdown.
    pub fn destroy(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
        self.agents.clear();
    }

    /// Best-effort synchronous snapshot write. Availability over durability
    /// for this metadata: failure is logged, the operation that triggered
    /// it still succeeds.
    fn persist(&self) {
        let records: Vec<AgentRecord> = self.agents.iter().map(|r| r.clone()).collect();
        let result = (|| -> crate::types::Result<()> {
            if let Some(parent) = self.persist_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(&records)?;
            std::fs::write(&self.persist_path, json)?;
            Ok(())
        })();
        if let Err(e) = result {
            warn!(
                "Failed to persist registry to {}: {}",
                self.persist_path.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn profile(id: &str) -> AgentProfile {
        AgentProfile {
            agent_id: id.to_string(),
            display_name: Some("Test Agent".to_string()),
            connection_key: "tcp://127.0.0.1:4000".to_string(),
            expertise_index: None,
            payment: Some(PaymentTerms {
                amount: 100,
                unit: "sat".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn register_and_get_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let registry = AgentRegistry::open_with_defaults(tmp.path().join("registry.json"));

        registry.register(profile("agent-1"));
        let got = registry.get("agent-1").unwrap();

        assert_eq!(got.agent_id, "agent-1");
        assert_eq!(got.connection_key, "tcp://127.0.0.1:4000");
        assert_eq!(got.status, AgentStatus::Online);
        registry.destroy();
    }

    #[tokio::test]
    async fn reregistration_preserves_registered_at() {
        let tmp = TempDir::new().unwrap();
        let registry = AgentRegistry::open_with_defaults(tmp.path().join("registry.json"));

        let first = registry.register(profile("agent-1"));
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let second = registry.register(profile("agent-1"));

        assert_eq!(second.registered_at, first.registered_at);
        assert!(second.last_heartbeat >= first.last_heartbeat);
        registry.destroy();
    }

    #[tokio::test]
    async fn heartbeat_refreshes_and_reports_unknown() {
        let tmp = TempDir::new().unwrap();
        let registry = AgentRegistry::open_with_defaults(tmp.path().join("registry.json"));

        registry.register(profile("agent-1"));
        let before = registry.get("agent-1").unwrap().last_heartbeat;

        assert!(registry.heartbeat("agent-1"));
        assert!(registry.get("agent-1").unwrap().last_heartbeat >= before);
        assert!(!registry.heartbeat("no-such-agent"));
        registry.destroy();
    }

    #[tokio::test]
    async fn sweep_flips_stale_agents_offline_and_heartbeat_revives() {
        let tmp = TempDir::new().unwrap();
        let registry = AgentRegistry::open(
            tmp.path().join("registry.json"),
            Duration::from_millis(20),
            Duration::from_millis(5),
        );

        registry.register(profile("agent-1"));
        registry.start_sweeper();

        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        assert_eq!(registry.get("agent-1").unwrap().status, AgentStatus::Offline);
        assert!(registry.online_agents().is_empty());

        assert!(registry.heartbeat("agent-1"));
        assert_eq!(registry.get("agent-1").unwrap().status, AgentStatus::Online);
        registry.destroy();
    }

    #[tokio::test]
    async fn cold_reload_forces_every_record_offline() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("registry.json");

        {
            let registry = AgentRegistry::open_with_defaults(path.clone());
            registry.register(profile("agent-1"));
            registry.register(profile("agent-2"));
            assert_eq!(registry.counts(), (2, 2));
            registry.destroy();
        }

        let reloaded = AgentRegistry::open_with_defaults(path);
        assert_eq!(reloaded.counts(), (2, 0));
        assert_eq!(
            reloaded.get("agent-1").unwrap().status,
            AgentStatus::Offline
        );
        // registered_at survives the restart
        assert!(reloaded.get("agent-2").is_some());
        reloaded.destroy();
    }

    #[tokio::test]
    async fn corrupt_snapshot_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("registry.json");
        std::fs::write(&path, "{ not json").unwrap();

        let registry = AgentRegistry::open_with_defaults(path);
        assert_eq!(registry.counts(), (0, 0));
        registry.destroy();
    }

    #[tokio::test]
    async fn persistence_failure_does_not_fail_register() {
        // Point persistence at an unwritable path (a directory)
        let tmp = TempDir::new().unwrap();
        let registry = AgentRegistry::open_with_defaults(tmp.path().to_path_buf());

        let record = registry.register(profile("agent-1"));
        assert_eq!(record.status, AgentStatus::Online);
        assert!(registry.get("agent-1").is_some());
        registry.destroy();
    }
}
