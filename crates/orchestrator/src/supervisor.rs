use std::collections::HashMap;

use tokio::process::{Child, Command};
use tokio::sync::watch;

use partwatch_core::{heartbeat, Store};

/// One supervised worker process slot. `local_index` feeds the globally
/// unique `worker_id` (`{container_id}_{local_index}`) so a restarted
/// process reuses the same identity and the heartbeat/proxy-release paths
/// find exactly what it left behind.
struct Slot {
    binary: String,
    worker_id: String,
    child: Option<Child>,
}

/// Spawns and restarts a fixed set of worker processes, releasing a
/// worker's claims the moment its process exits rather than waiting for
/// the heartbeat timeout to notice.
pub struct Supervisor {
    store: Store,
    slots: Vec<Slot>,
    database_url: String,
    extra_env: HashMap<String, String>,
}

impl Supervisor {
    pub fn new(store: Store, database_url: String) -> Self {
        Self {
            store,
            slots: Vec::new(),
            database_url,
            extra_env: HashMap::new(),
        }
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.extra_env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn add_workers(&mut self, binary: &str, container_id: &str, count: u32, offset: u32) {
        for i in 0..count {
            let worker_id = partwatch_common::config::worker_id(container_id, offset + i);
            self.slots.push(Slot {
                binary: binary.to_string(),
                worker_id,
                child: None,
            });
        }
    }

    fn spawn_slot(&self, slot: &Slot) -> std::io::Result<Child> {
        let mut cmd = Command::new(&slot.binary);
        cmd.env("DATABASE_URL", &self.database_url)
            .env("WORKER_ID", &slot.worker_id)
            .kill_on_drop(true);
        for (k, v) in &self.extra_env {
            cmd.env(k, v);
        }
        cmd.spawn()
    }

    /// Starts every configured slot.
    pub async fn start_all(&mut self) {
        for i in 0..self.slots.len() {
            let child = self.spawn_slot(&self.slots[i]);
            match child {
                Ok(child) => {
                    tracing::info!(worker_id = %self.slots[i].worker_id, "spawned worker");
                    self.slots[i].child = Some(child);
                }
                Err(e) => {
                    tracing::error!(worker_id = %self.slots[i].worker_id, error = %e, "failed to spawn worker");
                }
            }
        }
    }

    /// Polls every slot; any process that has exited gets its claims
    /// released and is respawned under the same `worker_id`.
    pub async fn reap_and_restart(&mut self) {
        for i in 0..self.slots.len() {
            let exited = match &mut self.slots[i].child {
                Some(child) => matches!(child.try_wait(), Ok(Some(_))),
                None => true,
            };

            if !exited {
                continue;
            }

            let worker_id = self.slots[i].worker_id.clone();
            tracing::warn!(worker_id = %worker_id, "worker exited, releasing claims and restarting");

            if let Err(e) = heartbeat::release_worker(&self.store, &worker_id).await {
                tracing::error!(worker_id = %worker_id, error = %e, "failed to release worker claims");
            }

            match self.spawn_slot(&self.slots[i]) {
                Ok(child) => self.slots[i].child = Some(child),
                Err(e) => {
                    tracing::error!(worker_id = %worker_id, error = %e, "failed to respawn worker");
                    self.slots[i].child = None;
                }
            }
        }
    }

    /// Sends a kill to every live child. Used on graceful shutdown; process
    /// drop (`kill_on_drop`) is the backstop if this is skipped.
    pub async fn shutdown(&mut self) {
        for slot in &mut self.slots {
            if let Some(child) = slot.child.as_mut() {
                let _ = child.start_kill();
            }
        }
    }

    pub fn worker_count(&self) -> usize {
        self.slots.len()
    }
}

/// Runs the supervision loop until `shutdown` fires.
pub async fn run_loop(mut supervisor: Supervisor, interval: std::time::Duration, mut shutdown: watch::Receiver<bool>) {
    supervisor.start_all().await;
    let mut tick = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                supervisor.reap_and_restart().await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    supervisor.shutdown().await;
                    return;
                }
            }
        }
    }
}
