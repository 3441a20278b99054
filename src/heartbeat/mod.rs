//! Heartbeat monitor: the authoritative owner of machine `status`
//! (`spec.md` Sec. 4.5). A single long-lived background task sweeps every
//! machine on a fixed cadence, derives liveness from `last_seen`, and
//! drives offline/online transitions with dispatcher notification and
//! dedup.

use crate::db::Database;
use crate::machines::MachineService;
use crate::notifications::{CompositeNotifier, NotificationEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct HeartbeatMonitor {
    db: Database,
    machines: MachineService,
    notifier: Arc<CompositeNotifier>,
    check_interval: Duration,
}

impl HeartbeatMonitor {
    pub fn new(
        db: Database,
        machines: MachineService,
        notifier: Arc<CompositeNotifier>,
        check_interval: Duration,
    ) -> Self {
        Self { db, machines, notifier, check_interval }
    }

    /// Spawn the monitor's background task. Performs one sweep immediately,
    /// then sweeps every `check_interval` until `shutdown` fires; it stops
    /// cooperatively, finishing any sweep already in progress.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.sweep().await;

            let mut ticker = tokio::time::interval(self.check_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("heartbeat monitor stopping");
                        break;
                    }
                }
            }
        })
    }

    /// One pass over every machine, cross-user (`spec.md` Sec. 4.5 "Sweep
    /// algorithm"). Errors for an individual machine are logged and do not
    /// abort the sweep.
    async fn sweep(&self) {
        let machines = match self.db.machines().list_all().await {
            Ok(machines) => machines,
            Err(e) => {
                tracing::error!(error = %e, "heartbeat sweep failed to list machines");
                return;
            }
        };

        let now = chrono::Utc::now().timestamp();
        let mut online_count = 0i64;
        let mut offline_count = 0i64;

        for machine in machines {
            let new_status = self.machines.compute_status(machine.last_seen, now);
            if new_status == "online" {
                online_count += 1;
            } else {
                offline_count += 1;
            }

            if new_status == machine.status {
                continue;
            }

            match (machine.status.as_str(), new_status) {
                ("online", "offline") => self.handle_online_to_offline(&machine, now).await,
                ("offline", "online") => self.handle_offline_to_online(&machine).await,
                (_, new_status) => {
                    if let Err(e) = self.db.machines().set_status(machine.id, new_status).await {
                        tracing::error!(error = %e, machine_id = machine.id, "failed to persist machine status");
                    }
                }
            }
        }

        crate::metrics::MACHINES_ONLINE.set(online_count);
        crate::metrics::MACHINES_OFFLINE.set(offline_count);
    }

    async fn handle_online_to_offline(&self, machine: &crate::db::machines::Machine, now: i64) {
        if let Err(e) = self.db.machines().set_status(machine.id, "offline").await {
            tracing::error!(error = %e, machine_id = machine.id, "failed to persist offline status");
            return;
        }

        // Absent, or stale past the offline threshold (e.g. a crash before
        // the matching online recovery could clear it): either way, this
        // streak has not yet had a fresh notification sent.
        let should_notify = match self.db.offline_notifications().notified_at(machine.id).await {
            Ok(None) => true,
            Ok(Some(notified_at)) => now - notified_at > self.machines.offline_threshold_secs(),
            Err(e) => {
                tracing::error!(error = %e, machine_id = machine.id, "failed to read offline-notification state");
                false
            }
        };

        if !should_notify {
            return;
        }

        crate::metrics::MACHINES_WENT_OFFLINE.inc();
        let delivered = self
            .notifier
            .dispatch(NotificationEvent::MachineOffline { machine: machine.clone() })
            .await;

        if !delivered {
            tracing::warn!(machine_id = machine.id, "offline notification dispatch failed, will retry next sweep");
            return;
        }

        if let Err(e) = self.db.offline_notifications().mark_notified(machine.id, now).await {
            tracing::error!(error = %e, machine_id = machine.id, "failed to record offline notification");
        }
    }

    async fn handle_offline_to_online(&self, machine: &crate::db::machines::Machine) {
        if let Err(e) = self.db.machines().set_status(machine.id, "online").await {
            tracing::error!(error = %e, machine_id = machine.id, "failed to persist online status");
            return;
        }

        if let Err(e) = self.db.offline_notifications().clear(machine.id).await {
            tracing::error!(error = %e, machine_id = machine.id, "failed to clear offline-notification state");
        }

        crate::metrics::MACHINES_RECOVERED.inc();
        let _ = self
            .notifier
            .dispatch(NotificationEvent::MachineOnline { machine: machine.clone() })
            .await;
    }
}
