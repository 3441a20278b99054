//! Alert rule evaluation with consecutive-sample debouncing (`spec.md`
//! Sec. 4.6). Generalizes the teacher's `DashMap`-keyed `RateLimitManager`
//! (per-IP counters guarded by a per-entry lock) into per-`(rule_id,
//! machine_id)` arming state.

use crate::db::alert_events::AlertEvent;
use crate::db::alert_rules::AlertRule;
use crate::db::samples::MetricsSample;
use crate::db::{Database, DbError};
use dashmap::DashMap;
use tokio::sync::Mutex;

/// Per-`(rule_id, machine_id)` debounce state (`spec.md` Sec. 3
/// "AlertEvaluatorState"). `armed=true` means the next qualifying streak
/// may fire.
#[derive(Debug, Clone, Copy, Default)]
struct EvaluatorState {
    consecutive_hits: i64,
    armed: bool,
}

impl EvaluatorState {
    fn initial() -> Self {
        Self { consecutive_hits: 0, armed: true }
    }
}

/// Anything the evaluator hands off to the dispatcher after persisting an
/// event; kept deliberately thin so the dispatcher stays decoupled from
/// storage types.
#[derive(Debug, Clone)]
pub struct EmittedAlert {
    pub event: AlertEvent,
    pub rule: AlertRule,
}

/// Applies every rule owned by a sample's machine's owner against that
/// sample, serializing state transitions per `(rule_id, machine_id)` so
/// concurrent samples for the same machine never interleave an
/// evaluator's `consecutive_hits`/`armed` update (`spec.md` Sec. 5
/// ordering guarantees).
pub struct AlertEvaluator {
    db: Database,
    state: DashMap<(i64, i64), Mutex<EvaluatorState>>,
}

impl AlertEvaluator {
    pub fn new(db: Database) -> Self {
        Self { db, state: DashMap::new() }
    }

    /// Evaluate all of the machine owner's rules against `sample`, emitting
    /// and persisting an `AlertEvent` for each rule whose debounce policy
    /// is satisfied. Returns the events emitted so the caller (ingestion)
    /// can hand them to the notification dispatcher; storage errors for
    /// one rule do not abort evaluation of the others.
    pub async fn evaluate(&self, machine_id: i64, sample: &MetricsSample) -> Vec<EmittedAlert> {
        let rules = match self.db.alert_rules().list_for_machine_owner(machine_id).await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!(error = %e, machine_id, "failed to load alert rules for evaluation");
                return Vec::new();
            }
        };

        let mut emitted = Vec::new();
        for rule in rules {
            match self.evaluate_rule(&rule, machine_id, sample).await {
                Ok(Some(event)) => emitted.push(EmittedAlert { event, rule }),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, rule_id = rule.id, machine_id, "alert rule evaluation failed");
                }
            }
        }
        emitted
    }

    async fn evaluate_rule(
        &self,
        rule: &AlertRule,
        machine_id: i64,
        sample: &MetricsSample,
    ) -> Result<Option<AlertEvent>, DbError> {
        let value = match rule.metric {
            crate::db::alert_rules::Metric::CpuPct => sample.cpu_pct,
            crate::db::alert_rules::Metric::MemUsedPct => sample.mem_used_pct,
            crate::db::alert_rules::Metric::DiskUsedPct => sample.disk_used_pct,
        };

        let key = (rule.id, machine_id);
        let lock = self
            .state
            .entry(key)
            .or_insert_with(|| Mutex::new(EvaluatorState::initial()));
        let mut state = lock.lock().await;

        if rule.comparison.holds(value, rule.threshold_pct) {
            state.consecutive_hits += 1;
            if state.consecutive_hits >= rule.trigger_after && state.armed {
                state.armed = false;
                let event = self
                    .db
                    .alert_events()
                    .create(rule.id, machine_id, value, sample.recorded_at)
                    .await?;
                return Ok(Some(event));
            }
        } else {
            state.consecutive_hits = 0;
            state.armed = true;
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::alert_rules::{Comparison, Metric, NewAlertRule};
    use crate::db::samples::NewSample;

    async fn setup() -> (AlertEvaluator, Database, i64, i64) {
        let db = Database::connect(":memory:").await.unwrap();
        let user = db.users().create("a@example.com", "hash", true).await.unwrap();
        let machine = db.machines().create(user.id, "web-01", "web-01.local", "").await.unwrap();
        db.alert_rules()
            .create(
                user.id,
                NewAlertRule {
                    name: "cpu-hot".into(),
                    metric: Metric::CpuPct,
                    comparison: Comparison::Above,
                    threshold_pct: 80.0,
                    trigger_after: 3,
                },
            )
            .await
            .unwrap();
        (AlertEvaluator::new(db.clone()), db, user.id, machine.id)
    }

    fn sample(machine_id: i64, cpu_pct: f64, recorded_at: i64) -> MetricsSample {
        MetricsSample {
            id: 0,
            machine_id,
            cpu_pct,
            mem_used_pct: 0.0,
            disk_used_pct: 0.0,
            net_rx_bytes: None,
            net_tx_bytes: None,
            uptime_seconds: None,
            recorded_at,
        }
    }

    #[tokio::test]
    async fn fires_once_per_excursion_per_scenario_two() {
        let (evaluator, _db, _user, machine_id) = setup().await;
        let readings = [70.0, 85.0, 90.0, 95.0, 92.0, 60.0, 88.0, 90.0, 91.0];

        let mut fired_values = Vec::new();
        for (i, cpu) in readings.iter().enumerate() {
            let s = sample(machine_id, *cpu, i as i64);
            let emitted = evaluator.evaluate(machine_id, &s).await;
            fired_values.extend(emitted.into_iter().map(|e| e.event.value));
        }

        assert_eq!(fired_values, vec![95.0, 91.0]);
    }

    #[tokio::test]
    async fn does_not_fire_before_trigger_after_consecutive_hits() {
        let (evaluator, _db, _user, machine_id) = setup().await;
        for (i, cpu) in [85.0, 90.0].iter().enumerate() {
            let s = sample(machine_id, *cpu, i as i64);
            assert!(evaluator.evaluate(machine_id, &s).await.is_empty());
        }
    }

    #[tokio::test]
    async fn event_preserves_sample_timestamp_not_wall_clock() {
        let (evaluator, _db, _user, machine_id) = setup().await;
        for (i, cpu) in [85.0, 90.0, 95.0].iter().enumerate() {
            let s = sample(machine_id, *cpu, 1_000 + i as i64);
            let emitted = evaluator.evaluate(machine_id, &s).await;
            if let Some(first) = emitted.first() {
                assert_eq!(first.event.triggered_at, 1_002);
            }
        }
    }

    #[tokio::test]
    async fn exact_threshold_does_not_trigger() {
        let (evaluator, db, user, machine_id) = setup().await;
        db.alert_rules()
            .create(
                user,
                NewAlertRule {
                    name: "cpu-exact".into(),
                    metric: Metric::CpuPct,
                    comparison: Comparison::Above,
                    threshold_pct: 80.0,
                    trigger_after: 1,
                },
            )
            .await
            .unwrap();

        let s = sample(machine_id, 80.0, 0);
        let emitted = evaluator.evaluate(machine_id, &s).await;
        // First rule (threshold 80, trigger_after 3) and second rule
        // (threshold 80, trigger_after 1) both see exactly 80.0, which
        // never satisfies a strict `above` predicate.
        assert!(emitted.is_empty());
    }
}
