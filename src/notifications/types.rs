//! Outbound notification event and wire-payload types (`spec.md` Sec. 4.7).

use crate::db::alert_events::AlertEvent;
use crate::db::alert_rules::AlertRule;
use crate::db::machines::Machine;
use serde::Serialize;

/// An event the dispatcher fans out to a user's active channels. Alert
/// events come from the evaluator; machine lifecycle events come from the
/// heartbeat monitor.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    Alert { rule: AlertRule, event: AlertEvent },
    MachineOffline { machine: Machine },
    MachineOnline { machine: Machine },
}

impl NotificationEvent {
    pub fn owner_user_id(&self) -> i64 {
        match self {
            NotificationEvent::Alert { rule, .. } => rule.user_id,
            NotificationEvent::MachineOffline { machine } | NotificationEvent::MachineOnline { machine } => {
                machine.user_id
            }
        }
    }

    fn event_type(&self) -> &'static str {
        match self {
            NotificationEvent::Alert { .. } => "alert",
            NotificationEvent::MachineOffline { .. } => "machine.offline",
            NotificationEvent::MachineOnline { .. } => "machine.online",
        }
    }
}

#[derive(Serialize)]
struct RulePayload {
    id: i64,
    name: String,
}

#[derive(Serialize)]
struct EventPayload {
    id: i64,
    rule_id: i64,
    machine_id: i64,
    value: f64,
    triggered_at: String,
}

#[derive(Serialize)]
struct MachinePayload {
    id: i64,
    name: String,
    hostname: String,
}

/// The JSON body delivered to webhooks (`spec.md` Sec. 4.7 "Payload").
#[derive(Serialize)]
pub struct WebhookPayload {
    rule: Option<RulePayload>,
    event: Option<EventPayload>,
    machine: Option<MachinePayload>,
    event_type: &'static str,
    timestamp: String,
}

impl WebhookPayload {
    pub fn from_event(event: &NotificationEvent) -> Self {
        let timestamp = chrono::Utc::now().to_rfc3339();
        match event {
            NotificationEvent::Alert { rule, event: alert_event } => WebhookPayload {
                rule: Some(RulePayload { id: rule.id, name: rule.name.clone() }),
                event: Some(EventPayload {
                    id: alert_event.id,
                    rule_id: alert_event.rule_id,
                    machine_id: alert_event.machine_id,
                    value: alert_event.value,
                    triggered_at: timestamp_from_unix(alert_event.triggered_at),
                }),
                machine: None,
                event_type: "alert",
                timestamp,
            },
            NotificationEvent::MachineOffline { machine } | NotificationEvent::MachineOnline { machine } => {
                WebhookPayload {
                    rule: None,
                    event: None,
                    machine: Some(MachinePayload {
                        id: machine.id,
                        name: machine.name.clone(),
                        hostname: machine.hostname.clone(),
                    }),
                    event_type: event.event_type(),
                    timestamp,
                }
            }
        }
    }
}

fn timestamp_from_unix(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

/// Render a short Markdown message for the chat channel, per recipient
/// (`spec.md` Sec. 4.7 "Chat channel").
pub fn render_chat_message(event: &NotificationEvent) -> String {
    match event {
        NotificationEvent::Alert { rule, event: alert_event } => format!(
            "*Alert: {}*\nmetric: `{}` {} {:.1}\nvalue: `{:.1}`\ntime: {}",
            rule.name,
            rule.metric.as_str(),
            rule.comparison.as_str(),
            rule.threshold_pct,
            alert_event.value,
            timestamp_from_unix(alert_event.triggered_at),
        ),
        NotificationEvent::MachineOffline { machine } => {
            format!("*{}* went offline\nhostname: `{}`", machine.name, machine.hostname)
        }
        NotificationEvent::MachineOnline { machine } => {
            format!("*{}* is back online\nhostname: `{}`", machine.name, machine.hostname)
        }
    }
}
