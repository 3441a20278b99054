//! Webhook delivery: HMAC signing, retry/backoff, and the per-webhook
//! circuit breaker (`spec.md` Sec. 4.7).
//!
//! The retry loop and `reqwest::Client` construction follow the teacher's
//! `RblService` (timeout + user agent builder, `tokio::time::timeout`
//! around each attempt); the circuit-breaker bookkeeping is new.

use super::types::{NotificationEvent, WebhookPayload};
use crate::db::webhooks::Webhook;
use crate::db::Database;
use crate::security::tokens;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const FAILURE_WINDOW_SECS: i64 = 10 * 60;
const FAILURE_THRESHOLD: i64 = 3;
const COOLDOWN_SECS: i64 = 15 * 60;
const MIN_TEST_INTERVAL_SECS: i64 = 30;

#[derive(Debug)]
pub enum DispatchOutcome {
    Delivered,
    /// The webhook is currently cooling down; no attempt was made.
    CoolingDown { retry_after_secs: i64 },
    Failed,
}

#[derive(Debug)]
enum AttemptOutcome {
    Success,
    Transient,
    Terminal,
}

pub struct WebhookDispatcher {
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("lunasentri/1.0")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    /// Deliver `event` to `webhook`, honoring the circuit breaker and
    /// updating its health counters. Never returns an `Err` that should
    /// fail the caller — ingestion/heartbeat callers only care whether
    /// delivery happened, not how.
    pub async fn deliver(&self, db: &Database, webhook: &Webhook, event: &NotificationEvent) -> DispatchOutcome {
        let now = chrono::Utc::now().timestamp();
        if let Some(cooldown_until) = webhook.cooldown_until
            && now < cooldown_until
        {
            return DispatchOutcome::CoolingDown { retry_after_secs: cooldown_until - now };
        }

        let payload = WebhookPayload::from_event(event);
        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, webhook_id = webhook.id, "failed to serialize webhook payload");
                return DispatchOutcome::Failed;
            }
        };
        let signature = tokens::hmac_sha256_hex(&webhook.secret_plaintext, &body);

        match self.send_with_retries(&webhook.url, &body, &signature).await {
            AttemptOutcome::Success => {
                if let Err(e) = db.webhooks().record_success(webhook.id, now).await {
                    tracing::error!(error = %e, webhook_id = webhook.id, "failed to record webhook success");
                }
                DispatchOutcome::Delivered
            }
            _ => {
                self.record_failure(db, webhook, now).await;
                DispatchOutcome::Failed
            }
        }
    }

    /// A user-triggered test send, rate-limited independently of the
    /// retry/circuit-breaker accounting (`spec.md` Sec. 4.7 "Rate limit on
    /// user-triggered tests").
    pub async fn test(&self, db: &Database, webhook: &Webhook) -> Result<DispatchOutcome, DispatchOutcome> {
        let now = chrono::Utc::now().timestamp();

        if let Some(cooldown_until) = webhook.cooldown_until
            && now < cooldown_until
        {
            return Err(DispatchOutcome::CoolingDown { retry_after_secs: cooldown_until - now });
        }

        if let Some(last_attempt) = webhook.last_attempt_at
            && now - last_attempt < MIN_TEST_INTERVAL_SECS
        {
            return Err(DispatchOutcome::CoolingDown {
                retry_after_secs: MIN_TEST_INTERVAL_SECS - (now - last_attempt),
            });
        }

        if let Err(e) = db.webhooks().touch_attempt(webhook.id, now).await {
            tracing::error!(error = %e, webhook_id = webhook.id, "failed to record webhook test attempt");
        }

        let test_event = NotificationEvent::MachineOnline {
            machine: crate::db::machines::Machine {
                id: 0,
                user_id: webhook.user_id,
                name: "test".into(),
                hostname: "test".into(),
                description: String::new(),
                is_enabled: true,
                status: "online".into(),
                last_seen: now,
                platform: None,
                platform_version: None,
                kernel_version: None,
                cpu_cores: None,
                memory_total_mb: None,
                disk_total_gb: None,
                last_boot_time: None,
                created_at: now,
            },
        };

        Ok(self.deliver(db, webhook, &test_event).await)
    }

    async fn record_failure(&self, db: &Database, webhook: &Webhook, now: i64) {
        let in_window = webhook.last_error_at.is_some_and(|t| now - t <= FAILURE_WINDOW_SECS);
        let failure_count = if in_window { webhook.failure_count + 1 } else { 1 };
        let cooldown_until = (failure_count >= FAILURE_THRESHOLD).then_some(now + COOLDOWN_SECS);

        if let Err(e) = db.webhooks().record_failure(webhook.id, now, failure_count, cooldown_until).await {
            tracing::error!(error = %e, webhook_id = webhook.id, "failed to record webhook failure");
        }
    }

    async fn send_with_retries(&self, url: &str, body: &[u8], signature: &str) -> AttemptOutcome {
        for attempt in 0..MAX_ATTEMPTS {
            match self.attempt(url, body, signature).await {
                AttemptOutcome::Success => return AttemptOutcome::Success,
                AttemptOutcome::Terminal => return AttemptOutcome::Terminal,
                AttemptOutcome::Transient => {
                    if attempt + 1 < MAX_ATTEMPTS {
                        tokio::time::sleep(BACKOFF_BASE * 2u32.pow(attempt)).await;
                    }
                }
            }
        }
        AttemptOutcome::Transient
    }

    async fn attempt(&self, url: &str, body: &[u8], signature: &str) -> AttemptOutcome {
        let request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-LunaSentri-Signature", format!("sha256={signature}"))
            .body(body.to_vec());

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    AttemptOutcome::Success
                } else if status.is_server_error() || status.as_u16() == 429 {
                    AttemptOutcome::Transient
                } else {
                    AttemptOutcome::Terminal
                }
            }
            Err(e) => {
                if e.is_timeout() || e.is_connect() {
                    AttemptOutcome::Transient
                } else {
                    AttemptOutcome::Terminal
                }
            }
        }
    }
}

impl Default for WebhookDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
