//! Chat-channel delivery to an opaque external chat platform (modeled on
//! Telegram's bot API), gated on a process-wide bot token (`spec.md`
//! Sec. 4.7 "Chat channel").

use super::types::{NotificationEvent, render_chat_message};
use crate::db::chat_recipients::ChatRecipient;
use crate::db::Database;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const FAILURE_WINDOW_SECS: i64 = 10 * 60;
const FAILURE_THRESHOLD: i64 = 3;
const COOLDOWN_SECS: i64 = 15 * 60;

#[derive(Debug)]
pub enum DispatchOutcome {
    Delivered,
    CoolingDown { retry_after_secs: i64 },
    Failed,
    /// No `TELEGRAM_BOT_TOKEN` configured process-wide.
    NotConfigured,
}

#[derive(Debug)]
enum AttemptOutcome {
    Success,
    Transient,
    Terminal,
}

/// Dispatches chat messages using a process-wide bot credential. `None`
/// when the environment did not provide one: CRUD on recipients still
/// works, but sends return `NotConfigured` (surfaced as 503).
pub struct ChatDispatcher {
    client: reqwest::Client,
    bot_token: Option<String>,
}

impl ChatDispatcher {
    pub fn new(bot_token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("lunasentri/1.0")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, bot_token }
    }

    pub fn is_configured(&self) -> bool {
        self.bot_token.is_some()
    }

    pub async fn deliver(
        &self,
        db: &Database,
        recipient: &ChatRecipient,
        event: &NotificationEvent,
    ) -> DispatchOutcome {
        let Some(bot_token) = &self.bot_token else {
            return DispatchOutcome::NotConfigured;
        };

        let now = chrono::Utc::now().timestamp();
        if let Some(cooldown_until) = recipient.cooldown_until
            && now < cooldown_until
        {
            return DispatchOutcome::CoolingDown { retry_after_secs: cooldown_until - now };
        }

        let message = render_chat_message(event);

        match self.send_with_retries(bot_token, &recipient.chat_id, &message).await {
            AttemptOutcome::Success => {
                if let Err(e) = db.chat_recipients().record_success(recipient.id, now).await {
                    tracing::error!(error = %e, recipient_id = recipient.id, "failed to record chat success");
                }
                DispatchOutcome::Delivered
            }
            _ => {
                self.record_failure(db, recipient, now).await;
                DispatchOutcome::Failed
            }
        }
    }

    pub async fn test(
        &self,
        db: &Database,
        recipient: &ChatRecipient,
    ) -> Result<DispatchOutcome, DispatchOutcome> {
        if !self.is_configured() {
            return Err(DispatchOutcome::NotConfigured);
        }

        let now = chrono::Utc::now().timestamp();
        if let Some(cooldown_until) = recipient.cooldown_until
            && now < cooldown_until
        {
            return Err(DispatchOutcome::CoolingDown { retry_after_secs: cooldown_until - now });
        }

        if let Err(e) = db.chat_recipients().touch_attempt(recipient.id, now).await {
            tracing::error!(error = %e, recipient_id = recipient.id, "failed to record chat test attempt");
        }

        let test_event = NotificationEvent::MachineOnline {
            machine: crate::db::machines::Machine {
                id: 0,
                user_id: recipient.user_id,
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

        Ok(self.deliver(db, recipient, &test_event).await)
    }

    async fn record_failure(&self, db: &Database, recipient: &ChatRecipient, now: i64) {
        let in_window = recipient.last_error_at.is_some_and(|t| now - t <= FAILURE_WINDOW_SECS);
        let failure_count = if in_window { recipient.failure_count + 1 } else { 1 };
        let cooldown_until = (failure_count >= FAILURE_THRESHOLD).then_some(now + COOLDOWN_SECS);

        if let Err(e) = db
            .chat_recipients()
            .record_failure(recipient.id, now, failure_count, cooldown_until)
            .await
        {
            tracing::error!(error = %e, recipient_id = recipient.id, "failed to record chat failure");
        }
    }

    async fn send_with_retries(&self, bot_token: &str, chat_id: &str, message: &str) -> AttemptOutcome {
        for attempt in 0..MAX_ATTEMPTS {
            match self.attempt(bot_token, chat_id, message).await {
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

    async fn attempt(&self, bot_token: &str, chat_id: &str, message: &str) -> AttemptOutcome {
        let url = format!("https://api.telegram.org/bot{bot_token}/sendMessage");
        let request = self.client.post(&url).json(&serde_json::json!({
            "chat_id": chat_id,
            "text": message,
            "parse_mode": "Markdown",
        }));

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
