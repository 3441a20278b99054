//! Notification dispatch: composite fan-out to every active webhook and
//! chat recipient owned by an event's user (`spec.md` Sec. 4.7).

pub mod chat;
pub mod types;
pub mod webhook;

use crate::db::Database;
pub use types::NotificationEvent;

/// Process-wide singleton that fans a single event out to all of a user's
/// active channels in parallel, aggregating failures for logging only —
/// no channel's failure affects another (`spec.md` Sec. 4.7 "Composite
/// notifier").
pub struct CompositeNotifier {
    db: Database,
    webhooks: webhook::WebhookDispatcher,
    chat: chat::ChatDispatcher,
}

impl CompositeNotifier {
    pub fn new(db: Database, telegram_bot_token: Option<String>) -> Self {
        Self {
            db,
            webhooks: webhook::WebhookDispatcher::new(),
            chat: chat::ChatDispatcher::new(telegram_bot_token),
        }
    }

    pub fn webhooks(&self) -> &webhook::WebhookDispatcher {
        &self.webhooks
    }

    pub fn chat(&self) -> &chat::ChatDispatcher {
        &self.chat
    }

    /// Dispatch `event` to every active channel owned by the event's user.
    /// Failures are logged per-channel; this call never fails, matching
    /// the spec's "dispatcher failures never fail the event-emitting
    /// caller" contract (Sec. 7). Returns `true` only if every channel
    /// that was actually attempted delivered successfully — callers that
    /// must retry on failure (e.g. the heartbeat monitor's offline/online
    /// notifications, `spec.md` Sec. 4.5) gate their own bookkeeping on
    /// this.
    pub async fn dispatch(&self, event: NotificationEvent) -> bool {
        let user_id = event.owner_user_id();

        let webhooks = match self.db.webhooks().list_active_by_user(user_id).await {
            Ok(webhooks) => webhooks,
            Err(e) => {
                tracing::error!(error = %e, user_id, "failed to load active webhooks for dispatch");
                return false;
            }
        };
        let chat_recipients = match self.db.chat_recipients().list_active_by_user(user_id).await {
            Ok(recipients) => recipients,
            Err(e) => {
                tracing::error!(error = %e, user_id, "failed to load active chat recipients for dispatch");
                return false;
            }
        };

        let webhook_deliveries = futures_util::future::join_all(webhooks.iter().map(|hook| async {
            let outcome = self.webhooks.deliver(&self.db, hook, &event).await;
            match outcome {
                webhook::DispatchOutcome::Delivered => {
                    crate::metrics::WEBHOOK_DELIVERIES_SUCCEEDED.inc();
                    true
                }
                webhook::DispatchOutcome::Failed => {
                    crate::metrics::WEBHOOK_DELIVERIES_FAILED.inc();
                    tracing::warn!(webhook_id = hook.id, "webhook delivery failed");
                    false
                }
                webhook::DispatchOutcome::CoolingDown { .. } => true,
            }
        }));
        let chat_deliveries = futures_util::future::join_all(chat_recipients.iter().map(|recipient| async {
            let outcome = self.chat.deliver(&self.db, recipient, &event).await;
            match outcome {
                chat::DispatchOutcome::Delivered => {
                    crate::metrics::CHAT_DELIVERIES_SUCCEEDED.inc();
                    true
                }
                chat::DispatchOutcome::Failed => {
                    crate::metrics::CHAT_DELIVERIES_FAILED.inc();
                    tracing::warn!(recipient_id = recipient.id, "chat delivery failed");
                    false
                }
                chat::DispatchOutcome::CoolingDown { .. } | chat::DispatchOutcome::NotConfigured => true,
            }
        }));

        let (webhook_results, chat_results) = tokio::join!(webhook_deliveries, chat_deliveries);
        webhook_results.into_iter().all(|ok| ok) && chat_results.into_iter().all(|ok| ok)
    }
}
