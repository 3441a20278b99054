//! Shared application state: the process-wide singletons from `spec.md`
//! Sec. 9 ("Global state"), cloned cheaply into every handler.

use crate::auth::AuthService;
use crate::db::Database;
use crate::ingestion::IngestionService;
use crate::machines::MachineService;
use crate::notifications::CompositeNotifier;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub auth: AuthService,
    pub machines: MachineService,
    pub ingestion: Arc<IngestionService>,
    pub notifier: Arc<CompositeNotifier>,
    pub secure_cookie: bool,
    pub cors_allowed_origin: Option<String>,
    pub local_host_metrics: bool,
}
