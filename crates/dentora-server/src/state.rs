//! Shared application state handed to every handler.

use std::sync::Arc;

use dentora_notifications::NotificationQueueStorage;
use dentora_storage::ClinicStorage;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn ClinicStorage>,
    pub queue: Arc<dyn NotificationQueueStorage>,
    pub clinic_name: String,
}
