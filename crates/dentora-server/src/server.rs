//! Router assembly, backend selection, and the server lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use dentora_db_memory::InMemoryStorage;
use dentora_db_postgres::{PostgresNotificationQueue, PostgresStorage};
use dentora_notifications::{
    InMemoryNotificationQueue, NotificationProcessor, NotificationQueueStorage, ReminderScheduler,
    TemplateRenderer,
};
use dentora_storage::ClinicStorage;

use crate::config::{AppConfig, NotificationsConfig, StorageBackend};
use crate::middleware::{self as app_middleware, AuthState};
use crate::reminders::StorageReminderSource;
use crate::routes;
use crate::state::AppState;

/// Builds the full application router over the given state.
pub fn build_app(state: AppState, cfg: &AppConfig) -> Router {
    let auth = AuthState::from_config(&cfg.auth);
    let body_limit = cfg.server.body_limit_bytes;

    Router::new()
        // Health and info
        .route("/", get(routes::system::root))
        .route("/healthz", get(routes::system::healthz))
        .route("/readyz", get(routes::system::readyz))
        // Patients
        .route(
            "/patients",
            get(routes::patients::list_patients).post(routes::patients::create_patient),
        )
        .route(
            "/patients/{id}",
            get(routes::patients::get_patient)
                .put(routes::patients::update_patient)
                .delete(routes::patients::delete_patient),
        )
        // Budgets and their lifecycle
        .route(
            "/budgets",
            get(routes::budgets::list_budgets).post(routes::budgets::create_budget),
        )
        .route(
            "/budgets/{id}",
            get(routes::budgets::get_budget)
                .put(routes::budgets::update_budget)
                .delete(routes::budgets::delete_budget),
        )
        .route("/budgets/{id}/activate", post(routes::budgets::activate_budget))
        .route("/budgets/{id}/complete", post(routes::budgets::complete_budget))
        .route("/budgets/{id}/revert", post(routes::budgets::revert_budget))
        .route("/budgets/{id}/document", get(routes::documents::budget_html))
        // Treatment sessions
        .route(
            "/treatments",
            get(routes::treatments::list_sessions).post(routes::treatments::create_session),
        )
        .route(
            "/treatments/{id}",
            get(routes::treatments::get_session)
                .put(routes::treatments::update_session)
                .delete(routes::treatments::delete_session),
        )
        .route(
            "/treatments/{id}/complete",
            post(routes::treatments::complete_session),
        )
        .route(
            "/treatments/{id}/cancel",
            post(routes::treatments::cancel_session),
        )
        .route(
            "/treatments/{id}/calendar.ics",
            get(routes::documents::session_ics),
        )
        // Schedule blocks
        .route(
            "/schedule-blocks",
            get(routes::schedule_blocks::list_blocks).post(routes::schedule_blocks::create_block),
        )
        .route(
            "/schedule-blocks/conflicts",
            get(routes::schedule_blocks::check_conflicts),
        )
        .route(
            "/schedule-blocks/{id}",
            delete(routes::schedule_blocks::delete_block),
        )
        // Prescriptions
        .route(
            "/prescriptions",
            get(routes::prescriptions::list_prescriptions)
                .post(routes::prescriptions::create_prescription),
        )
        .route(
            "/prescriptions/{id}",
            get(routes::prescriptions::get_prescription)
                .delete(routes::prescriptions::delete_prescription),
        )
        .route(
            "/prescriptions/{id}/document",
            get(routes::documents::prescription_html),
        )
        // Catalog
        .route(
            "/services",
            get(routes::catalog::list_services).post(routes::catalog::create_service),
        )
        .route(
            "/services/{id}",
            get(routes::catalog::get_service)
                .put(routes::catalog::update_service)
                .delete(routes::catalog::delete_service),
        )
        .route(
            "/locations",
            get(routes::catalog::list_locations).post(routes::catalog::create_location),
        )
        .route(
            "/locations/{id}",
            get(routes::catalog::get_location).delete(routes::catalog::delete_location),
        )
        .route(
            "/doctors",
            get(routes::catalog::list_doctors).post(routes::catalog::create_doctor),
        )
        .route("/doctors/{id}", get(routes::catalog::get_doctor))
        // Notification queue
        .route(
            "/notifications",
            get(routes::notifications::list_notifications)
                .post(routes::notifications::enqueue_notification),
        )
        .route(
            "/notifications/stats",
            get(routes::notifications::notification_stats),
        )
        .route(
            "/notifications/{id}/cancel",
            post(routes::notifications::cancel_notification),
        )
        // Reports
        .route("/reports/revenue", get(routes::reports::revenue))
        // Middleware stack, innermost first; layers added later run earlier.
        .layer(middleware::from_fn_with_state(
            auth,
            app_middleware::authentication_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = tracing::field::Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        // Outside the trace layer: the span reads the request-id extension,
        // so the id must be set before the span is created.
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

pub struct ServerBuilder {
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Connects the storage backend, assembles the router, and starts the
    /// configured background workers.
    pub async fn build(self) -> anyhow::Result<DentoraServer> {
        let cfg = self.config;

        let (storage, queue): (Arc<dyn ClinicStorage>, Arc<dyn NotificationQueueStorage>) =
            match cfg.storage.backend {
                StorageBackend::Memory => {
                    tracing::info!("using in-memory storage backend");
                    (
                        Arc::new(InMemoryStorage::new()),
                        Arc::new(InMemoryNotificationQueue::new()),
                    )
                }
                StorageBackend::Postgres => {
                    let pg = cfg
                        .storage
                        .postgres
                        .as_ref()
                        .ok_or_else(|| anyhow::anyhow!("postgres backend requires [storage.postgres]"))?;
                    let storage = PostgresStorage::connect(pg).await?;
                    let queue = PostgresNotificationQueue::new(storage.pool().clone());
                    tracing::info!("connected to PostgreSQL storage backend");
                    (Arc::new(storage), Arc::new(queue))
                }
            };

        let state = AppState {
            storage: storage.clone(),
            queue: queue.clone(),
            clinic_name: cfg.notifications.clinic_name.clone(),
        };

        let background = start_background_workers(&cfg.notifications, storage, queue)?;
        let app = build_app(state, &cfg);

        Ok(DentoraServer {
            addr: cfg.addr(),
            app,
            background,
        })
    }
}

/// Starts the notification processor and reminder scheduler when enabled.
fn start_background_workers(
    cfg: &NotificationsConfig,
    storage: Arc<dyn ClinicStorage>,
    queue: Arc<dyn NotificationQueueStorage>,
) -> anyhow::Result<Vec<tokio::task::JoinHandle<()>>> {
    let mut tasks = Vec::new();
    if !cfg.enabled {
        return Ok(tasks);
    }

    let mut processor =
        NotificationProcessor::new(queue.clone(), Arc::new(TemplateRenderer::with_defaults()))
            .with_webhook(cfg.webhook.clone());
    if let Some(email) = &cfg.email {
        processor = processor
            .with_email(email)
            .map_err(|e| anyhow::anyhow!("email channel configuration: {e}"))?;
    }
    let poll = Duration::from_secs(cfg.poll_interval_secs);
    tasks.push(tokio::spawn(Arc::new(processor).run(poll)));

    if cfg.reminders.enabled {
        let scheduler = ReminderScheduler::new(
            Arc::new(StorageReminderSource::new(storage)),
            queue,
            cfg.clinic_name.clone(),
            cfg.reminders.days_ahead,
        );
        let scan = Duration::from_secs(cfg.reminders.scan_interval_secs);
        tasks.push(tokio::spawn(Arc::new(scheduler).run(scan)));
    }
    Ok(tasks)
}

pub struct DentoraServer {
    addr: SocketAddr,
    app: Router,
    background: Vec<tokio::task::JoinHandle<()>>,
}

impl DentoraServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        for task in self.background {
            task.abort();
        }
        tracing::info!("server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
