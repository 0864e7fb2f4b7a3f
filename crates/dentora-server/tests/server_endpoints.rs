use std::sync::Arc;

use dentora_db_memory::InMemoryStorage;
use dentora_notifications::InMemoryNotificationQueue;
use dentora_server::{AppConfig, AppState, AuthConfig, build_app};
use serde_json::{Value, json};
use tokio::task::JoinHandle;

fn test_state() -> AppState {
    AppState {
        storage: Arc::new(InMemoryStorage::new()),
        queue: Arc::new(InMemoryNotificationQueue::new()),
        clinic_name: "Dentora".to_string(),
    }
}

async fn start_server(cfg: AppConfig) -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let app = build_app(test_state(), &cfg);

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tx, server)
}

async fn post_json(client: &reqwest::Client, url: String, body: Value) -> (u16, Value) {
    let resp = client.post(url).json(&body).send().await.unwrap();
    let status = resp.status().as_u16();
    let body: Value = resp.json().await.unwrap();
    (status, body)
}

async fn get_json(client: &reqwest::Client, url: String) -> (u16, Value) {
    let resp = client.get(url).send().await.unwrap();
    let status = resp.status().as_u16();
    let body: Value = resp.json().await.unwrap();
    (status, body)
}

/// Seeds a doctor and a patient, returning their ids.
async fn seed_doctor_and_patient(client: &reqwest::Client, base: &str) -> (String, String) {
    let (status, doctor) = post_json(
        client,
        format!("{base}/doctors"),
        json!({"full_name": "Dr. Laura Pérez"}),
    )
    .await;
    assert_eq!(status, 201);
    let doctor_id = doctor["id"].as_str().unwrap().to_string();

    let (status, patient) = post_json(
        client,
        format!("{base}/patients"),
        json!({
            "first_name": "Ana",
            "last_name": "García",
            "email": "ana@example.com",
            "doctor_id": doctor_id,
        }),
    )
    .await;
    assert_eq!(status, 201);
    let patient_id = patient["id"].as_str().unwrap().to_string();
    (doctor_id, patient_id)
}

#[tokio::test]
async fn system_endpoints_work() {
    let (base, shutdown_tx, handle) = start_server(AppConfig::default()).await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, format!("{base}/")).await;
    assert_eq!(status, 200);
    assert_eq!(body["service"], "Dentora Server");
    assert_eq!(body["status"], "ok");

    let (status, body) = get_json(&client, format!("{base}/healthz")).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");

    let (status, body) = get_json(&client, format!("{base}/readyz")).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ready");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn budget_lifecycle_over_http() {
    let (base, shutdown_tx, handle) = start_server(AppConfig::default()).await;
    let client = reqwest::Client::new();
    let (doctor_id, patient_id) = seed_doctor_and_patient(&client, &base).await;

    // Create a draft with two items; totals are computed server-side.
    let (status, budget) = post_json(
        &client,
        format!("{base}/budgets"),
        json!({
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "title": "Implant plan",
            "items": [
                {"description": "Implant", "quantity": 2, "unit_price_cents": 90_000},
                {"description": "Cleaning", "quantity": 1, "unit_price_cents": 6_000},
            ],
        }),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(budget["status"], "draft");
    assert_eq!(budget["total_cents"], 186_000);
    let budget_id = budget["id"].as_str().unwrap().to_string();

    // Draft cannot be completed.
    let (status, _) = post_json(
        &client,
        format!("{base}/budgets/{budget_id}/complete"),
        json!({}),
    )
    .await;
    assert_eq!(status, 409);

    // Activation materialises one pending session per item.
    let (status, activated) = post_json(
        &client,
        format!("{base}/budgets/{budget_id}/activate"),
        json!({}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(activated["status"], "active");

    let (status, sessions) = get_json(
        &client,
        format!("{base}/treatments?budget_id={budget_id}"),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(sessions["total"], 2);

    // An active budget is no longer editable.
    let resp = client
        .put(format!("{base}/budgets/{budget_id}"))
        .json(&json!({"title": "Edited", "items": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);

    // Completing the budget is blocked while sessions are open.
    let (status, _) = post_json(
        &client,
        format!("{base}/budgets/{budget_id}/complete"),
        json!({}),
    )
    .await;
    assert_eq!(status, 409);

    // Settle the sessions: complete one (charged amount defaults to the
    // item's unit price) and cancel the other.
    let ids: Vec<String> = sessions["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap().to_string())
        .collect();
    let (status, completed) = post_json(
        &client,
        format!("{base}/treatments/{}/complete", ids[0]),
        json!({}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(completed["status"], "completed");
    assert!(completed["charged_amount_cents"].as_i64().unwrap() > 0);
    let (status, _) = post_json(
        &client,
        format!("{base}/treatments/{}/cancel", ids[1]),
        json!({}),
    )
    .await;
    assert_eq!(status, 200);

    let (status, done) = post_json(
        &client,
        format!("{base}/budgets/{budget_id}/complete"),
        json!({}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(done["status"], "completed");

    // The completed session shows up in the revenue report.
    let today = time::OffsetDateTime::now_utc().date();
    let (status, report) = get_json(
        &client,
        format!("{base}/reports/revenue?from={today}&to={today}"),
    )
    .await;
    assert_eq!(status, 200);
    assert!(report["total_cents"].as_i64().unwrap() > 0);
    assert_eq!(report["months"].as_array().unwrap().len(), 1);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn revert_deletes_materialised_sessions() {
    let (base, shutdown_tx, handle) = start_server(AppConfig::default()).await;
    let client = reqwest::Client::new();
    let (doctor_id, patient_id) = seed_doctor_and_patient(&client, &base).await;

    let (_, budget) = post_json(
        &client,
        format!("{base}/budgets"),
        json!({
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "title": "Whitening",
            "items": [{"description": "Whitening", "quantity": 1, "unit_price_cents": 25_000}],
        }),
    )
    .await;
    let budget_id = budget["id"].as_str().unwrap().to_string();
    post_json(
        &client,
        format!("{base}/budgets/{budget_id}/activate"),
        json!({}),
    )
    .await;

    let (status, reverted) = post_json(
        &client,
        format!("{base}/budgets/{budget_id}/revert"),
        json!({}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(reverted["status"], "draft");

    let (_, sessions) = get_json(
        &client,
        format!("{base}/treatments?budget_id={budget_id}"),
    )
    .await;
    assert_eq!(sessions["total"], 0);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn schedule_blocks_guard_bookings() {
    let (base, shutdown_tx, handle) = start_server(AppConfig::default()).await;
    let client = reqwest::Client::new();
    let (doctor_id, patient_id) = seed_doctor_and_patient(&client, &base).await;

    // Monday mornings are blocked.
    let (status, _) = post_json(
        &client,
        format!("{base}/schedule-blocks"),
        json!({
            "doctor_id": doctor_id,
            "kind": "weekly",
            "weekdays": ["monday"],
            "start_minute": 540,
            "end_minute": 720,
            "reason": "surgery rounds",
        }),
    )
    .await;
    assert_eq!(status, 201);

    // The probe reports the collision.
    let (status, probe) = get_json(
        &client,
        format!(
            "{base}/schedule-blocks/conflicts?doctor_id={doctor_id}&date=2026-03-16&start_minute=600&end_minute=660"
        ),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(probe["conflict"], true);

    // Booking inside the block is a conflict (2026-03-16 is a Monday).
    let (status, body) = post_json(
        &client,
        format!("{base}/treatments"),
        json!({
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "scheduled_date": "2026-03-16",
            "start_minute": 600,
            "end_minute": 660,
        }),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "conflict");

    // The same slot on a Tuesday books fine.
    let (status, _) = post_json(
        &client,
        format!("{base}/treatments"),
        json!({
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "scheduled_date": "2026-03-17",
            "start_minute": 600,
            "end_minute": 660,
        }),
    )
    .await;
    assert_eq!(status, 201);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn validation_failures_are_400() {
    let (base, shutdown_tx, handle) = start_server(AppConfig::default()).await;
    let client = reqwest::Client::new();
    let (doctor_id, patient_id) = seed_doctor_and_patient(&client, &base).await;

    // Malformed email.
    let (status, body) = post_json(
        &client,
        format!("{base}/patients"),
        json!({"first_name": "Ana", "last_name": "García", "email": "not-an-address"}),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "validation");

    // Malformed date.
    let (status, body) = post_json(
        &client,
        format!("{base}/patients"),
        json!({"first_name": "Ana", "last_name": "García", "birth_date": "16/03/1990"}),
    )
    .await;
    assert_eq!(status, 400);
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("birth_date")
    );

    // Zero-quantity budget item.
    let (status, _) = post_json(
        &client,
        format!("{base}/budgets"),
        json!({
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "title": "Plan",
            "items": [{"description": "Implant", "quantity": 0, "unit_price_cents": 90_000}],
        }),
    )
    .await;
    assert_eq!(status, 400);

    // Unknown ids are 404.
    let (status, body) = get_json(
        &client,
        format!("{base}/patients/00000000-0000-0000-0000-000000000000"),
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn bearer_auth_protects_the_api() {
    let cfg = AppConfig {
        auth: AuthConfig {
            enabled: true,
            tokens: vec!["secret-token".to_string()],
        },
        ..Default::default()
    };
    let (base, shutdown_tx, handle) = start_server(cfg).await;
    let client = reqwest::Client::new();

    // Public paths stay open.
    let resp = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    // Protected routes demand the token.
    let resp = client.get(format!("{base}/patients")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    let resp = client
        .get(format!("{base}/patients"))
        .bearer_auth("wrong-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    let resp = client
        .get(format!("{base}/patients"))
        .bearer_auth("secret-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn notification_queue_api() {
    let (base, shutdown_tx, handle) = start_server(AppConfig::default()).await;
    let client = reqwest::Client::new();

    // Email without a recipient address is rejected.
    let (status, _) = post_json(
        &client,
        format!("{base}/notifications"),
        json!({
            "channel": "email",
            "recipient": {},
            "template_id": "message",
        }),
    )
    .await;
    assert_eq!(status, 400);

    let (status, queued) = post_json(
        &client,
        format!("{base}/notifications"),
        json!({
            "channel": "webhook",
            "recipient": {"webhook_url": "https://hooks.example.com/dentora"},
            "template_id": "message",
            "template_data": {"subject": "Hi", "body": "Hello"},
        }),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(queued["status"], "pending");
    let id = queued["id"].as_str().unwrap().to_string();

    let (status, listed) = get_json(&client, format!("{base}/notifications?status=pending")).await;
    assert_eq!(status, 200);
    assert_eq!(listed["total"], 1);

    let (status, cancelled) = post_json(
        &client,
        format!("{base}/notifications/{id}/cancel"),
        json!({}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(cancelled["status"], "cancelled");

    // A second cancel is a conflict.
    let (status, _) = post_json(
        &client,
        format!("{base}/notifications/{id}/cancel"),
        json!({}),
    )
    .await;
    assert_eq!(status, 409);

    let (status, stats) = get_json(&client, format!("{base}/notifications/stats")).await;
    assert_eq!(status, 200);
    assert_eq!(stats["cancelled"], 1);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn documents_render() {
    let (base, shutdown_tx, handle) = start_server(AppConfig::default()).await;
    let client = reqwest::Client::new();
    let (doctor_id, patient_id) = seed_doctor_and_patient(&client, &base).await;

    let (_, budget) = post_json(
        &client,
        format!("{base}/budgets"),
        json!({
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "title": "Implant plan",
            "items": [{"description": "Implant", "quantity": 1, "unit_price_cents": 90_000}],
        }),
    )
    .await;
    let budget_id = budget["id"].as_str().unwrap();

    let resp = client
        .get(format!("{base}/budgets/{budget_id}/document"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let html = resp.text().await.unwrap();
    assert!(html.contains("Implant plan"));
    assert!(html.contains("Ana García"));

    // A scheduled session exports as an iCalendar event.
    let (_, session) = post_json(
        &client,
        format!("{base}/treatments"),
        json!({
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "scheduled_date": "2026-03-17",
            "start_minute": 600,
            "end_minute": 660,
        }),
    )
    .await;
    let session_id = session["id"].as_str().unwrap();
    let resp = client
        .get(format!("{base}/treatments/{session_id}/calendar.ics"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert!(
        resp.headers()[reqwest::header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/calendar")
    );
    let ics = resp.text().await.unwrap();
    assert!(ics.starts_with("BEGIN:VCALENDAR"));
    assert!(ics.contains("BEGIN:VEVENT"));

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}
