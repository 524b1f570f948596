//! Student registration and fee ledger integration tests.

mod common;

use axum::http::StatusCode;
use common::{TestApp, sample_student};
use serde_json::{Value, json};
use uuid::Uuid;

#[tokio::test]
async fn create_student_normalizes_identity_fields() {
    let app = TestApp::spawn().await;

    let mut payload = sample_student("cs2024001", "Asha.Nair@Example.edu");
    payload["roll_number"] = json!("  cs2024001  ");

    let response = app
        .api_client
        .post(format!("{}/students", app.address))
        .json(&payload)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::CREATED, response.status());
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["roll_number"], "CS2024001");
    assert_eq!(body["email"], "asha.nair@example.edu");
    assert_eq!(body["is_active"], true);
    assert!(body["id"].as_str().is_some());
}

#[tokio::test]
async fn duplicate_roll_number_is_rejected() {
    let app = TestApp::spawn().await;
    app.seed_student("CS2024001", "first@example.edu").await;

    let response = app
        .api_client
        .post(format!("{}/students", app.address))
        .json(&sample_student("CS2024001", "second@example.edu"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::CONFLICT, response.status());
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert!(
        body["error"]
            .as_str()
            .unwrap_or_default()
            .contains("already exists")
    );
}

#[tokio::test]
async fn invalid_email_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .api_client
        .post(format!("{}/students", app.address))
        .json(&sample_student("CS2024001", "not-an-email"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::BAD_REQUEST, response.status());
}

#[tokio::test]
async fn negative_fee_component_is_rejected() {
    let app = TestApp::spawn().await;

    let mut payload = sample_student("CS2024001", "asha@example.edu");
    payload["fee_structure"] = json!({ "tuition": -100 });

    let response = app
        .api_client
        .post(format!("{}/students", app.address))
        .json(&payload)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::BAD_REQUEST, response.status());
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["error"], "Fee amounts cannot be negative");
}

#[tokio::test]
async fn fees_view_shows_component_breakdown() {
    let app = TestApp::spawn().await;
    let student_id = app.seed_student("CS2024001", "asha@example.edu").await;

    let fees = app.fees_of(student_id).await;

    assert_eq!(fees["roll_number"], "CS2024001");
    assert_eq!(fees["semester"], 3);
    assert_eq!(fees["current"]["components"]["tuition"], 30000);
    assert_eq!(fees["current"]["components"]["exam"], 5000);
    assert_eq!(fees["current"]["total"], 35000);
    assert_eq!(fees["current"]["paid"], 0);
    assert_eq!(fees["current"]["pending"], 35000);
    assert_eq!(fees["current"]["status"], "pending");
    assert_eq!(fees["semesters"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn fees_view_for_unknown_student_returns_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .api_client
        .get(format!("{}/students/{}/fees", app.address, Uuid::new_v4()))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::NOT_FOUND, response.status());
}

#[tokio::test]
async fn update_fees_recomputes_totals() {
    let app = TestApp::spawn().await;
    let student_id = app.seed_student("CS2024001", "asha@example.edu").await;

    let response = app
        .api_client
        .put(format!("{}/students/{}/fees", app.address, student_id))
        .json(&json!({
            "fee_structure": { "tuition": 40000, "exam": 5000, "library": 1000 }
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::OK, response.status());
    let fees: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(fees["current"]["total"], 46000);
    assert_eq!(fees["current"]["pending"], 46000);
    assert_eq!(fees["current"]["components"]["library"], 1000);
}

#[tokio::test]
async fn lump_total_is_ignored_when_components_are_present() {
    let app = TestApp::spawn().await;
    let student_id = app.seed_student("CS2024001", "asha@example.edu").await;

    let response = app
        .api_client
        .put(format!("{}/students/{}/fees", app.address, student_id))
        .json(&json!({ "total_fee": 99999 }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::OK, response.status());
    let fees: Value = response.json().await.expect("Failed to parse JSON");
    // the component breakdown stays authoritative for the total
    assert_eq!(fees["current"]["total"], 35000);
}

#[tokio::test]
async fn update_fees_for_unknown_student_returns_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .api_client
        .put(format!("{}/students/{}/fees", app.address, Uuid::new_v4()))
        .json(&json!({ "total_fee": 1000 }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::NOT_FOUND, response.status());
}

#[tokio::test]
async fn update_fees_rejects_negative_component() {
    let app = TestApp::spawn().await;
    let student_id = app.seed_student("CS2024001", "asha@example.edu").await;

    let response = app
        .api_client
        .put(format!("{}/students/{}/fees", app.address, student_id))
        .json(&json!({ "fee_structure": { "exam": -1 } }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::BAD_REQUEST, response.status());
}
