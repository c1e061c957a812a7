
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use prost::Message;
use registry::payloads::Choice;
use serde_json::{Value, json};
use server::{config::Config, ledger::LedgerConfig, router, state::AppState};
use tower::ServiceExt;

use harness::*;

fn app() -> Router {
    let h = harness(LedgerConfig::default());

    router(AppState::with_ledger(Config::default(), h.ledger))
}

fn ballot(position: i64, voter: Option<&str>, candidate_ids: Vec<i64>) -> Request<Body> {
    let mut request = Request::builder()
        .method("POST")
        .uri(format!("/positions/{position}/votes"));

    if let Some(voter) = voter {
        request = request.header("X-Voter-Id", voter);
    }

    request
        .body(Body::from(Choice { candidate_ids }.encode_to_vec()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();

    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn vote_then_read_tally() {
    let app = app();

    let (status, body) = send(&app, ballot(BOARD, Some("cs-1"), vec![BOARD_B, BOARD_A])).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body,
        json!([
            { "candidate_id": BOARD_A, "updated_count": 1 },
            { "candidate_id": BOARD_B, "updated_count": 1 },
        ])
    );

    send(&app, ballot(BOARD, Some("cs-2"), vec![BOARD_B])).await;

    let (status, body) = send(&app, get(&format!("/positions/{BOARD}/tally"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["candidate_id"], BOARD_B);
    assert_eq!(body[0]["votes"], 2);
    assert_eq!(body[2]["candidate_id"], BOARD_C);
    assert_eq!(body[2]["votes"], 0);

    let (status, body) = send(&app, get(&format!("/candidates/{BOARD_B}/votes"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "candidate_id": BOARD_B, "votes": 2 }));
}

#[tokio::test]
async fn second_ballot_conflicts() {
    let app = app();

    let (status, _) = send(&app, ballot(GOVERNOR, Some("cs-3"), vec![ADA])).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, ballot(GOVERNOR, Some("CS-3"), vec![GRACE])).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already voted"));
}

#[tokio::test]
async fn rejected_requests() {
    let app = app();

    let (status, _) = send(&app, ballot(GOVERNOR, None, vec![ADA])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, ballot(BOARD, Some("cs-4"), vec![BOARD_A, BOARD_B, BOARD_C])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, ballot(GOVERNOR, Some("ba-1"), vec![ADA])).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, ballot(GOVERNOR, Some("cs-4"), vec![BOARD_A])).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let garbage = Request::builder()
        .method("POST")
        .uri(format!("/positions/{GOVERNOR}/votes"))
        .header("X-Voter-Id", "cs-4")
        .body(Body::from(vec![0x0a, 0xff]))
        .unwrap();
    let (status, _) = send(&app, garbage).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, get("/positions/77/tally")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/candidates/999/votes")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
