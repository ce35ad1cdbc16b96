//! Integration tests for the settlement API surface
//!
//! Runs the actix handlers against the in-memory store, exercising the
//! authenticated identity checks and the balance invariants end to end.

use actix_web::{test, web, App};
use chrono::Utc;
use rust_decimal_macros::dec;
use solace_api::handlers::{configure_sessions, configure_wallet};
use solace_auth::{claims::UserRole, JwtService};
use solace_core::models::{ActivePlan, ServiceKind, Wallet};
use solace_core::traits::{SettlementService, WalletStore};
use solace_core::RatePolicy;
use solace_services::{MemoryStore, RoomTokenIssuer};
use std::sync::Arc;

const JWT_SECRET: &str = "test-jwt-secret";

struct TestHarness {
    store: Arc<MemoryStore>,
    jwt: Arc<JwtService>,
    issuer: Arc<RoomTokenIssuer>,
}

impl TestHarness {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new(RatePolicy::default())),
            jwt: Arc::new(JwtService::new(JWT_SECRET, 3600)),
            issuer: Arc::new(RoomTokenIssuer::new(
                "room-secret",
                3600,
                RatePolicy::default(),
            )),
        }
    }

    fn bearer(&self, user_id: &str) -> String {
        let token = self
            .jwt
            .create_token_for_user(user_id, UserRole::User)
            .unwrap();
        format!("Bearer {}", token)
    }

    async fn seed_wallet(&self, user_id: &str, tokens: rust_decimal::Decimal, plans: Vec<ActivePlan>) {
        let mut wallet = Wallet::new(user_id.to_string(), 5);
        wallet.tokens = tokens;
        wallet.active_plans = plans;
        self.store.put_wallet(wallet).await;
    }
}

fn call_plan(remaining: rust_decimal::Decimal) -> ActivePlan {
    let mut plan = ActivePlan::new(
        ServiceKind::Call,
        "Call Pack".to_string(),
        dec!(100),
        dec!(10),
        Utc::now() - chrono::Duration::days(1),
        30,
    );
    plan.remaining = remaining;
    plan
}

macro_rules! build_app {
    ($harness:expr) => {{
        let settlement: Arc<dyn SettlementService> = $harness.store.clone();
        let wallet_store: Arc<dyn WalletStore> = $harness.store.clone();
        test::init_service(
            App::new()
                .app_data(web::Data::new($harness.jwt.clone()))
                .app_data(web::Data::new(settlement))
                .app_data(web::Data::new(wallet_store))
                .app_data(web::Data::new($harness.issuer.clone()))
                .service(
                    web::scope("/api/v1")
                        .configure(configure_wallet)
                        .configure(configure_sessions),
                ),
        )
        .await
    }};
}

#[actix_web::test]
async fn test_wallet_read_creates_with_signup_grant() {
    let harness = TestHarness::new();
    let app = build_app!(harness);

    let req = test::TestRequest::get()
        .uri("/api/v1/wallet")
        .insert_header(("Authorization", harness.bearer("user-1")))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["data"]["free_messages_remaining"], 5);
    assert_eq!(body["data"]["call_minutes"], 0);
}

#[actix_web::test]
async fn test_wallet_requires_auth() {
    let harness = TestHarness::new();
    let app = build_app!(harness);

    let req = test::TestRequest::get().uri("/api/v1/wallet").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn test_finalize_call_deducts_and_is_idempotent() {
    let harness = TestHarness::new();
    let plan = call_plan(dec!(10));
    let plan_id = plan.id.clone();
    harness.seed_wallet("user-1", dec!(0), vec![plan]).await;
    let app = build_app!(harness);

    let payload = serde_json::json!({
        "user_id": "user-1",
        "listener_id": "listener-9",
        "funding": { "kind": "plan", "id": plan_id },
        "consumed_secs": 125,
        "settlement_key": "settle-1",
    });

    for expect_duplicate in [false, true] {
        let req = test::TestRequest::post()
            .uri("/api/v1/sessions/finalize-call")
            .insert_header(("Authorization", harness.bearer("user-1")))
            .set_json(&payload)
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["data"]["billed_minutes"], 3);
        assert_eq!(body["data"]["already_applied"], expect_duplicate);
    }

    // Deducted once: 10 - 3 = 7 minutes remaining.
    let wallet = harness.store.fetch("user-1").await.unwrap().unwrap();
    assert_eq!(wallet.active_plans[0].remaining, dec!(7));
}

#[actix_web::test]
async fn test_finalize_call_rejects_foreign_wallet() {
    let harness = TestHarness::new();
    harness.seed_wallet("user-2", dec!(10), vec![]).await;
    let app = build_app!(harness);

    let payload = serde_json::json!({
        "user_id": "user-2",
        "listener_id": "listener-9",
        "funding": { "kind": "token_pool" },
        "consumed_secs": 60,
        "settlement_key": "settle-2",
    });

    // Authenticated as user-1, mutating user-2's balance.
    let req = test::TestRequest::post()
        .uri("/api/v1/sessions/finalize-call")
        .insert_header(("Authorization", harness.bearer("user-1")))
        .set_json(&payload)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 403);

    // Balance untouched.
    let wallet = harness.store.fetch("user-2").await.unwrap().unwrap();
    assert_eq!(wallet.tokens, dec!(10));
}

#[actix_web::test]
async fn test_deduct_chat_insufficient_balance() {
    let harness = TestHarness::new();
    let mut wallet = Wallet::new("user-1".to_string(), 0);
    wallet.tokens = dec!(0.4);
    harness.store.put_wallet(wallet).await;
    let app = build_app!(harness);

    let payload = serde_json::json!({
        "user_id": "user-1",
        "funding": { "kind": "token_pool" },
        "message_count": 1,
    });

    let req = test::TestRequest::post()
        .uri("/api/v1/sessions/deduct-chat")
        .insert_header(("Authorization", harness.bearer("user-1")))
        .set_json(&payload)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 402);

    let wallet = harness.store.fetch("user-1").await.unwrap().unwrap();
    assert_eq!(wallet.tokens, dec!(0.4));
}

#[actix_web::test]
async fn test_free_message_endpoint_decrements_grant() {
    let harness = TestHarness::new();
    harness.seed_wallet("user-1", dec!(0), vec![]).await;
    let app = build_app!(harness);

    let payload = serde_json::json!({ "user_id": "user-1" });

    let req = test::TestRequest::post()
        .uri("/api/v1/sessions/free-message")
        .insert_header(("Authorization", harness.bearer("user-1")))
        .set_json(&payload)
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["data"]["remaining"], 4);

    // Tokens never touched by the free path.
    let wallet = harness.store.fetch("user-1").await.unwrap().unwrap();
    assert_eq!(wallet.tokens, dec!(0));
}

#[actix_web::test]
async fn test_room_token_refused_for_exhausted_plan() {
    let harness = TestHarness::new();
    let plan = call_plan(dec!(0));
    let plan_id = plan.id.clone();
    harness.seed_wallet("user-1", dec!(0), vec![plan]).await;
    let app = build_app!(harness);

    let payload = serde_json::json!({ "room_id": plan_id });

    let req = test::TestRequest::post()
        .uri("/api/v1/sessions/room-token")
        .insert_header(("Authorization", harness.bearer("user-1")))
        .set_json(&payload)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 402);
}

#[actix_web::test]
async fn test_room_token_issued_for_valid_plan() {
    let harness = TestHarness::new();
    let plan = call_plan(dec!(5));
    let plan_id = plan.id.clone();
    harness.seed_wallet("user-1", dec!(0), vec![plan]).await;
    let app = build_app!(harness);

    let payload = serde_json::json!({ "room_id": plan_id });

    let req = test::TestRequest::post()
        .uri("/api/v1/sessions/room-token")
        .insert_header(("Authorization", harness.bearer("user-1")))
        .set_json(&payload)
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    let token = body["data"]["token"].as_str().unwrap();
    let claims = harness.issuer.validate(token).unwrap();
    assert_eq!(claims.sub, "user-1");
    assert_eq!(claims.room, plan_id);
}
