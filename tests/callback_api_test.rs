//! End-to-end tests of the HTTP surface against the in-memory store

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::connect_info::MockConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use paygate_backend::api::{self, AppState};
use paygate_backend::database::error::{DatabaseError, DatabaseErrorKind, DbResult};
use paygate_backend::error::AppResult;
use paygate_backend::ledger::{
    CreditAttempt, CreditRequest, JournalEntry, LedgerUpdater, MemoryPaymentStore, PaymentOrder,
    PaymentStore, RetryPolicy,
};
use paygate_backend::payments::callback::{AuthenticatorConfig, CallbackAuthenticator};
use paygate_backend::payments::network::AllowList;
use paygate_backend::payments::signature;
use paygate_backend::payments::traits::PaymentProvider;
use paygate_backend::payments::types::{InitPaymentRequest, InitPaymentResponse, PaymentStatus};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

const TERMINAL_KEY: &str = "1700000000DEMO";
const PASSWORD: &str = "s3cr3t";
const GATEWAY_IP: &str = "91.194.226.181";
const GATEWAY_PEER: &str = "91.194.226.181:40512";

struct MockProvider {
    response: InitPaymentResponse,
    requests: Mutex<Vec<InitPaymentRequest>>,
}

impl MockProvider {
    fn new(response: InitPaymentResponse) -> Arc<Self> {
        Arc::new(Self {
            response,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn redirecting() -> Arc<Self> {
        Self::new(InitPaymentResponse::Redirect {
            payment_url: "https://securepay.tinkoff.ru/new/abc".to_string(),
        })
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn initiate_payment(&self, request: InitPaymentRequest) -> AppResult<InitPaymentResponse> {
        self.requests.lock().unwrap().push(request);
        Ok(self.response.clone())
    }
}

/// Store whose database is gone
struct UnreachableStore;

impl UnreachableStore {
    fn error() -> DatabaseError {
        DatabaseError::new(DatabaseErrorKind::ConnectionError {
            message: "connection refused".to_string(),
        })
    }
}

#[async_trait]
impl PaymentStore for UnreachableStore {
    async fn record_order(&self, _order: &PaymentOrder) -> DbResult<()> {
        Err(Self::error())
    }

    async fn apply_credit_once(&self, _credit: &CreditRequest) -> DbResult<CreditAttempt> {
        Err(Self::error())
    }

    async fn find_journal_entry(&self, _reference_id: &str) -> DbResult<Option<JournalEntry>> {
        Err(Self::error())
    }

    async fn ping(&self) -> DbResult<()> {
        Err(Self::error())
    }
}

fn authenticator(trusted_proxies: &[&str]) -> CallbackAuthenticator {
    CallbackAuthenticator::new(AuthenticatorConfig {
        terminal_key: TERMINAL_KEY.to_string(),
        password: PASSWORD.to_string(),
        allowed_networks: AllowList::gateway_default(),
        trusted_proxies: AllowList::parse(trusted_proxies.iter().copied()).unwrap(),
        success_statuses: vec![PaymentStatus::Confirmed],
        require_terminal_key: false,
        require_token: false,
    })
}

/// Router as seen by a connection from `peer`
fn app_for_peer(
    peer: &str,
    trusted_proxies: &[&str],
    store: Arc<dyn PaymentStore>,
    provider: Arc<MockProvider>,
) -> Router {
    let ledger = LedgerUpdater::new(
        store,
        RetryPolicy::new(3, Duration::from_millis(1)),
        Duration::from_secs(5),
    );
    let peer: SocketAddr = peer.parse().unwrap();
    api::router(AppState::new(
        "development",
        authenticator(trusted_proxies),
        ledger,
        provider,
    ))
    .layer(MockConnectInfo(peer))
}

fn test_app(store: Arc<dyn PaymentStore>, provider: Arc<MockProvider>) -> Router {
    app_for_peer(GATEWAY_PEER, &[], store, provider)
}

fn signed(mut payload: Value) -> Value {
    let token = signature::sign(&signature::notification_fields(&payload), PASSWORD);
    payload["Token"] = Value::String(token);
    payload
}

fn confirmed_notification(order_id: &str, amount: i64) -> Value {
    signed(json!({
        "TerminalKey": TERMINAL_KEY,
        "OrderId": order_id,
        "Success": true,
        "Status": "CONFIRMED",
        "PaymentId": 13660,
        "ErrorCode": "0",
        "Amount": amount,
        "CardId": 322264,
        "Pan": "430000******0777"
    }))
}

fn callback_request(payload: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/payment_callback")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(payload).unwrap()))
        .unwrap()
}

fn forwarded_callback_request(client_ip: &str, payload: &Value) -> Request<Body> {
    let mut request = callback_request(payload);
    let value = header::HeaderValue::from_str(client_ip).unwrap();
    request.headers_mut().insert("x-real-ip", value.clone());
    request.headers_mut().insert("x-forwarded-for", value);
    request
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_confirmed_payment_credits_balance() {
    let store = Arc::new(MemoryPaymentStore::with_accounts([(6343, 0)]));
    let app = test_app(store.clone(), MockProvider::redirecting());

    let response = app
        .oneshot(callback_request(
            &confirmed_notification("6343_1700000000", 50_000),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(json_body(response).await["code"], "SUCCESS");

    assert_eq!(store.balance(6343), Some(50_000));
    let journal = store.journal();
    assert_eq!(journal.len(), 1);
    assert_eq!(journal[0].reference_id, "6343_1700000000");
    assert_eq!(journal[0].source_system, "gateway_payment");
    assert_eq!(
        journal[0].comment,
        "orderId-6343_1700000000_paymentId-13660_amount-500.00_cardId-322264"
    );
}

#[tokio::test]
async fn test_redelivery_is_credited_once() {
    let store = Arc::new(MemoryPaymentStore::with_accounts([(6343, 0)]));
    let app = test_app(store.clone(), MockProvider::redirecting());
    let payload = confirmed_notification("6343_1700000000", 50_000);

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(callback_request(&payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["code"], "SUCCESS");
    }

    assert_eq!(store.balance(6343), Some(50_000));
    assert_eq!(store.journal().len(), 1);
}

#[tokio::test]
async fn test_unknown_source_is_forbidden() {
    let store = Arc::new(MemoryPaymentStore::with_accounts([(6343, 0)]));
    let app = app_for_peer("8.8.8.8:5555", &[], store.clone(), MockProvider::redirecting());

    let response = app
        .oneshot(callback_request(&confirmed_notification("6343_1700000000", 50_000)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["code"], "FORBIDDEN");
    assert_eq!(store.balance(6343), Some(0));
    assert!(store.journal().is_empty());
}

#[tokio::test]
async fn test_forged_forwarding_headers_are_ignored() {
    let store = Arc::new(MemoryPaymentStore::with_accounts([(6343, 0)]));
    let app = app_for_peer("8.8.8.8:5555", &[], store.clone(), MockProvider::redirecting());
    let payload = json!({"Status": "CONFIRMED", "OrderId": "6343_1", "Amount": "99999900"});

    let response = app
        .oneshot(forwarded_callback_request(GATEWAY_IP, &payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["code"], "FORBIDDEN");
    assert_eq!(store.balance(6343), Some(0));
    assert!(store.journal().is_empty());
}

#[tokio::test]
async fn test_trusted_proxy_forwards_gateway_address() {
    let store = Arc::new(MemoryPaymentStore::with_accounts([(6343, 0)]));
    let app = app_for_peer(
        "10.0.0.7:43000",
        &["10.0.0.0/8"],
        store.clone(),
        MockProvider::redirecting(),
    );

    let response = app
        .oneshot(forwarded_callback_request(
            GATEWAY_IP,
            &confirmed_notification("6343_1700000000", 50_000),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.balance(6343), Some(50_000));

    let spoofed = app_for_peer(
        "10.0.0.7:43000",
        &["10.0.0.0/8"],
        store.clone(),
        MockProvider::redirecting(),
    )
    .oneshot(forwarded_callback_request(
        "8.8.8.8",
        &confirmed_notification("6343_1700000001", 50_000),
    ))
    .await
    .unwrap();
    assert_eq!(spoofed.status(), StatusCode::FORBIDDEN);
    assert_eq!(store.journal().len(), 1);
}

#[tokio::test]
async fn test_foreign_terminal_is_forbidden() {
    let store = Arc::new(MemoryPaymentStore::with_accounts([(6343, 0)]));
    let app = test_app(store.clone(), MockProvider::redirecting());
    let payload = signed(json!({
        "TerminalKey": "SomeoneElse",
        "OrderId": "6343_1700000000",
        "Status": "CONFIRMED",
        "Amount": 50_000
    }));

    let response = app.oneshot(callback_request(&payload)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["code"], "TERMINAL_MISMATCH");
    assert!(store.journal().is_empty());
}

#[tokio::test]
async fn test_tampered_token_is_forbidden() {
    let store = Arc::new(MemoryPaymentStore::with_accounts([(6343, 0)]));
    let app = test_app(store.clone(), MockProvider::redirecting());
    let mut payload = confirmed_notification("6343_1700000000", 50_000);
    payload["Amount"] = json!(5_000_000);

    let response = app.oneshot(callback_request(&payload)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["code"], "INVALID_TOKEN");
    assert_eq!(store.balance(6343), Some(0));
}

#[tokio::test]
async fn test_other_status_is_acknowledged_without_credit() {
    let store = Arc::new(MemoryPaymentStore::with_accounts([(6343, 0)]));
    let app = test_app(store.clone(), MockProvider::redirecting());
    let payload = signed(json!({
        "TerminalKey": TERMINAL_KEY,
        "OrderId": "6343_1700000000",
        "Status": "AUTHORIZED",
        "Amount": 50_000
    }));

    let response = app.oneshot(callback_request(&payload)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["code"], "UNSUPPORTED_STATUS");
    assert_eq!(store.balance(6343), Some(0));
    assert!(store.journal().is_empty());
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let store = Arc::new(MemoryPaymentStore::with_accounts([(6343, 0)]));
    let app = test_app(store.clone(), MockProvider::redirecting());

    let response = app
        .oneshot(callback_request(
            &confirmed_notification("999999_1700000000", 10_000),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "USER_NOT_FOUND");
    assert!(store.journal().is_empty());
}

#[tokio::test]
async fn test_malformed_notifications_are_bad_requests() {
    let store = Arc::new(MemoryPaymentStore::with_accounts([(6343, 0)]));
    let app = test_app(store.clone(), MockProvider::redirecting());

    let cases = [
        (json!({}), "BAD_REQUEST"),
        (json!({"OrderId": "6343_1", "Amount": 100}), "INVALID_DATA"),
        (json!({"Status": "CONFIRMED", "OrderId": "abc", "Amount": 100}), "INVALID_ORDER_ID"),
    ];

    for (payload, code) in cases {
        let response = app
            .clone()
            .oneshot(callback_request(&payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", payload);
        assert_eq!(json_body(response).await["code"], code, "{}", payload);
    }
    assert!(store.journal().is_empty());
}

#[tokio::test]
async fn test_store_outage_is_server_error() {
    let app = test_app(Arc::new(UnreachableStore), MockProvider::redirecting());

    let response = app
        .oneshot(callback_request(
            &confirmed_notification("6343_1700000000", 50_000),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["code"], "SERVER_ERROR");
    assert!(!body["message"].as_str().unwrap().contains("connection refused"));
}

fn form_request(body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_initiation_redirects_to_payment_page() {
    let store = Arc::new(MemoryPaymentStore::new());
    let provider = MockProvider::redirecting();
    let app = test_app(store.clone(), provider.clone());

    let response = app.oneshot(form_request("uid=6343&amount=500")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://securepay.tinkoff.ru/new/abc"
    );

    let requests = provider.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].user_id, 6343);
    assert_eq!(requests[0].amount.value(), 50_000);

    let order = store.order(&requests[0].order_id).unwrap();
    assert_eq!(order.user_id, 6343);
    assert_eq!(order.amount.value(), 50_000);
}

#[tokio::test]
async fn test_repeated_form_in_same_second_is_conflict() {
    let store = Arc::new(MemoryPaymentStore::new());
    let provider = MockProvider::redirecting();
    let app = test_app(store.clone(), provider.clone());

    // Order tokens have one-second resolution; a burst of submissions always
    // lands two of them in the same second.
    let mut redirects = 0;
    let mut conflict = None;
    for _ in 0..10 {
        let response = app
            .clone()
            .oneshot(form_request("uid=6343&amount=500"))
            .await
            .unwrap();
        match response.status() {
            StatusCode::SEE_OTHER => redirects += 1,
            StatusCode::CONFLICT => {
                conflict = Some(json_body(response).await);
                break;
            }
            other => panic!("unexpected status {}", other),
        }
    }

    let body = conflict.expect("a repeated order token should be refused");
    assert!(body["error"].as_str().unwrap().contains("already in progress"));
    assert!(redirects >= 1);
    assert_eq!(provider.requests.lock().unwrap().len(), redirects);
}

#[tokio::test]
async fn test_initiation_rejected_by_gateway() {
    let provider = MockProvider::new(InitPaymentResponse::Rejected {
        message: "Invalid terminal".to_string(),
    });
    let app = test_app(Arc::new(MemoryPaymentStore::new()), provider);

    let response = app.oneshot(form_request("uid=6343")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Invalid terminal");
}

#[tokio::test]
async fn test_initiation_with_bad_uid() {
    let provider = MockProvider::redirecting();
    let app = test_app(Arc::new(MemoryPaymentStore::new()), provider.clone());

    let response = app.oneshot(form_request("uid=abc&amount=500")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"].is_string());
    assert!(provider.requests.lock().unwrap().is_empty());
}

fn success_request(payload: Option<Value>) -> Request<Body> {
    let body = payload
        .map(|p| Body::from(serde_json::to_vec(&p).unwrap()))
        .unwrap_or_else(Body::empty);
    Request::builder()
        .method("POST")
        .uri("/success/6343/500")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap()
}

#[tokio::test]
async fn test_success_return() {
    let app = test_app(Arc::new(MemoryPaymentStore::new()), MockProvider::redirecting());

    let missing = app.clone().oneshot(success_request(None)).await.unwrap();
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let foreign = app
        .clone()
        .oneshot(success_request(Some(json!({"TerminalKey": "x", "Status": "CONFIRMED"}))))
        .await
        .unwrap();
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);

    let pending = app
        .clone()
        .oneshot(success_request(Some(json!({"TerminalKey": TERMINAL_KEY, "Status": "NEW"}))))
        .await
        .unwrap();
    assert_eq!(pending.status(), StatusCode::OK);
    let text = to_bytes(pending.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&text).contains("not CONFIRMED"));

    let confirmed = app
        .oneshot(success_request(Some(
            json!({"TerminalKey": TERMINAL_KEY, "Status": "CONFIRMED"}),
        )))
        .await
        .unwrap();
    assert_eq!(confirmed.status(), StatusCode::OK);
    assert_eq!(
        json_body(confirmed).await,
        json!({"uid": 6343, "amount": 500, "status": "CONFIRMED"})
    );
}

fn health_request() -> Request<Body> {
    Request::builder().uri("/health").body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_reports_store_reachability() {
    let healthy = test_app(Arc::new(MemoryPaymentStore::new()), MockProvider::redirecting())
        .oneshot(health_request())
        .await
        .unwrap();
    assert_eq!(healthy.status(), StatusCode::OK);
    let body = json_body(healthy).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["ledger_store"], "reachable");
    assert_eq!(body["environment"], "development");

    let unhealthy = test_app(Arc::new(UnreachableStore), MockProvider::redirecting())
        .oneshot(health_request())
        .await
        .unwrap();
    assert_eq!(unhealthy.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(unhealthy).await["ledger_store"], "unreachable");
}
