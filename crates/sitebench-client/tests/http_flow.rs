use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use sitebench_client::{
    DispatchError, DispatchOutcome, EnvError, FieldBinding, NoticeLevel, PageSession,
    ParsePolicy, RedirectMode, SiteClientConfig, TransportError,
};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};

const PREFIX: &str = "/ws/proxy/8014";

#[derive(Clone, Default)]
struct StubSite {
    env: Arc<Mutex<Value>>,
    env_reads: Arc<AtomicUsize>,
    traces: Arc<AtomicUsize>,
    mutations: Arc<Mutex<Vec<Value>>>,
}

async fn env_handler(State(site): State<StubSite>) -> Json<Value> {
    site.env_reads.fetch_add(1, Ordering::SeqCst);
    Json(site.env.lock().await.clone())
}

async fn env_query_handler(
    State(site): State<StubSite>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let Some(path) = params.get("path").filter(|path| !path.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "error": "Missing path parameter"})),
        );
    };
    let env = site.env.lock().await.clone();
    let value = path
        .split('.')
        .try_fold(&env, |current, key| current.get(key))
        .cloned()
        .unwrap_or(Value::Null);
    (
        StatusCode::OK,
        Json(json!({"success": true, "path": path, "value": value})),
    )
}

async fn trace_handler(State(site): State<StubSite>) -> (StatusCode, &'static str) {
    site.traces.fetch_add(1, Ordering::SeqCst);
    (StatusCode::INTERNAL_SERVER_ERROR, "trace store down")
}

async fn mutate_handler(
    State(site): State<StubSite>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    site.mutations.lock().await.push(body.clone());
    match body["action"].as_str().unwrap_or_default() {
        "claim_price_protect" => {
            let mut env = site.env.lock().await;
            env["orders"]["O-1"]["claims"]["price_protect"]["state"] = json!("approved");
            (StatusCode::OK, Json(json!({"ok": true})))
        }
        "add_card" => (
            StatusCode::OK,
            Json(json!({"ok": true, "redirect": "/shop.local/order.html"})),
        ),
        "view_receipt" => (
            StatusCode::OK,
            Json(json!({"ok": true, "redirect": "receipt.html?id=R-1"})),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"ok": false, "error": "Mutate Error: unknown action"})),
        ),
    }
}

fn stub_router(site: StubSite) -> Router {
    Router::new()
        .route(&format!("{PREFIX}/api/env"), get(env_handler))
        .route(&format!("{PREFIX}/api/env/query"), get(env_query_handler))
        .route(&format!("{PREFIX}/api/trace"), post(trace_handler))
        .route(&format!("{PREFIX}/api/mutate"), post(mutate_handler))
        .with_state(site)
}

async fn spawn_http_server(app: Router) -> Result<(SocketAddr, oneshot::Sender<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        let _ = server.await;
    });
    Ok((addr, shutdown_tx))
}

fn page_url(addr: SocketAddr) -> String {
    format!("http://{addr}{PREFIX}/shop.local/cart.html")
}

fn bindings() -> Vec<FieldBinding> {
    vec![
        FieldBinding::new("claim-state", "orders.O-1.claims.price_protect.state", "none"),
        FieldBinding::new("card-last4", "payments.cards.active_last4", "1234"),
    ]
}

async fn stub_session(initial_env: Value) -> Result<(StubSite, PageSession, oneshot::Sender<()>)> {
    let site = StubSite::default();
    *site.env.lock().await = initial_env;
    let (addr, shutdown) = spawn_http_server(stub_router(site.clone())).await?;
    let session = PageSession::from_config(SiteClientConfig::new(page_url(addr)), bindings())?;
    Ok((site, session, shutdown))
}

#[tokio::test]
async fn page_load_renders_bound_fields_with_defaults() -> Result<()> {
    let (site, session, _shutdown) = stub_session(json!({
        "orders": {"O-1": {"claims": {"price_protect": {"state": "approved"}}}}
    }))
    .await?;

    session.open().await?;

    assert_eq!(session.elements().text("claim-state").as_deref(), Some("approved"));
    assert_eq!(session.elements().text("card-last4").as_deref(), Some("1234"));
    assert_eq!(site.env_reads.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn failing_trace_does_not_block_mutation_and_page_rerenders_once() -> Result<()> {
    let (site, session, _shutdown) = stub_session(json!({
        "orders": {"O-1": {"claims": {"price_protect": {"state": "pending"}}}}
    }))
    .await?;
    session.open().await?;
    assert_eq!(session.elements().text("claim-state").as_deref(), Some("pending"));

    let outcome = session
        .dispatch("C1", "claim_price_protect", json!({"order": "O-1"}))
        .await?;

    assert!(matches!(outcome, DispatchOutcome::Rendered { .. }));
    assert_eq!(site.traces.load(Ordering::SeqCst), 1);
    assert_eq!(site.env_reads.load(Ordering::SeqCst), 2);
    assert_eq!(session.elements().text("claim-state").as_deref(), Some("approved"));
    assert!(session.navigation().visits().is_empty());

    let mutations = site.mutations.lock().await.clone();
    assert_eq!(
        mutations,
        vec![json!({"task_id": "C1", "action": "claim_price_protect", "payload": {"order": "O-1"}})]
    );
    Ok(())
}

#[tokio::test]
async fn absolute_redirect_stays_under_proxy_prefix() -> Result<()> {
    let (_site, session, _shutdown) = stub_session(json!({})).await?;
    let origin = session.paths().location().origin();

    let outcome = session
        .dispatch("T1", "add_card", json!({"card": {"brand": "visa", "last4": "4242"}}))
        .await?;

    let expected = format!("{origin}{PREFIX}/shop.local/order.html");
    assert_eq!(outcome.navigation_target(), Some(expected.as_str()));
    assert_eq!(session.navigation().last(), Some(expected));
    Ok(())
}

#[tokio::test]
async fn absolute_redirect_in_api_root_mode_matches_proxy_base() -> Result<()> {
    let site = StubSite::default();
    let (addr, _shutdown) = spawn_http_server(stub_router(site)).await?;
    let mut config = SiteClientConfig::new(page_url(addr));
    config.redirect_mode = RedirectMode::ApiRoot;
    let session = PageSession::from_config(config, bindings())?;

    let outcome = session.dispatch("T1", "add_card", json!({})).await?;

    assert_eq!(
        outcome.navigation_target(),
        Some(format!("http://{addr}{PREFIX}/shop.local/order.html").as_str())
    );
    Ok(())
}

#[tokio::test]
async fn relative_redirect_is_navigated_unchanged() -> Result<()> {
    let (_site, session, _shutdown) = stub_session(json!({})).await?;

    let outcome = session.dispatch("T5", "view_receipt", json!({})).await?;

    assert_eq!(outcome.navigation_target(), Some("receipt.html?id=R-1"));
    let resolved = session.navigation().last_resolved().expect("resolved");
    assert_eq!(resolved.path(), format!("{PREFIX}/shop.local/receipt.html"));
    Ok(())
}

#[tokio::test]
async fn mutate_error_surfaces_as_failure_notice() -> Result<()> {
    let (site, session, _shutdown) = stub_session(json!({})).await?;

    let error = session
        .dispatch("T9", "explode", json!({}))
        .await
        .expect_err("mutate fails");

    let DispatchError::Mutate(TransportError::Http { status, body }) = &error else {
        panic!("expected http mutate failure, got {error:?}");
    };
    assert_eq!(status.as_u16(), 500);
    assert!(body.contains("Mutate Error: unknown action"));

    let notice = session.toast().current().expect("notice");
    assert_eq!(notice.level, NoticeLevel::Failure);
    assert!(notice.message.starts_with("operation failed: "));
    assert_eq!(site.env_reads.load(Ordering::SeqCst), 0);
    assert!(session.navigation().visits().is_empty());
    Ok(())
}

#[tokio::test]
async fn remote_query_and_missing_path() -> Result<()> {
    let (_site, session, _shutdown) = stub_session(json!({
        "trips": {"T-1": {"pnr": "ABC123"}}
    }))
    .await?;

    let value = session.loader().query("trips.T-1.pnr").await?;
    assert_eq!(value, Some(json!("ABC123")));

    let missing = session.loader().query("trips.T-2.pnr").await?;
    assert_eq!(missing, None);

    let error = session.loader().query("").await.expect_err("missing path");
    assert!(matches!(
        error,
        EnvError::Transport(TransportError::Http { status, .. }) if status.as_u16() == 400
    ));
    Ok(())
}

#[tokio::test]
async fn non_json_env_body_follows_parse_policy() -> Result<()> {
    let app = Router::new().route(
        &format!("{PREFIX}/api/env"),
        get(|| async { "<html>maintenance</html>" }),
    );
    let (addr, _shutdown) = spawn_http_server(app).await?;

    let lenient = PageSession::from_config(SiteClientConfig::new(page_url(addr)), bindings())?;
    let document = lenient.open().await?;
    assert!(document.root().is_empty());
    assert_eq!(lenient.elements().text("card-last4").as_deref(), Some("1234"));

    let mut config = SiteClientConfig::new(page_url(addr));
    config.parse_policy = ParsePolicy::Strict;
    let strict = PageSession::from_config(config, bindings())?;
    let error = strict.open().await.expect_err("strict parse failure");
    assert!(matches!(error, EnvError::Transport(TransportError::Parse { .. })));
    assert_eq!(strict.elements().text("card-last4"), None);
    Ok(())
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let session = PageSession::from_config(SiteClientConfig::new(page_url(addr)), bindings())?;
    let error = session.open().await.expect_err("nothing listening");
    assert!(matches!(error, EnvError::Transport(TransportError::Network { .. })));

    let dispatch_error = session
        .dispatch("T1", "add_card", json!({}))
        .await
        .expect_err("mutate unreachable");
    assert!(matches!(
        dispatch_error,
        DispatchError::Mutate(TransportError::Network { .. })
    ));
    Ok(())
}
