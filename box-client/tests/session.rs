//! Integration tests for session substitution, cancellation and deadlines

use box_client::mock::{FakeEngine, MockConnection};
use box_client::{
    BoxClient, BoxConfig, BoxError, Context, ErrorCode, Permission, Privilege, Response,
    SuRequest, TransportError, UserCreateOptions, UserGrantOptions,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A low-privilege user gains admin rights for the rest of the connection
#[tokio::test]
async fn test_su_admin_enables_grant() {
    let engine = FakeEngine::new().with_user(
        "ops",
        "ops",
        [Privilege::universe([Permission::Execute])],
    );
    let conn = engine.connect("ops", "ops").expect("ops connects");
    let client = BoxClient::new(Arc::clone(&conn));
    let ctx = Context::background();
    let users = client.schema().user();
    let target = Privilege::universe([Permission::Read]);

    let err = users
        .grant(&ctx, "guest", &target, UserGrantOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_code(ErrorCode::ACCESS_DENIED));

    client
        .session()
        .su(&ctx, SuRequest::new("admin"))
        .expect("submitted")
        .get()
        .await
        .expect("su");
    assert_eq!(conn.principal(), "admin");

    users
        .grant(&ctx, "guest", &target, UserGrantOptions::default())
        .await
        .expect("grant as admin");
    assert!(users
        .info(&ctx, "guest")
        .await
        .unwrap()
        .iter()
        .any(|p| p.is_universal() && p.permissions.contains(&Permission::Read)));
}

/// The principal change is visible to every facade sharing the connection
#[tokio::test]
async fn test_su_is_shared_by_facades() {
    let engine = FakeEngine::new().with_user(
        "ops",
        "ops",
        [Privilege::universe([Permission::Execute])],
    );
    let conn = engine.connect("ops", "ops").unwrap();
    let first = BoxClient::new(Arc::clone(&conn));
    let second = BoxClient::new(Arc::clone(&conn));
    let ctx = Context::background();

    first
        .session()
        .su(&ctx, SuRequest::new("admin"))
        .unwrap()
        .get()
        .await
        .unwrap();

    second
        .schema()
        .user()
        .create(&ctx, "made_by_second", UserCreateOptions::default())
        .await
        .expect("second facade runs as admin");
}

#[tokio::test]
async fn test_su_without_rights() {
    let engine = FakeEngine::new().with_user("plain", "pw", Vec::<Privilege>::new());
    let conn = engine.connect("plain", "pw").unwrap();
    let client = BoxClient::new(Arc::clone(&conn));

    let err = client
        .session()
        .su(&Context::background(), SuRequest::new("admin"))
        .unwrap()
        .get()
        .await
        .unwrap_err();
    assert!(err.is_code(ErrorCode::ACCESS_DENIED));
    assert_eq!(conn.principal(), "plain");
}

#[tokio::test]
async fn test_su_unknown_user() {
    let engine = FakeEngine::new();
    let client = BoxClient::new(engine.connect("admin", "").unwrap());

    let err = client
        .session()
        .su(&Context::background(), SuRequest::new("nobody"))
        .unwrap()
        .get()
        .await
        .unwrap_err();
    assert!(err.is_code(ErrorCode::NO_SUCH_USER));
}

/// The combined form is refused locally and leaves the principal alone
#[tokio::test]
async fn test_combined_su_is_unsupported() {
    let engine = FakeEngine::new();
    let conn = engine.connect_guest().unwrap();
    let client = BoxClient::new(Arc::clone(&conn));

    let request = SuRequest::new("admin").call("box.info", vec![json!(1)]);
    let err = client
        .session()
        .su(&Context::background(), request)
        .unwrap_err();
    assert!(matches!(err, BoxError::Unsupported { .. }));
    assert_eq!(conn.principal(), "guest");
}

#[tokio::test]
async fn test_closed_connection() {
    let engine = FakeEngine::new();
    let conn = engine.connect_guest().unwrap();
    let client = BoxClient::new(Arc::clone(&conn));
    conn.close();

    let err = client.info(&Context::background()).await.unwrap_err();
    assert!(matches!(err, BoxError::Transport(TransportError::Closed)));
}

/// Cancelling the token abandons the wait
#[tokio::test]
async fn test_cancellation() {
    let conn = Arc::new(MockConnection::new());
    conn.push_hang();
    let client = BoxClient::new(Arc::clone(&conn));

    let token = CancellationToken::new();
    let ctx = Context::background().with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let err = client.schema().user().exists(&ctx, "anyone").await.unwrap_err();
    assert!(matches!(err, BoxError::Transport(TransportError::Cancelled)));
    canceller.await.unwrap();

    // The request was still submitted.
    assert_eq!(conn.requests().len(), 1);
}

/// An already cancelled context still submits but does not wait
#[tokio::test]
async fn test_cancelled_before_wait() {
    let conn = Arc::new(MockConnection::new());
    conn.push_hang();
    let client = BoxClient::new(Arc::clone(&conn));

    let token = CancellationToken::new();
    token.cancel();
    let ctx = Context::background().with_cancellation(token);

    let err = client.info(&ctx).await.unwrap_err();
    assert!(matches!(err, BoxError::Transport(TransportError::Cancelled)));
    assert_eq!(conn.requests().len(), 1);
}

/// Abandoning the wait does not undo a substitution the engine already applied
#[tokio::test]
async fn test_cancelled_su_may_take_effect() {
    let engine = FakeEngine::new().with_user(
        "ops",
        "ops",
        [Privilege::universe([Permission::Execute])],
    );
    let conn = engine.connect("ops", "ops").unwrap();
    let client = BoxClient::new(Arc::clone(&conn));

    let token = CancellationToken::new();
    token.cancel();
    let ctx = Context::background().with_cancellation(token);

    let err = client
        .session()
        .su(&ctx, SuRequest::new("admin"))
        .expect("submitted")
        .get()
        .await
        .unwrap_err();
    assert!(matches!(err, BoxError::Transport(TransportError::Cancelled)));
    assert_eq!(conn.principal(), "admin");
}

/// A timeout beyond the clock's range means no deadline
#[tokio::test]
async fn test_unbounded_call_timeout() {
    let conn = Arc::new(MockConnection::with_replies([Response::success(vec![json!(true)])]));
    let config = BoxConfig::default().call_timeout(Duration::MAX);
    let client = BoxClient::with_config(conn, config);

    let exists = client
        .schema()
        .user()
        .exists(&Context::background(), "admin")
        .await
        .expect("exists");
    assert!(exists);
}

/// The configured call timeout applies when the context has no deadline
#[tokio::test]
async fn test_configured_timeout() {
    let conn = Arc::new(MockConnection::new());
    conn.push_hang();
    let config = BoxConfig::default().call_timeout(Duration::from_millis(20));
    let client = BoxClient::with_config(conn, config);

    let err = client.info(&Context::background()).await.unwrap_err();
    assert!(matches!(err, BoxError::Transport(TransportError::Timeout)));
}

/// A context deadline wins over the configured timeout
#[tokio::test]
async fn test_context_deadline() {
    let conn = Arc::new(MockConnection::new());
    conn.push_hang();
    let client = BoxClient::with_config(conn, BoxConfig::default().no_call_timeout());

    let ctx = Context::background().with_timeout(Duration::from_millis(20));
    let err = client
        .session()
        .su(&ctx, SuRequest::new("admin"))
        .unwrap()
        .get()
        .await
        .unwrap_err();
    assert!(matches!(err, BoxError::Transport(TransportError::Timeout)));
}
