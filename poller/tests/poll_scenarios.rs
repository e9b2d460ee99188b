use mockito::{Matcher, Mock, ServerGuard};
use poller::poll::{PollSettings, Poller, Step, TelemetrySink};
use poller::session::{Session, LOGIN_PATH};
use poller::telemetry::timeseries_path;
use poller::{Error, TelemetryQuery, TimeseriesData, Zone};
use serde_json::json;
use std::time::Duration;

const DEVICE: &str = "ebaeb540-e37c-11ef-ad09-515f790ed9df";

#[derive(Default)]
struct RecordingSink {
    batches: Vec<TimeseriesData>,
}

impl TelemetrySink for RecordingSink {
    fn handle(&mut self, data: &TimeseriesData) {
        self.batches.push(data.clone());
    }
}

fn settings(start: &str) -> PollSettings {
    PollSettings {
        username: "user@example.com".to_string(),
        password: "secret".to_string(),
        query: TelemetryQuery::new(DEVICE, "temperature", start, "3-5-2025 0:0:0")
            .with_zone(Zone::utc()),
        poll_interval: Duration::from_millis(50),
    }
}

fn new_poller(server: &ServerGuard) -> Poller<RecordingSink> {
    let session = Session::new(server.url(), Some(Duration::from_secs(5))).unwrap();
    Poller::new(session, settings("2-2-2025 0:0:0"), RecordingSink::default())
}

async fn login_mock(server: &mut ServerGuard, token: &str) -> Mock {
    server
        .mock("POST", LOGIN_PATH)
        .match_body(Matcher::Json(
            json!({"username": "user@example.com", "password": "secret"}),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"token": token, "refreshToken": format!("{token}-refresh")}).to_string())
        .create_async()
        .await
}

fn telemetry_body() -> String {
    json!({
        "temperature": [
            {"ts": 1738454460000_i64, "value": "25.4"},
            {"ts": 1738454400000_i64, "value": "25.1"}
        ]
    })
    .to_string()
}

#[tokio::test]
async fn test_login_then_poll_until_shutdown() {
    let mut server = mockito::Server::new_async().await;
    let login = login_mock(&mut server, "tok-1").await;
    let telemetry = server
        .mock("GET", timeseries_path(DEVICE).as_str())
        .match_header("authorization", "Bearer tok-1")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("keys".into(), "temperature".into()),
            Matcher::UrlEncoded("startTs".into(), "1738454400000".into()),
            Matcher::UrlEncoded("endTs".into(), "1746230400000".into()),
            Matcher::UrlEncoded("useStrictDataTypes".into(), "false".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(telemetry_body())
        .expect_at_least(2)
        .create_async()
        .await;

    let mut poller = new_poller(&server);
    poller
        .run(tokio::time::sleep(Duration::from_millis(400)))
        .await
        .unwrap();

    login.assert_async().await;
    telemetry.assert_async().await;

    let batches = &poller.sink().batches;
    assert!(batches.len() >= 2);
    assert_eq!(batches[0].latest("temperature").unwrap().value, json!("25.4"));
}

#[tokio::test]
async fn test_expired_token_triggers_relogin() {
    let mut server = mockito::Server::new_async().await;
    let first_login = login_mock(&mut server, "tok-1").await;

    let mut poller = new_poller(&server);
    poller.start().await.unwrap();
    first_login.remove_async().await;

    let second_login = login_mock(&mut server, "tok-2").await;
    let expired = server
        .mock("GET", timeseries_path(DEVICE).as_str())
        .match_header("authorization", "Bearer tok-1")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"status": 401, "message": "Token has expired", "errorCode": 11}"#)
        .expect(1)
        .create_async()
        .await;
    let fresh = server
        .mock("GET", timeseries_path(DEVICE).as_str())
        .match_header("authorization", "Bearer tok-2")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(telemetry_body())
        .expect(1)
        .create_async()
        .await;

    assert_eq!(poller.step().await.unwrap(), Step::Reauthenticated);
    assert_eq!(
        poller.session().credentials().unwrap().access_token(),
        "tok-2"
    );
    assert_eq!(poller.step().await.unwrap(), Step::Fetched { points: 2 });

    second_login.assert_async().await;
    expired.assert_async().await;
    fresh.assert_async().await;
}

#[tokio::test]
async fn test_failed_relogin_keeps_polling() {
    let mut server = mockito::Server::new_async().await;
    let ok_login = login_mock(&mut server, "tok-1").await;

    let mut poller = new_poller(&server);
    poller.start().await.unwrap();
    ok_login.remove_async().await;

    let _mock = server
        .mock("POST", LOGIN_PATH)
        .with_status(503)
        .with_body("maintenance")
        .create_async()
        .await;
    let _mock = server
        .mock("GET", timeseries_path(DEVICE).as_str())
        .match_query(Matcher::Any)
        .with_status(401)
        .create_async()
        .await;

    let step = poller.step().await.unwrap();
    assert_eq!(step, Step::ReauthFailed);
    assert_eq!(
        poller.session().credentials().unwrap().access_token(),
        "tok-1"
    );
    assert_eq!(poller.delay_after(step), Duration::from_millis(50));

    let step = poller.step().await.unwrap();
    assert_eq!(step, Step::ReauthFailed);
    assert_eq!(poller.delay_after(step), Duration::from_millis(100));
}

#[tokio::test]
async fn test_login_failure_at_startup_never_polls() {
    let mut server = mockito::Server::new_async().await;
    let login = server
        .mock("POST", LOGIN_PATH)
        .with_status(401)
        .with_body(r#"{"status": 401, "message": "Invalid username or password"}"#)
        .expect(1)
        .create_async()
        .await;
    let telemetry = server
        .mock("GET", timeseries_path(DEVICE).as_str())
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let mut poller = new_poller(&server);
    let err = poller
        .run(tokio::time::sleep(Duration::from_secs(5)))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Auth { .. }));
    assert_eq!(err.status_code(), Some(401));
    assert!(poller.session().credentials().is_none());
    assert!(poller.sink().batches.is_empty());

    login.assert_async().await;
    telemetry.assert_async().await;
}

#[tokio::test]
async fn test_invalid_start_time_is_fatal() {
    let mut server = mockito::Server::new_async().await;
    let login = server
        .mock("POST", LOGIN_PATH)
        .expect(0)
        .create_async()
        .await;

    let session = Session::new(server.url(), None).unwrap();
    let mut poller = Poller::new(
        session,
        settings("31-02-2025 00:00:00"),
        RecordingSink::default(),
    );

    let err = poller
        .run(tokio::time::sleep(Duration::from_secs(5)))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidTimeFormat(ref s) if s == "31-02-2025 00:00:00"));
    assert!(err.is_fatal());
    login.assert_async().await;
}

#[tokio::test]
async fn test_server_errors_back_off_and_recover() {
    let mut server = mockito::Server::new_async().await;
    let _login = login_mock(&mut server, "tok-1").await;

    let mut poller = new_poller(&server);
    poller.start().await.unwrap();

    let failing = server
        .mock("GET", timeseries_path(DEVICE).as_str())
        .match_query(Matcher::Any)
        .with_status(502)
        .with_body("bad gateway")
        .create_async()
        .await;

    let mut delays = Vec::new();
    for _ in 0..5 {
        let step = poller.step().await.unwrap();
        assert_eq!(step, Step::Failed);
        delays.push(poller.delay_after(step).as_millis());
    }
    assert_eq!(delays, vec![50, 100, 200, 400, 800]);

    failing.remove_async().await;
    let _mock = server
        .mock("GET", timeseries_path(DEVICE).as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(telemetry_body())
        .create_async()
        .await;

    let step = poller.step().await.unwrap();
    assert_eq!(step, Step::Fetched { points: 2 });
    assert_eq!(poller.delay_after(step), Duration::from_millis(50));
}

#[tokio::test]
async fn test_shutdown_during_sleep() {
    let mut server = mockito::Server::new_async().await;
    let _login = login_mock(&mut server, "tok-1").await;
    let telemetry = server
        .mock("GET", timeseries_path(DEVICE).as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(telemetry_body())
        .expect(1)
        .create_async()
        .await;

    let session = Session::new(server.url(), None).unwrap();
    let mut settings = settings("2-2-2025 0:0:0");
    settings.poll_interval = Duration::from_secs(60);
    let mut poller = Poller::new(session, settings, RecordingSink::default());

    tokio::time::timeout(
        Duration::from_secs(5),
        poller.run(tokio::time::sleep(Duration::from_millis(300))),
    )
    .await
    .expect("poller should stop on shutdown")
    .unwrap();

    telemetry.assert_async().await;
    assert_eq!(poller.sink().batches.len(), 1);
}
