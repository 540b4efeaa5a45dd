//! End-to-end request pipeline tests over real connections.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::{json, Value};
use bytes::Bytes;
use switchyard::http::{
    exception_fn, interceptor_fn, reply, Codec, CodecError, Context, ErrorWriter, ExceptionHandler, Interceptor,
    Response, X_REQUEST_ID,
};
use switchyard::routing::Route;
use switchyard::security::Throttle;
use switchyard::{Fault, Outcome, Reply, Server, ServerConfig, ServerError};

mod common;

fn counting(name: &'static str, hits: &Arc<AtomicUsize>, outcome: fn() -> Outcome) -> impl Interceptor {
    let hits = Arc::clone(hits);
    interceptor_fn(name, move |_ctx| {
        hits.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { outcome() })
    })
}

fn recorder(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> impl ExceptionHandler {
    let log = Arc::clone(log);
    exception_fn(move |_ctx, _fault| {
        log.lock().unwrap().push(name);
        Box::pin(async { Ok(()) })
    })
}

#[tokio::test]
async fn throttled_routes_are_limited_independently() {
    let mut server = common::server();
    server
        .route(
            Route::get("/one", |_ctx| Box::pin(async { Ok(Reply::text(StatusCode::OK, "one")) }))
                .before(Throttle::new(10, Duration::from_secs(60))),
        )
        .unwrap()
        .route(
            Route::get("/two", |_ctx| Box::pin(async { Ok(Reply::text(StatusCode::OK, "two")) }))
                .before(Throttle::new(10, Duration::from_secs(60))),
        )
        .unwrap();
    let base = common::serve(&mut server).await;
    let client = common::client();

    for _ in 0..10 {
        let res = client.get(format!("{base}/one")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.text().await.unwrap(), "one");
    }

    let res = client.get(format!("{base}/one")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.text().await.unwrap(), "Limit exceeded");

    let res = client.get(format!("{base}/two")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "two");

    server.close().await;
}

#[tokio::test]
async fn literal_segment_beats_parameter() {
    let mut server = common::server();
    server
        .get("/users/active", |_ctx| Box::pin(async { Ok(Reply::text(StatusCode::OK, "active users")) }))
        .unwrap()
        .get("/users/:id", |ctx| {
            Box::pin(async move {
                let id = ctx.param("id").unwrap_or_default().to_string();
                Ok(Reply::text(StatusCode::OK, format!("user {id}")))
            })
        })
        .unwrap();
    let base = common::serve(&mut server).await;
    let client = common::client();

    let res = client.get(format!("{base}/users/active")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "active users");

    let res = client.get(format!("{base}/users/42")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "user 42");

    server.close().await;
}

#[tokio::test]
async fn unknown_path_and_wrong_method() {
    let mut server = common::server();
    server
        .get("/only-get", |_ctx| Box::pin(async { Ok(Reply::empty(StatusCode::OK)) }))
        .unwrap();
    let base = common::serve(&mut server).await;
    let client = common::client();

    let res = client.get(format!("{base}/missing")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.text().await.unwrap(), "Not Found");

    let res = client.post(format!("{base}/only-get")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers()["allow"], "GET");

    server.close().await;
}

#[tokio::test]
async fn short_circuit_skips_later_stages() {
    let first = Arc::new(AtomicUsize::new(0));
    let blocker = Arc::new(AtomicUsize::new(0));
    let third = Arc::new(AtomicUsize::new(0));
    let after = Arc::new(AtomicUsize::new(0));
    let handled = Arc::new(AtomicUsize::new(0));

    let mut server = common::server();
    let handler_hits = Arc::clone(&handled);
    server
        .route(
            Route::get("/guarded", move |_ctx| {
                handler_hits.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(Reply::empty(StatusCode::OK)) })
            })
            .before(counting("first", &first, || Outcome::Continue))
            .before(counting("blocker", &blocker, || {
                Outcome::ShortCircuit(reply::text(StatusCode::UNAUTHORIZED, "no entry"))
            }))
            .before(counting("third", &third, || Outcome::Continue))
            .after(counting("after", &after, || Outcome::Continue)),
        )
        .unwrap();
    let base = common::serve(&mut server).await;

    let res = common::client().get(format!("{base}/guarded")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.text().await.unwrap(), "no entry");

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(blocker.load(Ordering::SeqCst), 1);
    assert_eq!(third.load(Ordering::SeqCst), 0);
    assert_eq!(handled.load(Ordering::SeqCst), 0);
    assert_eq!(after.load(Ordering::SeqCst), 1);

    server.close().await;
}

#[tokio::test]
async fn exception_handlers_run_in_reverse_order() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut server = common::server();
    server
        .route(
            Route::get("/fail", |_ctx| Box::pin(async { Err(Fault::msg("database unavailable")) }))
                .on_exception(recorder("A", &log))
                .on_exception(recorder("B", &log))
                .on_exception(recorder("C", &log)),
        )
        .unwrap();
    let base = common::serve(&mut server).await;

    let res = common::client().get(format!("{base}/fail")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.text().await.unwrap(), "Internal Server Error");
    assert_eq!(*log.lock().unwrap(), vec!["C", "B", "A"]);

    server.close().await;
}

#[tokio::test]
async fn session_is_written_only_when_dirty() {
    let sessions = Arc::new(common::CountingSessions::default());

    let mut server = common::server();
    server
        .with_session_manager(Arc::clone(&sessions))
        .unwrap()
        .get("/plain", |_ctx| Box::pin(async { Ok(Reply::empty(StatusCode::OK)) }))
        .unwrap()
        .get("/peek", |ctx| {
            Box::pin(async move {
                let visits = ctx.session().await?.get_as::<u64>("visits").unwrap_or(0);
                Ok(Reply::text(StatusCode::OK, visits.to_string()))
            })
        })
        .unwrap()
        .get("/bump", |ctx| {
            Box::pin(async move {
                let session = ctx.session_mut().await?;
                let visits = session.get_as::<u64>("visits").unwrap_or(0) + 1;
                session.insert("visits", visits)?;
                Ok(Reply::text(StatusCode::OK, visits.to_string()))
            })
        })
        .unwrap();
    let base = common::serve(&mut server).await;
    let client = common::client();

    client.get(format!("{base}/plain")).send().await.unwrap();
    assert_eq!((sessions.reads(), sessions.writes()), (0, 0));

    client.get(format!("{base}/peek")).send().await.unwrap();
    assert_eq!((sessions.reads(), sessions.writes()), (1, 0));

    let res = client.get(format!("{base}/bump")).send().await.unwrap();
    assert_eq!((sessions.reads(), sessions.writes()), (2, 1));
    let cookie = res.headers()["set-cookie"].to_str().unwrap().to_string();
    let sid = cookie.split(';').next().unwrap().to_string();

    let res = client
        .get(format!("{base}/peek"))
        .header("cookie", &sid)
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), "1");
    assert_eq!(sessions.writes(), 1);

    server.close().await;
}

#[tokio::test]
async fn groups_keep_the_defaults_they_were_created_with() {
    let early = Arc::new(AtomicUsize::new(0));
    let late = Arc::new(AtomicUsize::new(0));

    let mut server = common::server();
    server.before(counting("early", &early, || Outcome::Continue)).unwrap();
    let mut api = server.group("/api");
    server.before(counting("late", &late, || Outcome::Continue)).unwrap();

    api.get("/ping", |_ctx| Box::pin(async { Ok(Reply::text(StatusCode::OK, "pong")) }));
    server
        .mount(api)
        .unwrap()
        .get("/root", |_ctx| Box::pin(async { Ok(Reply::empty(StatusCode::OK)) }))
        .unwrap();
    let base = common::serve(&mut server).await;
    let client = common::client();

    let res = client.get(format!("{base}/api/ping")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "pong");
    assert_eq!((early.load(Ordering::SeqCst), late.load(Ordering::SeqCst)), (1, 0));

    client.get(format!("{base}/root")).send().await.unwrap();
    assert_eq!((early.load(Ordering::SeqCst), late.load(Ordering::SeqCst)), (2, 1));

    server.close().await;
}

#[tokio::test]
async fn request_id_is_echoed() {
    let mut server = common::server();
    server
        .get("/", |_ctx| Box::pin(async { Ok(Reply::empty(StatusCode::NO_CONTENT)) }))
        .unwrap();
    let base = common::serve(&mut server).await;
    let client = common::client();

    let res = client.get(format!("{base}/")).send().await.unwrap();
    let generated = res.headers()[X_REQUEST_ID.as_str()].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(generated).is_ok());

    let incoming = uuid::Uuid::new_v4().to_string();
    let res = client
        .get(format!("{base}/missing"))
        .header(X_REQUEST_ID.as_str(), &incoming)
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()[X_REQUEST_ID.as_str()], incoming.as_str());

    server.close().await;
}

#[tokio::test]
async fn bodies_are_decoded_and_limited() {
    let mut config = ServerConfig::default();
    config.http.max_body_bytes = 64;
    let mut server = Server::new(config);
    server
        .post("/sum", |ctx| {
            Box::pin(async move {
                let numbers: Vec<i64> = ctx.body_as()?;
                Reply::json(StatusCode::OK, &json!({ "sum": numbers.iter().sum::<i64>() }))
            })
        })
        .unwrap();
    let base = common::serve(&mut server).await;
    let client = common::client();

    let res = client.post(format!("{base}/sum")).json(&json!([1, 2, 3])).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "sum": 6 }));

    let res = client.post(format!("{base}/sum")).json(&json!({ "not": "a list" })).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = client
        .post(format!("{base}/sum"))
        .header("content-type", "application/xml")
        .body("<numbers/>")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let res = client.post(format!("{base}/sum")).body(vec![b'1'; 1024]).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(res.headers().contains_key(X_REQUEST_ID.as_str()));

    server.close().await;
}

#[tokio::test]
async fn registration_is_rejected_once_serving() {
    let mut server = common::server();
    server
        .get("/", |_ctx| Box::pin(async { Ok(Reply::empty(StatusCode::OK)) }))
        .unwrap();
    common::serve(&mut server).await;

    let late = server.get("/late", |_ctx| Box::pin(async { Ok(Reply::empty(StatusCode::OK)) }));
    assert!(matches!(late, Err(ServerError::AlreadyStarted)));
    let late = server.before(interceptor_fn("late", |_ctx| Box::pin(async { Outcome::Continue })));
    assert!(matches!(late, Err(ServerError::AlreadyStarted)));

    server.close().await;
}

#[tokio::test]
async fn one_shared_throttle_keeps_a_bucket_per_route() {
    let mut server = common::server();
    server
        .before(Throttle::new(10, Duration::from_secs(60)))
        .unwrap()
        .get("/one", |_ctx| Box::pin(async { Ok(Reply::text(StatusCode::OK, "one")) }))
        .unwrap()
        .get("/two", |_ctx| Box::pin(async { Ok(Reply::text(StatusCode::OK, "two")) }))
        .unwrap();
    let base = common::serve(&mut server).await;
    let client = common::client();

    for _ in 0..10 {
        let res = client.get(format!("{base}/one")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
    let res = client.get(format!("{base}/one")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

    let res = client.get(format!("{base}/two")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "two");

    server.close().await;
}

#[tokio::test]
async fn captured_segments_are_percent_decoded() {
    let mut server = common::server();
    server
        .get("/echo/:word", |ctx| {
            Box::pin(async move {
                let word = ctx.param("word").unwrap_or_default().to_string();
                Ok(Reply::text(StatusCode::OK, word))
            })
        })
        .unwrap()
        .get("/caf\u{e9}", |_ctx| Box::pin(async { Ok(Reply::text(StatusCode::OK, "menu")) }))
        .unwrap();
    let base = common::serve(&mut server).await;
    let client = common::client();

    let res = client.get(format!("{base}/echo/hello%20world")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "hello world");

    let res = client.get(format!("{base}/caf%C3%A9")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "menu");

    server.close().await;
}

struct JsonErrors;

impl ErrorWriter for JsonErrors {
    fn not_found(&self, ctx: &Context) -> Response {
        reply::json(StatusCode::NOT_FOUND, &json!({ "error": "no route", "path": ctx.path() }))
            .unwrap_or_else(|_| reply::internal_error())
    }

    fn internal(&self, ctx: &Context, _fault: &Fault) -> Response {
        reply::json(StatusCode::INTERNAL_SERVER_ERROR, &json!({ "error": "failed", "id": ctx.id().to_string() }))
            .unwrap_or_else(|_| reply::internal_error())
    }
}

#[tokio::test]
async fn configured_error_writer_renders_framework_errors() {
    let mut server = common::server();
    server
        .with_error_writer(JsonErrors)
        .unwrap()
        .get("/fail", |_ctx| Box::pin(async { Err(Fault::msg("disk full")) }))
        .unwrap();
    let base = common::serve(&mut server).await;
    let client = common::client();

    let res = client.get(format!("{base}/nowhere")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "error": "no route", "path": "/nowhere" }));

    let res = client.get(format!("{base}/fail")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let id = res.headers()[X_REQUEST_ID.as_str()].to_str().unwrap().to_string();
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "error": "failed", "id": id }));

    server.close().await;
}

/// Comma-separated integers, e.g. `1,2,3`.
struct CsvCodec;

impl Codec for CsvCodec {
    fn mime(&self) -> &'static str {
        "text/csv"
    }

    fn encode(&self, value: &Value) -> Result<Bytes, CodecError> {
        let items = value.as_array().ok_or_else(|| CodecError::Malformed("expected a list".into()))?;
        let fields: Vec<String> = items.iter().map(Value::to_string).collect();
        Ok(Bytes::from(fields.join(",")))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        let text = std::str::from_utf8(bytes).map_err(|e| CodecError::Malformed(e.to_string()))?;
        text.split(',')
            .map(|field| field.trim().parse::<i64>().map(Value::from))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
            .map_err(|e| CodecError::Malformed(e.to_string()))
    }
}

#[tokio::test]
async fn registered_codec_is_used_for_bodies() {
    let mut server = common::server();
    server
        .register_codec(CsvCodec)
        .unwrap()
        .post("/double", |ctx| {
            Box::pin(async move {
                let numbers: Vec<i64> = ctx.body_as()?;
                let doubled = json!(numbers.iter().map(|n| n * 2).collect::<Vec<_>>());
                Ok(Reply::Response(ctx.encode(StatusCode::OK, "text/csv", &doubled)?))
            })
        })
        .unwrap();
    let base = common::serve(&mut server).await;

    let res = common::client()
        .post(format!("{base}/double"))
        .header("content-type", "text/csv; charset=utf-8")
        .body("1,2,3")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "text/csv");
    assert_eq!(res.text().await.unwrap(), "2,4,6");

    server.close().await;
}

#[tokio::test]
async fn log_to_replaces_the_server_span() {
    let _subscriber = tracing::subscriber::set_default(tracing_subscriber::fmt().with_test_writer().finish());

    let mut server = common::server();
    server
        .log_to(tracing::info_span!("tenant", name = "blue"))
        .unwrap()
        .get("/", |_ctx| Box::pin(async { Ok(Reply::empty(StatusCode::OK)) }))
        .unwrap();
    assert_eq!(server.span().metadata().map(|m| m.name()), Some("tenant"));

    let base = common::serve(&mut server).await;
    let dispatcher = server.dispatcher().unwrap();
    assert_eq!(dispatcher.span().metadata().map(|m| m.name()), Some("tenant"));

    let res = common::client().get(format!("{base}/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(matches!(
        server.log_to(tracing::info_span!("late")),
        Err(ServerError::AlreadyStarted)
    ));

    server.close().await;
}
