//! TelegramNotifier against a local stand-in for the Bot API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use stbmon_agent::notify::{Notifier, NotifyError, TelegramNotifier};

type Captured = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

async fn fake_api(status: StatusCode) -> (String, Captured) {
    let captured: Captured = Arc::default();
    let app = Router::new()
        .route(
            "/:bot/sendMessage",
            post(
                move |State(c): State<Captured>,
                      axum::extract::Path(bot): axum::extract::Path<String>,
                      Json(body): Json<serde_json::Value>| async move {
                    c.lock().unwrap().push((bot, body));
                    status
                },
            ),
        )
        .with_state(captured.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), captured)
}

#[tokio::test]
async fn send_posts_html_message_to_chat() {
    let (base, captured) = fake_api(StatusCode::OK).await;
    let tg = TelegramNotifier::with_api_base(&base, "123:abc", "-1001").unwrap();
    tg.send("🚨 <b>STB RAM ALERT</b>").await.unwrap();

    let got = captured.lock().unwrap().clone();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].0, "bot123:abc");
    assert_eq!(got[0].1["chat_id"], "-1001");
    assert_eq!(got[0].1["text"], "🚨 <b>STB RAM ALERT</b>");
    assert_eq!(got[0].1["parse_mode"], "HTML");
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let (base, _) = fake_api(StatusCode::UNAUTHORIZED).await;
    let tg = TelegramNotifier::with_api_base(&base, "bad", "1").unwrap();
    match tg.send("x").await {
        Err(NotifyError::Status(s)) => assert_eq!(s.as_u16(), 401),
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn notify_is_fire_and_forget() {
    let (base, captured) = fake_api(StatusCode::OK).await;
    let tg = TelegramNotifier::with_api_base(&base, "t", "c").unwrap();
    tg.notify("hello".to_string());

    for _ in 0..100 {
        if !captured.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(captured.lock().unwrap()[0].1["text"], "hello");
}

#[tokio::test]
async fn unreachable_api_does_not_panic_the_caller() {
    // nothing listens on port 9 of localhost in the test environment
    let tg = TelegramNotifier::with_api_base("http://127.0.0.1:9", "t", "c").unwrap();
    tg.notify("lost".to_string());
    assert!(tg.send("lost").await.is_err());
}
