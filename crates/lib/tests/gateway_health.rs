//! Integration test: start the gateway on a free port with a stubbed relay,
//! GET /, assert health JSON; exercise the Telegram webhook secret check.
//! Does not require Telegram or the assistant service.

use lib::config::Config;
use lib::gateway;
use lib::relay::{MessageRelay, RelayError};
use std::sync::Arc;
use std::time::Duration;

struct EchoRelay;

#[async_trait::async_trait]
impl MessageRelay for EchoRelay {
    async fn relay(&self, text: &str) -> Result<String, RelayError> {
        Ok(format!("echo: {}", text))
    }
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

async fn wait_until_healthy(client: &reqwest::Client, url: &str) -> serde_json::Value {
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => {
                return resp.json().await.expect("parse JSON");
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "GET {} did not return 200 within 5s; last error: {:?}",
        url, last_err
    );
}

#[tokio::test]
async fn gateway_health_http_responds_with_running() {
    let port = free_port();
    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();

    let _gateway = tokio::spawn(async move {
        let _ = gateway::run_gateway(config, Arc::new(EchoRelay)).await;
    });

    let url = format!("http://127.0.0.1:{}/", port);
    let client = reqwest::Client::new();
    let json = wait_until_healthy(&client, &url).await;
    assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
    assert_eq!(json.get("port").and_then(|v| v.as_u64()), Some(port as u64));
    assert!(json.get("startedAt").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn telegram_webhook_enforces_the_configured_secret() {
    let port = free_port();
    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    config.channels.telegram.webhook_secret = Some("s3cret".to_string());

    let _gateway = tokio::spawn(async move {
        let _ = gateway::run_gateway(config, Arc::new(EchoRelay)).await;
    });

    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();
    wait_until_healthy(&client, &format!("{}/", base)).await;

    let update = serde_json::json!({
        "update_id": 1,
        "message": { "chat": { "id": 42 }, "text": "hello" }
    });
    let webhook = format!("{}/telegram/webhook", base);

    let resp = client
        .post(&webhook)
        .json(&update)
        .send()
        .await
        .expect("post without secret");
    assert_eq!(resp.status().as_u16(), 403);

    let resp = client
        .post(&webhook)
        .header("X-Telegram-Bot-Api-Secret-Token", "wrong")
        .json(&update)
        .send()
        .await
        .expect("post with wrong secret");
    assert_eq!(resp.status().as_u16(), 403);

    let resp = client
        .post(&webhook)
        .header("X-Telegram-Bot-Api-Secret-Token", "s3cret")
        .json(&update)
        .send()
        .await
        .expect("post with secret");
    assert_eq!(resp.status().as_u16(), 200);

    let resp = client
        .post(&webhook)
        .header("X-Telegram-Bot-Api-Secret-Token", "s3cret")
        .body("not json")
        .header("content-type", "application/json")
        .send()
        .await
        .expect("post invalid body");
    assert_eq!(resp.status().as_u16(), 400);
}
