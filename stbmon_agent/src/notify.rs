//! Outbound alert delivery. Delivery is fire-and-forget: callers hand over a
//! message and move on; failures end up in the log and nowhere else.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

const TELEGRAM_API: &str = "https://api.telegram.org";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub trait Notifier: Send + Sync {
    /// Best effort. Must not block the caller and never reports failure.
    fn notify(&self, message: String);
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("telegram answered {0}")]
    Status(reqwest::StatusCode),
}

/// Used when no Telegram credentials are configured.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: String) {
        info!(%message, "alert (no telegram credentials, not sent)");
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: &str) -> Result<Self, NotifyError> {
        Self::with_api_base(TELEGRAM_API, token, chat_id)
    }

    /// Point at a different Bot API host (self-hosted API server, tests).
    pub fn with_api_base(base: &str, token: &str, chat_id: &str) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{token}/sendMessage", base.trim_end_matches('/')),
            chat_id: chat_id.to_string(),
        })
    }

    /// Reads STBMON_TELEGRAM_TOKEN and STBMON_TELEGRAM_CHAT_ID.
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("STBMON_TELEGRAM_TOKEN").ok().filter(|v| !v.is_empty())?;
        let chat = std::env::var("STBMON_TELEGRAM_CHAT_ID").ok().filter(|v| !v.is_empty())?;
        match Self::new(&token, &chat) {
            Ok(n) => Some(n),
            Err(e) => {
                warn!("telegram client setup failed: {e}");
                None
            }
        }
    }

    pub async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
                parse_mode: "HTML",
            })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(NotifyError::Status(resp.status()));
        }
        debug!("telegram message delivered");
        Ok(())
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, message: String) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime, alert dropped");
            return;
        };
        let this = self.clone();
        handle.spawn(async move {
            if let Err(e) = this.send(&message).await {
                warn!("telegram send failed: {e}");
            }
        });
    }
}

/// Telegram when credentials are present, log-only otherwise.
pub fn notifier_from_env() -> Arc<dyn Notifier> {
    match TelegramNotifier::from_env() {
        Some(t) => {
            info!("telegram alerts enabled");
            Arc::new(t)
        }
        None => {
            info!("STBMON_TELEGRAM_TOKEN/STBMON_TELEGRAM_CHAT_ID not set; alerts are only logged");
            Arc::new(LogNotifier)
        }
    }
}
