//! A client for dispatching offline alerts through a Resend-compatible
//! transactional mail API.

use crate::config::NotificationConfig;
use crate::core::{Notifier, OfflineAlert};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::task;
use tracing::{error, info, instrument};

/// Sends offline alerts as e-mail via an HTTP mail API.
pub struct ResendMailer {
    api_url: String,
    api_key: Option<String>,
    from: String,
    default_recipient: Option<String>,
    reply_to: Option<String>,
    timeout: std::time::Duration,
}

impl ResendMailer {
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
            default_recipient: config.recipient.clone(),
            reply_to: config.reply_to.clone(),
            timeout: std::time::Duration::from_secs(10),
        }
    }

    fn build_payload(&self, alert: &OfflineAlert, recipient: &str) -> Value {
        // A comma-separated recipient list becomes a JSON array.
        let to: Value = if recipient.contains(',') {
            Value::Array(
                recipient
                    .split(',')
                    .map(|r| Value::String(r.trim().to_string()))
                    .collect(),
            )
        } else {
            Value::String(recipient.to_string())
        };

        let message = if alert.status_message.is_empty() {
            "No details provided."
        } else {
            alert.status_message.as_str()
        };

        let mut payload = json!({
            "from": self.from,
            "to": to,
            "subject": format!(
                "[Reseedwatch] {} offline for {}h",
                alert.server_name, alert.offline_hours
            ),
            "text": format!(
                "Server {} has been offline for {} hours.\nStatus message: {}",
                alert.server_name, alert.offline_hours, message
            ),
        });
        if let Some(reply_to) = &self.reply_to {
            payload["reply_to"] = Value::String(reply_to.clone());
        }
        payload
    }

    /// Sends the request in a blocking manner.
    fn send_request(
        client: reqwest::blocking::Client,
        api_url: &str,
        api_key: &str,
        payload: &Value,
    ) -> anyhow::Result<bool> {
        let response = client
            .post(api_url)
            .bearer_auth(api_key)
            .json(payload)
            .send()?;

        if response.status().is_success() {
            Ok(true)
        } else {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            error!(
                status = %status,
                body = %text,
                "Mail API rejected the offline alert"
            );
            // Rejection is a declined dispatch, not a transport failure; the
            // caller keeps its prior notification timestamp.
            Ok(false)
        }
    }
}

#[async_trait]
impl Notifier for ResendMailer {
    #[instrument(skip(self, alert), fields(server = %alert.server_name))]
    async fn send_offline_alert(&self, alert: &OfflineAlert) -> anyhow::Result<bool> {
        let Some(api_key) = self.api_key.clone() else {
            return Ok(false);
        };
        let recipient = match alert
            .recipient_override
            .as_deref()
            .filter(|r| !r.is_empty())
            .or(self.default_recipient.as_deref())
        {
            Some(recipient) => recipient.to_string(),
            None => return Ok(false),
        };

        let payload = self.build_payload(alert, &recipient);
        let api_url = self.api_url.clone();
        let timeout = self.timeout;

        let result = task::spawn_blocking(move || {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()?;
            Self::send_request(client, &api_url, &api_key, &payload)
        })
        .await;

        match result {
            Ok(Ok(sent)) => {
                if sent {
                    info!(
                        "Sent offline alert for {} ({}h offline)",
                        alert.server_name, alert.offline_hours
                    );
                }
                Ok(sent)
            }
            Ok(Err(e)) => Err(e),
            Err(e) => {
                error!(error = %e, "Mail dispatch task failed");
                Err(e.into())
            }
        }
    }
}
