use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::MailConfig;
use crate::models::ContactForm;

/// A contact-form submission ready for delivery.
#[derive(Debug, Clone, Serialize)]
pub struct ContactMessage {
    pub to: String,
    pub reply_to: String,
    pub subject: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl ContactMessage {
    pub fn from_form(form: &ContactForm, to: &str) -> Self {
        Self {
            to: to.to_string(),
            reply_to: form.email.trim().to_string(),
            subject: format!("Website contact from {}", form.name.trim()),
            text: format!(
                "Name: {}\nEmail: {}\n\n{}",
                form.name.trim(),
                form.email.trim(),
                form.message.trim()
            ),
            received_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait MailRelay: Send + Sync {
    async fn send(&self, message: &ContactMessage) -> Result<()>;
}

/// Posts messages as JSON to an HTTP mail relay.
pub struct HttpMailRelay {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpMailRelay {
    pub fn new(client: reqwest::Client, url: String, token: Option<String>, timeout: Duration) -> Self {
        Self {
            client,
            url,
            token,
            timeout,
        }
    }
}

#[async_trait]
impl MailRelay for HttpMailRelay {
    async fn send(&self, message: &ContactMessage) -> Result<()> {
        let mut req = self.client.post(&self.url).timeout(self.timeout).json(message);
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }

        let resp = req.send().await.context("Failed to reach mail relay")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Mail relay returned {status}: {body}");
        }
        Ok(())
    }
}

/// Stand-in used when no relay is configured: logs the message and succeeds.
pub struct LogMailRelay;

#[async_trait]
impl MailRelay for LogMailRelay {
    async fn send(&self, message: &ContactMessage) -> Result<()> {
        tracing::info!(
            to = %message.to,
            reply_to = %message.reply_to,
            "No mail relay configured; contact message not delivered: {}",
            message.subject
        );
        Ok(())
    }
}

/// Pick the relay implied by the configuration.
pub fn relay_from_config(client: reqwest::Client, config: &MailConfig) -> Arc<dyn MailRelay> {
    match &config.relay_url {
        Some(url) => Arc::new(HttpMailRelay::new(
            client,
            url.clone(),
            config.relay_token.clone(),
            Duration::from_secs(config.timeout_secs),
        )),
        None => Arc::new(LogMailRelay),
    }
}
