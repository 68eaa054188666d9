// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP webhook trigger fired before an account activates.
//!
//! The usual target rotates the egress IP of the account's proxy, which tends
//! to sever the connection that asked for it. A timeout or a dropped
//! connection is therefore reported as success.

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use paceline_core::{PacelineError, WebhookTrigger};
use reqwest::Method;
use tracing::debug;

pub struct HttpWebhook {
    client: reqwest::Client,
}

impl HttpWebhook {
    pub fn new() -> Result<Self, PacelineError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PacelineError::Webhook(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

/// True if the error chain shows the peer dropped the connection.
fn is_connection_drop(error: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = error.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<io::Error>()
            && matches!(
                io.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            )
        {
            return true;
        }
        if err.to_string().contains("connection closed") {
            return true;
        }
        source = err.source();
    }
    false
}

#[async_trait]
impl WebhookTrigger for HttpWebhook {
    async fn invoke(
        &self,
        url: &str,
        method: &str,
        timeout: Duration,
    ) -> Result<(), PacelineError> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| PacelineError::Webhook(format!("invalid HTTP method `{method}`")))?;

        match self
            .client
            .request(method.clone(), url)
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!(url, %method, status = %response.status(), "webhook triggered");
                Ok(())
            }
            Ok(response) => Err(PacelineError::Webhook(format!(
                "{method} {url} returned {}",
                response.status()
            ))),
            Err(e) if e.is_timeout() => {
                debug!(url, %method, "webhook timed out, treating as triggered");
                Ok(())
            }
            Err(e) if is_connection_drop(&e) => {
                debug!(url, %method, error = %e, "webhook connection dropped, treating as triggered");
                Ok(())
            }
            Err(e) => Err(PacelineError::Webhook(format!("{method} {url} failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn success_status_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rotate"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let hook = HttpWebhook::new().unwrap();
        hook.invoke(
            &format!("{}/rotate", server.uri()),
            "post",
            Duration::from_secs(2),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let hook = HttpWebhook::new().unwrap();
        let err = hook
            .invoke(&server.uri(), "GET", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, PacelineError::Webhook(_)));
    }

    #[tokio::test]
    async fn timeout_counts_as_triggered() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let hook = HttpWebhook::new().unwrap();
        hook.invoke(&server.uri(), "GET", Duration::from_millis(100))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn invalid_method_rejected() {
        let hook = HttpWebhook::new().unwrap();
        let err = hook
            .invoke("http://127.0.0.1:9/", "NOT A METHOD", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid HTTP method"));
    }
}
