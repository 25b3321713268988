//! Retrying POST shared by both providers.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::types::GenerateParams;

/// Build an HTTP client with the connect/request timeouts from `params`.
pub(crate) fn build_client(params: &GenerateParams) -> anyhow::Result<Client> {
    Ok(Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .timeout(params.request_timeout())
        .build()?)
}

/// Join `path` onto `base`, treating `base` as a directory even without a
/// trailing slash (`http://h/v1` + `chat/completions` → `http://h/v1/chat/completions`).
pub(crate) fn endpoint(base: &Url, path: &str) -> anyhow::Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    Ok(base.join(path.trim_start_matches('/'))?)
}

/// POST `body` as JSON, retrying 5xx responses and transport errors up to
/// `params.max_attempts` times with exponential backoff. 4xx responses fail
/// immediately since repeating them cannot help.
pub(crate) async fn post_with_attempts<T: Serialize + ?Sized>(
    client: &Client,
    url: &Url,
    body: &T,
    bearer: Option<&str>,
    params: &GenerateParams,
) -> anyhow::Result<reqwest::Response> {
    let attempts = params.max_attempts.max(1);
    let mut last_err = None;
    for attempt in 0..attempts {
        if attempt > 0 {
            let delay = params.backoff(attempt - 1);
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, url = %url, "Retrying request");
            tokio::time::sleep(delay).await;
        }

        let mut req = client.post(url.clone()).json(body);
        if let Some(key) = bearer {
            req = req.bearer_auth(key);
        }

        match req.send().await {
            Ok(resp) if resp.status().is_server_error() => {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                last_err = Some(anyhow::anyhow!("Server error {status}: {text}"));
            }
            Ok(resp) if resp.status().is_client_error() => {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                anyhow::bail!("Client error {status}: {text}");
            }
            Ok(resp) => return Ok(resp),
            Err(e) => {
                tracing::warn!(error = %e, url = %url, "Transport error");
                last_err = Some(anyhow::anyhow!("Request failed: {e}"));
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Request failed after {attempts} attempts")))
}
