use std::time::Duration;

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("{0}")]
    Request(#[from] reqwest::Error),
}

/// GET `url` and read the whole body as text.
///
/// Any HTTP status counts as success; only transport failures and timeouts
/// are errors. Must be polled on a tokio runtime.
pub async fn fetch_text(url: Url, timeout: Option<Duration>) -> Result<String, FetchError> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    let client = builder.build().map_err(FetchError::Client)?;

    tracing::debug!(%url, "fetching");
    let response = client.get(url).send().await?;
    let status = response.status();
    let body = response.text().await?;
    tracing::debug!(%status, bytes = body.len(), "fetch complete");
    Ok(body)
}
