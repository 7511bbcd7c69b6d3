use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response, Url};

use crate::common::cluster::{
    OperationResult, PingResponse, SECRET_HEADER, SourceStatusResponse, StorageInfo,
};
use crate::common::storage::StorageRegistration;

/// Outbound client bound to one worker's command API.
#[derive(Clone)]
pub struct NodeClient {
    base: Url,
    http: Client,
}

impl NodeClient {
    pub fn new(url: &str, secret: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(url).with_context(|| format!("invalid node url {}", url))?;
        let http = secret_client(secret, timeout)?;
        Ok(Self { base, http })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        join_segments(&self.base, segments)
    }

    /// Returns the version the worker reports.
    pub async fn ping(&self) -> Result<String> {
        let res = self
            .http
            .get(self.endpoint(&["cluster", "ping"])?)
            .send()
            .await?;
        let ping: PingResponse = ensure_success(res).await?.json().await?;
        Ok(ping.version)
    }

    pub async fn load_data_source(&self, name: &str) -> Result<()> {
        let url = self.endpoint(&["cluster", "data-sources", name, "load"])?;
        operation(self.http.post(url).send().await?).await
    }

    pub async fn unload_data_source(&self, name: &str) -> Result<()> {
        let url = self.endpoint(&["cluster", "data-sources", name, "unload"])?;
        operation(self.http.post(url).send().await?).await
    }

    pub async fn data_source_status(&self, name: &str) -> Result<String> {
        let url = self.endpoint(&["cluster", "data-sources", name, "status"])?;
        let res = self.http.get(url).send().await?;
        let status: SourceStatusResponse = ensure_success(res).await?.json().await?;
        Ok(status.status)
    }

    pub async fn register_storage(&self, registration: &StorageRegistration) -> Result<()> {
        let url = self.endpoint(&["cluster", "storages"])?;
        operation(self.http.post(url).json(registration).send().await?).await
    }

    pub async fn unregister_storage(&self, name: &str) -> Result<()> {
        let url = self.endpoint(&["cluster", "storages", name])?;
        operation(self.http.delete(url).send().await?).await
    }

    pub async fn registered_storages(&self) -> Result<Vec<StorageInfo>> {
        let url = self.endpoint(&["cluster", "storages"])?;
        let res = self.http.get(url).send().await?;
        Ok(ensure_success(res).await?.json().await?)
    }
}

/// HTTP client that sends the cluster secret on every request.
pub(crate) fn secret_client(secret: &str, timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        SECRET_HEADER,
        HeaderValue::from_str(secret).context("secret is not a valid header value")?,
    );
    let http = Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()?;
    Ok(http)
}

/// Appends path segments to `base`, percent-encoding each one.
pub(crate) fn join_segments(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("url {} cannot be a base", base))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Turns a non-2xx response into an error carrying the body as detail.
pub(crate) async fn ensure_success(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    if body.trim().is_empty() {
        bail!("{}", status);
    }
    bail!("{}", body.trim());
}

async fn operation(res: Response) -> Result<()> {
    let result: OperationResult = ensure_success(res).await?.json().await?;
    if !result.success {
        bail!("{}", result.message);
    }
    Ok(())
}
