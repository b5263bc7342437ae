use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::{fmt::Debug, time::Duration};
use tracing::{debug, warn};

use crate::error::{AlertError, Result};

pub type Params<'a> = [(&'a str, &'a str)];
pub type Headers<'a> = [(&'a str, &'a str)];

/// HTTP operations the trigger client needs. Implementations report non-2xx
/// responses as [`AlertError::Api`].
#[async_trait]
pub trait HttpTransport: Send + Sync + Debug {
    async fn get(
        &self,
        uri: &str,
        params: &Params<'_>,
        headers: &Headers<'_>,
    ) -> Result<(StatusCode, Vec<u8>)>;

    async fn get_json(
        &self,
        uri: &str,
        params: &Params<'_>,
        headers: &Headers<'_>,
    ) -> Result<(StatusCode, Value)>;

    async fn post(
        &self,
        uri: &str,
        params: &Params<'_>,
        body: &Value,
        headers: &Headers<'_>,
    ) -> Result<(StatusCode, Value)>;

    async fn put(
        &self,
        uri: &str,
        params: &Params<'_>,
        body: &Value,
        headers: &Headers<'_>,
    ) -> Result<(StatusCode, Option<Value>)>;

    async fn delete(
        &self,
        uri: &str,
        params: &Params<'_>,
        headers: &Headers<'_>,
    ) -> Result<(StatusCode, Option<Value>)>;
}

/// [`HttpTransport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self { http: builder.build()? })
    }

    async fn send(
        &self,
        req: RequestBuilder,
        headers: &Headers<'_>,
    ) -> Result<(StatusCode, Vec<u8>)> {
        let req = headers.iter().fold(req, |req, (k, v)| req.header(*k, *v));

        let res = req.send().await?;
        let status = res.status();
        let url = res.url().path().to_string();
        let body = res.bytes().await?;

        debug!(%status, path = %url, bytes = body.len(), "Alert API response");

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            warn!(%status, path = %url, "Alert API request failed");
            return Err(AlertError::Api {
                status,
                body: truncate_body(&text),
            });
        }

        Ok((status, body.to_vec()))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        uri: &str,
        params: &Params<'_>,
        headers: &Headers<'_>,
    ) -> Result<(StatusCode, Vec<u8>)> {
        self.send(self.http.get(uri).query(params), headers).await
    }

    async fn get_json(
        &self,
        uri: &str,
        params: &Params<'_>,
        headers: &Headers<'_>,
    ) -> Result<(StatusCode, Value)> {
        let (status, body) = self.get(uri, params, headers).await?;
        Ok((status, serde_json::from_slice(&body)?))
    }

    async fn post(
        &self,
        uri: &str,
        params: &Params<'_>,
        body: &Value,
        headers: &Headers<'_>,
    ) -> Result<(StatusCode, Value)> {
        let req = self.http.post(uri).query(params).json(body);
        let (status, body) = self.send(req, headers).await?;
        Ok((status, serde_json::from_slice(&body)?))
    }

    async fn put(
        &self,
        uri: &str,
        params: &Params<'_>,
        body: &Value,
        headers: &Headers<'_>,
    ) -> Result<(StatusCode, Option<Value>)> {
        let req = self.http.put(uri).query(params).json(body);
        let (status, body) = self.send(req, headers).await?;
        Ok((status, optional_json(&body)?))
    }

    async fn delete(
        &self,
        uri: &str,
        params: &Params<'_>,
        headers: &Headers<'_>,
    ) -> Result<(StatusCode, Option<Value>)> {
        let (status, body) = self.send(self.http.delete(uri).query(params), headers).await?;
        Ok((status, optional_json(&body)?))
    }
}

fn optional_json(body: &[u8]) -> Result<Option<Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(body)?))
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}
