use crate::{backoff::jittered_backoff, Error, Result};
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use reqwest::{Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Retry behavior for HTTP calls.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// POSTs are not idempotent in general (a broadcast may land twice), so they are only
    /// retried when this is set.
    pub retry_non_idempotent: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            retry_non_idempotent: false,
        }
    }
}

/// Statuses worth another attempt. A plain 500 is excluded: the chain REST gateway uses it
/// for contract query errors, which do not heal on retry.
pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Error body returned by the chain REST gateway.
#[derive(Deserialize)]
struct GatewayError {
    message: String,
}

#[derive(Deserialize)]
struct SmartQueryResponse<T> {
    data: T,
}

/// HTTP client for one base URL.
#[derive(Clone)]
pub struct Client {
    pub base_url: Url,
    pub(crate) http_client: reqwest::Client,
    pub(crate) retry_policy: RetryPolicy,
}

impl Client {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        match base_url.scheme() {
            "http" | "https" => {}
            scheme => return Err(Error::InvalidScheme(scheme.to_string())),
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url,
            http_client,
            retry_policy: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    async fn send_with_retry(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
        bearer: Option<&str>,
    ) -> Result<Response> {
        let retry = method == Method::GET || self.retry_policy.retry_non_idempotent;
        let max_attempts = if retry {
            self.retry_policy.max_attempts.max(1)
        } else {
            1
        };
        let mut backoff = self.retry_policy.initial_backoff;

        for attempt in 1..=max_attempts {
            let mut request = self.http_client.request(method.clone(), url.clone());
            if let Some(body) = body {
                request = request.json(body);
            }
            if let Some(token) = bearer {
                request = request.bearer_auth(token);
            }
            let last = attempt == max_attempts;
            match request.send().await {
                Ok(response) if last || !is_retryable_status(response.status()) => {
                    return Ok(response);
                }
                Ok(response) => {
                    debug!(%url, %method, attempt, status = %response.status(), "retrying");
                }
                Err(err) if last => return Err(err.into()),
                Err(err) => {
                    warn!(%url, %method, attempt, ?err, "request failed; retrying");
                }
            }
            let delay = jittered_backoff(&mut rand::thread_rng(), backoff);
            tokio::time::sleep(delay).await;
            backoff = backoff.saturating_mul(2).min(self.retry_policy.max_backoff);
        }
        Err(Error::UnexpectedResponse(format!("no attempts made for {url}")))
    }

    /// GET with retries. Returns the final response whatever its status.
    pub async fn get_with_retry(&self, url: Url) -> Result<Response> {
        self.send_with_retry(Method::GET, url, None, None).await
    }

    /// POST a JSON body. Retried only when the policy allows non-idempotent retries.
    pub async fn post_json_with_retry<B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &B,
        bearer: Option<&str>,
    ) -> Result<Response> {
        let body = serde_json::to_value(body)?;
        self.send_with_retry(Method::POST, url, Some(&body), bearer)
            .await
    }

    /// Turn a non-success response into [`Error::FailedWithBody`].
    pub async fn ensure_success(method: &str, url: &Url, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(Error::FailedWithBody {
            status,
            body: format!("{method} {url}: {text}"),
        })
    }

    /// Run a read-only query against `contract` through the chain REST gateway.
    pub async fn query_smart<Q, R>(&self, contract: &str, query: &Q) -> Result<R>
    where
        Q: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let encoded = URL_SAFE.encode(serde_json::to_vec(query)?);
        let url = self
            .base_url
            .join(&format!("cosmwasm/wasm/v1/contract/{contract}/smart/{encoded}"))?;
        let response = self.get_with_retry(url.clone()).await?;
        let status = response.status();
        if status.is_success() {
            let body: SmartQueryResponse<R> = response.json().await?;
            return Ok(body.data);
        }
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<GatewayError>(&text) {
            Ok(err) if !is_retryable_status(status) => Err(Error::ContractRejected(err.message)),
            _ => Err(Error::FailedWithBody {
                status,
                body: format!("GET {url}: {text}"),
            }),
        }
    }
}
