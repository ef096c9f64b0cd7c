use crate::api::signing::{sign, QueryParams};
use crate::api::types::ServerTime;
use crate::config::BinanceSettings;
use crate::error::BotError;
use crate::Result;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

const SERVER_TIME_PATH: &str = "/fapi/v1/time";
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

type ExchangeRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Authenticated client for the futures REST API.
///
/// Every signed call carries `timestamp` (local clock plus server offset),
/// `recvWindow`, the caller's parameters in insertion order, and finally the
/// HMAC-SHA256 `signature` of everything before it.
///
/// The server-time offset is fetched once and memoized for the lifetime of
/// the client. Initialization goes through a `OnceCell`, so concurrent ticks
/// never observe a half-computed offset. It is never refreshed; restart the
/// process to resync after long-running clock drift.
///
/// There is no retry here. Callers decide whether a failure is fatal for
/// the current tick.
pub struct BinanceClient {
    client: Client,
    base_url: String,
    api_key: String,
    secret: String,
    recv_window: u64,
    time_offset: OnceCell<i64>,
    rate_limiter: Arc<ExchangeRateLimiter>,
}

impl BinanceClient {
    pub fn new(settings: &BinanceSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        let rpm = NonZeroU32::new(settings.requests_per_minute).ok_or_else(|| {
            BotError::InvalidInput("requests_per_minute must be positive".to_string())
        })?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            secret: settings.secret.clone(),
            recv_window: settings.recv_window,
            time_offset: OnceCell::new(),
            rate_limiter,
        })
    }

    /// Force the server-time offset to be computed now.
    ///
    /// Called at startup so the first tick does not pay for it; calling it
    /// again returns the memoized value.
    pub async fn sync_time(&self) -> Result<i64> {
        self.time_offset
            .get_or_try_init(|| async {
                let local_before = Utc::now().timestamp_millis();
                let body = self
                    .send_public(Method::GET, SERVER_TIME_PATH, &QueryParams::new())
                    .await?;
                let server: ServerTime = decode(SERVER_TIME_PATH, &body)?;
                let offset = server.server_time - local_before;
                tracing::info!(offset_ms = offset, "📡 Exchange server time offset computed");
                Ok::<i64, BotError>(offset)
            })
            .await
            .copied()
    }

    /// Current timestamp adjusted to exchange time.
    pub async fn timestamp(&self) -> Result<i64> {
        let offset = self.sync_time().await?;
        Ok(Utc::now().timestamp_millis() + offset)
    }

    pub async fn get(&self, path: &str, params: &QueryParams) -> Result<String> {
        self.send_signed(Method::GET, path, params).await
    }

    pub async fn post(&self, path: &str, params: &QueryParams) -> Result<String> {
        self.send_signed(Method::POST, path, params).await
    }

    pub async fn delete(&self, path: &str, params: &QueryParams) -> Result<String> {
        self.send_signed(Method::DELETE, path, params).await
    }

    /// Unsigned GET for public market-data endpoints.
    pub async fn get_public(&self, path: &str, params: &QueryParams) -> Result<String> {
        self.send_public(Method::GET, path, params).await
    }

    /// Signed GET decoded into a typed response.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &QueryParams,
    ) -> Result<T> {
        let body = self.get(path, params).await?;
        decode(path, &body)
    }

    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &QueryParams,
    ) -> Result<T> {
        let body = self.post(path, params).await?;
        decode(path, &body)
    }

    pub async fn get_public_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &QueryParams,
    ) -> Result<T> {
        let body = self.get_public(path, params).await?;
        decode(path, &body)
    }

    /// Build the signed query string: `timestamp`, `recvWindow`, caller params,
    /// then `signature` over all of the above.
    async fn signed_query(&self, params: &QueryParams) -> Result<String> {
        let mut all = QueryParams::new();
        all.push("timestamp", self.timestamp().await?.to_string())
            .push("recvWindow", self.recv_window.to_string());
        all.extend(params.iter());

        let query = all.to_query_string();
        let signature = sign(&query, &self.secret)?;
        Ok(format!("{}&signature={}", query, signature))
    }

    async fn send_signed(&self, method: Method, path: &str, params: &QueryParams) -> Result<String> {
        // Stamp only after any throttling wait so the timestamp stays inside recvWindow
        self.rate_limiter.until_ready().await;
        let query = self.signed_query(params).await?;
        let url = format!("{}{}?{}", self.base_url, path, query);
        self.execute(method, path, &url, true).await
    }

    async fn send_public(&self, method: Method, path: &str, params: &QueryParams) -> Result<String> {
        self.rate_limiter.until_ready().await;
        let url = if params.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, params.to_query_string())
        };
        self.execute(method, path, &url, false).await
    }

    async fn execute(&self, method: Method, path: &str, url: &str, signed: bool) -> Result<String> {
        let mut request = self.client.request(method.clone(), url);
        if signed {
            request = request.header(API_KEY_HEADER, &self.api_key);
        }

        tracing::debug!(method = %method, path, "Exchange request");
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::debug!(method = %method, path, status = status.as_u16(), %body, "Exchange error response");
            return Err(BotError::ExchangeApi {
                method: method.to_string(),
                path: path.to_string(),
                status_code: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

pub(crate) fn decode<T: DeserializeOwned>(path: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|source| BotError::Decode {
        path: path.to_string(),
        source,
    })
}
