//! Retrying HTTP session shared by the store, Web API and community clients.
//!
//! Only GET is issued. Transient statuses (429, 500, 502, 503, 504), connect
//! errors and timeouts are retried up to `total` times. The first retry is
//! immediate, later ones sleep `backoff_factor * 2^(n-1)` seconds (capped at
//! two minutes). A `Retry-After` header on 429/503 takes precedence.

use crate::config::Settings;
use crate::utils::error::{BotError, Result};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const DEFAULT_STATUS_FORCELIST: [u16; 5] = [429, 500, 502, 503, 504];

pub const USER_AGENT: &str = concat!("steam-idle-bot/", env!("CARGO_PKG_VERSION"));

const BACKOFF_MAX: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub total: u32,
    pub backoff_factor: f64,
    pub status_forcelist: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            total: 3,
            backoff_factor: 0.5,
            status_forcelist: DEFAULT_STATUS_FORCELIST.to_vec(),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            total: settings.retry_total,
            backoff_factor: settings.retry_backoff_factor,
            ..Self::default()
        }
    }

    /// Sleep before the `retry`-th retry (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry <= 1 {
            return Duration::ZERO;
        }
        let secs = self.backoff_factor * 2f64.powi(retry as i32 - 1);
        Duration::try_from_secs_f64(secs.max(0.0))
            .map_or(BACKOFF_MAX, |delay| delay.min(BACKOFF_MAX))
    }

    fn is_retryable_status(&self, status: StatusCode) -> bool {
        self.status_forcelist.contains(&status.as_u16())
    }
}

#[derive(Debug, Clone)]
pub struct HttpSession {
    client: Client,
    policy: RetryPolicy,
}

impl HttpSession {
    pub fn new(timeout: Duration, policy: RetryPolicy) -> Result<Self> {
        Self::with_user_agent(timeout, policy, USER_AGENT)
    }

    pub fn with_user_agent(timeout: Duration, policy: RetryPolicy, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, policy })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.api_timeout(), RetryPolicy::from_settings(settings))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Response> {
        let total = self.policy.total;

        for attempt in 0..=total {
            let retry = attempt + 1;
            match self.client.get(url).query(query).send().await {
                Ok(response) if self.policy.is_retryable_status(response.status()) => {
                    let status = response.status();
                    let retry_after = retry_after(&response);
                    if attempt < total {
                        let delay = retry_after.unwrap_or_else(|| self.policy.backoff(retry));
                        tracing::debug!(
                            "HTTP {} from {}, retry {}/{} in {:?}",
                            status.as_u16(),
                            url,
                            retry,
                            total,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        return Err(BotError::RateLimitError { retry_after });
                    }
                    return Err(BotError::MaxRetriesExceeded {
                        url: url.to_string(),
                        attempts: retry as usize,
                        status: status.as_u16(),
                    });
                }
                Ok(response) => {
                    return response.error_for_status().map_err(BotError::from);
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < total => {
                    let delay = self.policy.backoff(retry);
                    tracing::debug!(
                        "Request to {} failed ({}), retry {}/{} in {:?}",
                        url,
                        e,
                        retry,
                        total,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_timeout() => {
                    return Err(BotError::ApiTimeout {
                        message: format!("{} timed out after {} attempts", url, retry),
                    });
                }
                Err(e) => return Err(BotError::from(e)),
            }
        }

        Err(BotError::MaxRetriesExceeded {
            url: url.to_string(),
            attempts: total as usize + 1,
            status: 0,
        })
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self.get(url, query).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let response = self.get(url, query).await?;
        Ok(response.text().await?)
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    if !matches!(
        response.status(),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
    ) {
        return None;
    }
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
