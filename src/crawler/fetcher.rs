use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{redirect::Policy, Client, StatusCode};
use thiserror::Error;
use tracing::{debug, error, warn};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_STATUS_CODES: [u16; 7] = [403, 408, 429, 500, 502, 503, 504];
const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:134.0) Gecko/20100101 Firefox/134.0";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url} returned status {status}")]
    Status { url: String, status: StatusCode },
    #[error("{url} still failing with status {status} after {attempts} attempts")]
    RetriesExhausted {
        url: String,
        status: StatusCode,
        attempts: u32,
    },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub backoff_factor: f64,
    pub delay_range: (f64, f64),
    pub jitter_range: (f64, f64),
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            backoff_factor: 1.3,
            delay_range: (2.0, 7.0),
            jitter_range: (0.1, 1.0),
        }
    }
}

pub struct Fetcher {
    client: Client,
    settings: FetchSettings,
}

impl Fetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(default_headers())
            .timeout(settings.timeout)
            .redirect(Policy::limited(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client, settings })
    }

    /// Fetches one page. Transient failures are retried with exponential
    /// backoff, and every call ends with the politeness pause, so callers
    /// never add their own inter-request delay.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let result = self.fetch_with_retries(url).await;
        self.pause().await;
        result
    }

    async fn fetch_with_retries(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut attempt = 1u32;

        loop {
            debug!(%url, attempt, "Requesting page");

            let failure = match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return match response.bytes().await {
                            Ok(body) => Ok(body.to_vec()),
                            Err(e) => Err(FetchError::Transport {
                                url: url.to_string(),
                                source: e,
                            }),
                        };
                    }
                    if !RETRY_STATUS_CODES.contains(&status.as_u16()) {
                        error!(%url, %status, "Request failed with non-retryable status");
                        return Err(FetchError::Status {
                            url: url.to_string(),
                            status,
                        });
                    }
                    Failure::Status(status)
                }
                Err(e) => Failure::Transport(e),
            };

            if attempt >= MAX_ATTEMPTS {
                error!(%url, attempts = attempt, "Giving up after exhausting retries");
                return Err(match failure {
                    Failure::Status(status) => FetchError::RetriesExhausted {
                        url: url.to_string(),
                        status,
                        attempts: attempt,
                    },
                    Failure::Transport(source) => FetchError::Transport {
                        url: url.to_string(),
                        source,
                    },
                });
            }

            let backoff = self.settings.backoff_factor * f64::powi(2.0, attempt as i32 - 1);
            warn!(%url, attempt, backoff_secs = backoff, "Transient failure, backing off before retry");
            tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
            attempt += 1;
        }
    }

    /// Randomized inter-request delay. `fetch` applies it on every exit path;
    /// the orchestrator also calls it when it skips an already-known listing.
    pub async fn pause(&self) {
        let (lo, hi) = self.settings.delay_range;
        let (jitter_lo, jitter_hi) = self.settings.jitter_range;
        let delay = {
            let mut rng = rand::rng();
            rng.random_range(lo..hi) + rng.random_range(jitter_lo..jitter_hi)
        };
        debug!(delay_secs = delay, "Sleeping between requests");
        tokio::time::sleep(Duration::from_secs_f64(delay)).await;
    }
}

enum Failure {
    Status(StatusCode),
    Transport(reqwest::Error),
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-GB,en;q=0.5"));
    headers.insert("DNT", HeaderValue::from_static("1"));
    headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
    headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
    headers.insert("Sec-Fetch-Site", HeaderValue::from_static("cross-site"));
    headers
}
