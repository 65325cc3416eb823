use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::crawler::extract::{self, ListingPage};
use crate::crawler::fetcher::Fetcher;
use crate::crawler::models::Apartment;
use crate::crawler::parser;
use crate::storage::gateway::Gateway;

pub const BASE_URL: &str = "https://www.kv.ee";
pub const DEFAULT_SEARCH_URL: &str = "https://www.kv.ee/en/search?deal_type=1";

/// Picks the crawl entry point: the supplied URL when it carries a scheme
/// and a host, the default apartment search otherwise.
pub fn resolve_start_url(supplied: Option<&str>) -> Url {
    supplied
        .and_then(|raw| Url::parse(raw.trim()).ok())
        .filter(|url| url.has_host())
        .unwrap_or_else(|| Url::parse(DEFAULT_SEARCH_URL).expect("default search URL is valid"))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub pages: u32,
    pub found: usize,
    pub new_records: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Drives the crawl: pagination, the dedup gate, the per-listing scrape
/// pipeline and the page-level batch flush.
pub struct Spider {
    fetcher: Fetcher,
    gateway: Gateway,
    base: Url,
    shutdown: Arc<AtomicBool>,
    pending: Vec<Apartment>,
}

impl Spider {
    pub fn new(fetcher: Fetcher, gateway: Gateway, base: Url, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            fetcher,
            gateway,
            base,
            shutdown,
            pending: Vec::new(),
        }
    }

    /// Runs the crawl to completion. Whatever ends the loop, last page,
    /// interrupt or a fatal listing-page failure, the pending batch is
    /// flushed before this returns and the connection goes away.
    pub async fn run(&mut self, start_url: Url) -> anyhow::Result<RunSummary> {
        let outcome = self.crawl(start_url).await;

        if !self.pending.is_empty() {
            warn!(pending = self.pending.len(), "Flushing records still pending at shutdown");
            let batch = std::mem::take(&mut self.pending);
            self.gateway.flush(&batch).await;
        }

        outcome
    }

    async fn crawl(&mut self, start_url: Url) -> anyhow::Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut current = start_url;
        let mut page = 1u32;

        loop {
            if self.interrupted() {
                info!(page, "Interrupt observed, stopping before the next page");
                break;
            }

            info!(page, url = %current, "Processing listing page");
            let listing = self.load_listing(&current, page).await?;
            summary.pages = page;
            summary.found += listing.apartment_urls.len();

            if listing.apartment_urls.is_empty() {
                warn!(page, "No apartment links found on page");
            } else {
                info!(page, count = listing.apartment_urls.len(), "Found apartment links");
                self.process_apartments(&listing.apartment_urls, &mut summary).await;
            }

            let batch = std::mem::take(&mut self.pending);
            self.gateway.flush(&batch).await;

            match listing.next_page {
                Some(ref next) => match self.base.join(next) {
                    Ok(next_url) => {
                        current = next_url;
                        page += 1;
                    }
                    Err(e) => {
                        error!(page, next = %next, error = %e, "Next-page link did not resolve, stopping");
                        break;
                    }
                },
                None => {
                    info!(page, "Reached last page");
                    break;
                }
            }
        }

        Ok(summary)
    }

    // A listing page that cannot be fetched or parsed ends the whole run:
    // without it the crawl has lost its place in the pagination.
    async fn load_listing(&self, url: &Url, page: u32) -> anyhow::Result<ListingPage> {
        let bytes = self
            .fetcher
            .fetch(url.as_str())
            .await
            .with_context(|| format!("listing page {page} could not be fetched"))?;
        let doc = parser::parse_document(&bytes)
            .with_context(|| format!("listing page {page} could not be parsed"))?;
        Ok(extract::extract_listing(&doc))
    }

    async fn process_apartments(&mut self, urls: &[String], summary: &mut RunSummary) {
        for raw in urls {
            if self.interrupted() {
                info!("Interrupt observed, leaving the rest of this page unvisited");
                break;
            }

            let url = match self.base.join(raw) {
                Ok(url) => url,
                Err(e) => {
                    warn!(link = %raw, error = %e, "Skipping unresolvable apartment link");
                    summary.failed += 1;
                    continue;
                }
            };

            if self.gateway.exists(url.as_str()).await {
                debug!(url = %url, "Already captured, skipping");
                summary.skipped += 1;
                self.fetcher.pause().await;
                continue;
            }

            match self.scrape_apartment(&url).await {
                Ok(apartment) => {
                    self.pending.push(apartment);
                    summary.new_records += 1;
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Apartment page failed");
                    summary.failed += 1;
                }
            }
        }
    }

    async fn scrape_apartment(&self, url: &Url) -> anyhow::Result<Apartment> {
        let bytes = self.fetcher.fetch(url.as_str()).await?;
        let doc = parser::parse_document(&bytes)?;
        Ok(extract::extract_apartment(&doc, url.as_str()))
    }

    fn interrupted(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_start_url_is_kept() {
        let url = resolve_start_url(Some("https://www.kv.ee/en/search?deal_type=2&rooms=3"));
        assert_eq!(url.as_str(), "https://www.kv.ee/en/search?deal_type=2&rooms=3");
    }

    #[test]
    fn missing_start_url_falls_back_to_default() {
        assert_eq!(resolve_start_url(None).as_str(), DEFAULT_SEARCH_URL);
    }

    #[test]
    fn malformed_start_url_falls_back_to_default() {
        assert_eq!(resolve_start_url(Some("not a url")).as_str(), DEFAULT_SEARCH_URL);
        assert_eq!(resolve_start_url(Some("/en/search")).as_str(), DEFAULT_SEARCH_URL);
        assert_eq!(resolve_start_url(Some("mailto:someone@kv.ee")).as_str(), DEFAULT_SEARCH_URL);
    }
}
