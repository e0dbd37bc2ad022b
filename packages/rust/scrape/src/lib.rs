//! Article fetching and HTML scraping.
//!
//! This crate provides:
//! - [`ArticleFetcher`]: HTTP fetch with an SSRF guard
//! - [`extract`] helpers: visible text, Markdown, and title extraction

pub mod extract;

use std::net::IpAddr;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use debrief_shared::{ArticleFormat, DebriefError, Result, ScrapeConfig};

pub use extract::{extract_markdown, extract_text, extract_title, truncate_chars};

/// User-Agent string for article requests.
const USER_AGENT: &str = concat!("Debrief/", env!("CARGO_PKG_VERSION"));

/// Maximum redirects followed per article.
const MAX_REDIRECTS: usize = 5;

/// A scraped article.
#[derive(Debug, Clone)]
pub struct Article {
    /// Final URL requested.
    pub url: String,
    /// HTTP status code from fetch.
    pub status_code: u16,
    /// Extracted title, if any.
    pub title: Option<String>,
    /// Article content in the configured format.
    pub text: String,
}

/// Fetches article pages and extracts their content.
pub struct ArticleFetcher {
    client: Client,
    format: ArticleFormat,
    allow_private_hosts: bool,
}

impl ArticleFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: &ScrapeConfig) -> Result<Self> {
        let client = client_builder(config)
            .build()
            .map_err(|e| DebriefError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            format: config.format,
            allow_private_hosts: config.allow_private_hosts,
        })
    }

    /// Fetch a page and extract its article content.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<Article> {
        let parsed =
            Url::parse(url).map_err(|e| DebriefError::validation(format!("invalid URL {url}: {e}")))?;

        if !self.allow_private_hosts && is_ssrf_target(&parsed) {
            return Err(DebriefError::validation(format!(
                "refusing to fetch {url}: non-public target"
            )));
        }

        let response = self
            .client
            .get(parsed.as_str())
            .send()
            .await
            .map_err(|e| {
                if e.is_redirect() {
                    DebriefError::validation(format!("refusing redirect from {url}: {e}"))
                } else {
                    DebriefError::Network(format!("{url}: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DebriefError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DebriefError::Network(format!("{url}: body read failed: {e}")))?;

        let text = match self.format {
            ArticleFormat::Text => extract_text(&body),
            ArticleFormat::Markdown => extract_markdown(&body)?,
        };

        debug!(bytes = body.len(), chars = text.len(), "article scraped");

        Ok(Article {
            url: parsed.to_string(),
            status_code: status.as_u16(),
            title: extract_title(&body),
            text,
        })
    }
}

/// HTTP client settings shared by every fetch.
fn client_builder(config: &ScrapeConfig) -> reqwest::ClientBuilder {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(redirect_policy(config.allow_private_hosts))
        .timeout(Duration::from_secs(config.timeout_secs))
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Follow at most [`MAX_REDIRECTS`] hops, re-checking every target.
fn redirect_policy(allow_private_hosts: bool) -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error(format!("more than {MAX_REDIRECTS} redirects"))
        } else if !allow_private_hosts && is_ssrf_target(attempt.url()) {
            let target = attempt.url().to_string();
            attempt.error(format!("redirect to non-public target {target}"))
        } else {
            attempt.follow()
        }
    })
}

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    // Block non-HTTP schemes
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_multicast()
                // fc00::/7 (unique local)
                || (first & 0xfe00) == 0xfc00
                // fe80::/10 (link local)
                || (first & 0xffc0) == 0xfe80
        }
    }
}
