use std::str::FromStr;

use rand::seq::IndexedRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, COOKIE, LOCATION, USER_AGENT};
use reqwest::{Method, Url};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::runner::{Options, ScanError};
use crate::utils::ParseError;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:95.0) Gecko/20100101 Firefox/95.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1",
];

pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("error on requesting {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid url {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("request cancelled")]
    Cancelled,
}

impl ProbeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeError::Transport { source, .. } if source.is_timeout())
    }
}

/// Raw observation of a single request. Redirects are not followed, so this
/// always describes the first response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub url: Url,
    pub status: u16,
    pub length: u64,
    pub location: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RequestSettings {
    pub method: Method,
    pub basic_auth: Option<(String, Option<String>)>,
    pub retry_attempts: usize,
}

impl RequestSettings {
    pub fn from_options(options: &Options) -> Self {
        Self {
            method: options.method.clone(),
            basic_auth: options
                .username
                .as_ref()
                .map(|user| (user.clone(), options.password.clone())),
            retry_attempts: options.retry_attempts,
        }
    }
}

fn header_error(raw: &str) -> ScanError {
    ScanError::Parse(ParseError::InvalidHeader {
        value: raw.to_string(),
    })
}

/// Headers attached verbatim to every request of the run.
pub fn default_headers(options: &Options) -> Result<HeaderMap, ScanError> {
    let mut headers = HeaderMap::new();
    let agent =
        HeaderValue::from_str(&options.user_agent).map_err(|_| header_error(&options.user_agent))?;
    headers.insert(USER_AGENT, agent);
    for (key, value) in options.headers.iter() {
        let raw = format!("{key}: {value}");
        let name = HeaderName::from_str(key.trim()).map_err(|_| header_error(&raw))?;
        let value = HeaderValue::from_str(value.trim()).map_err(|_| header_error(&raw))?;
        headers.append(name, value);
    }
    if let Some(cookies) = options.cookies.as_deref().filter(|c| !c.trim().is_empty()) {
        let value = HeaderValue::from_str(cookies.trim()).map_err(|_| header_error(cookies))?;
        headers.insert(COOKIE, value);
    }
    Ok(headers)
}

/// Builds the connection pool shared by every worker of a run.
pub fn build_client(options: &Options) -> Result<reqwest::Client, ScanError> {
    let mut builder = reqwest::Client::builder()
        .default_headers(default_headers(options)?)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(options.timeout)
        .danger_accept_invalid_hostnames(options.no_tls_validation)
        .danger_accept_invalid_certs(options.no_tls_validation);

    match options.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(proxy) => {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| ScanError::ProxySetup {
                proxy: proxy.to_string(),
                source: e,
            })?;
            builder = builder.proxy(proxy);
        }
        // only an explicit --proxy routes traffic through a proxy
        None => builder = builder.no_proxy(),
    }

    builder
        .build()
        .map_err(|e| ScanError::HttpClientBuild { source: e })
}

/// Joins `entity` below `base`, percent-encoding each path segment.
pub fn candidate_url(base: &Url, entity: &str) -> Result<Url, ProbeError> {
    let invalid = |message: &str| ProbeError::InvalidUrl {
        url: format!("{base}{entity}"),
        message: message.to_string(),
    };
    if entity.chars().any(char::is_control) {
        return Err(invalid("invalid control character in URL"));
    }
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| invalid("target cannot be used as a base URL"))?;
        segments.pop_if_empty();
        segments.extend(entity.trim_start_matches('/').split('/'));
    }
    Ok(url)
}

fn transport_error(url: &Url, source: reqwest::Error) -> ProbeError {
    ProbeError::Transport {
        url: url.to_string(),
        source,
    }
}

/// Issues the request, retrying timeouts up to `retry_attempts` times.
/// Cancellation aborts the in-flight request.
pub async fn fetch_outcome(
    client: &reqwest::Client,
    settings: &RequestSettings,
    url: &Url,
    cancel: &CancellationToken,
) -> Result<ProbeOutcome, ProbeError> {
    let attempts = settings.retry_attempts.saturating_add(1);
    let mut attempt = 1;
    loop {
        match fetch_once(client, settings, url, cancel).await {
            Err(e) if e.is_timeout() && attempt < attempts => {
                debug!(%url, attempt, "request timed out, retrying");
                attempt += 1;
            }
            other => return other,
        }
    }
}

async fn fetch_once(
    client: &reqwest::Client,
    settings: &RequestSettings,
    url: &Url,
    cancel: &CancellationToken,
) -> Result<ProbeOutcome, ProbeError> {
    let mut builder = client.request(settings.method.clone(), url.clone());
    if let Some((user, password)) = settings.basic_auth.as_ref() {
        builder = builder.basic_auth(user, password.as_ref());
    }

    let exchange = async {
        let resp = builder.send().await.map_err(|e| transport_error(url, e))?;
        let status = resp.status().as_u16();
        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let length = if settings.method == Method::HEAD {
            resp.headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(0)
        } else {
            resp.bytes().await.map_err(|e| transport_error(url, e))?.len() as u64
        };
        debug!(%url, status, length, "probe");
        Ok(ProbeOutcome {
            url: url.clone(),
            status,
            length,
            location,
        })
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(ProbeError::Cancelled),
        outcome = exchange => outcome,
    }
}
