//! HTTP plumbing shared by the remote and peer sources.

use std::time::{Duration, Instant};

use firewatch_core::{QueryParams, SourceError};
use reqwest::Client;
use thiserror::Error;
use url::Url;

/// Failure talking to an HTTP upstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    /// The configured base URL could not be used.
    #[error("invalid endpoint {url}: {message}")]
    InvalidUrl {
        /// Offending URL text.
        url: String,
        /// Why it was rejected.
        message: String,
    },
    /// The request did not complete in time.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout {
        /// Request URL.
        url: String,
        /// Timeout that elapsed, in whole seconds.
        timeout_secs: u64,
    },
    /// The upstream answered with a non-success status.
    #[error("request to {url} failed with HTTP {status}: {message}")]
    Status {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Status description.
        message: String,
    },
    /// The connection failed before a response arrived.
    #[error("network error contacting {url}: {message}")]
    Network {
        /// Request URL.
        url: String,
        /// Transport error description.
        message: String,
    },
    /// The response body could not be read.
    #[error("failed to read response from {url}: {message}")]
    Body {
        /// Request URL.
        url: String,
        /// Read error description.
        message: String,
    },
}

impl From<HttpError> for SourceError {
    fn from(error: HttpError) -> Self {
        match error {
            HttpError::Timeout { .. } | HttpError::Network { .. } => {
                Self::warning(error.to_string())
            }
            HttpError::InvalidUrl { .. } | HttpError::Status { .. } | HttpError::Body { .. } => {
                Self::error(error.to_string())
            }
        }
    }
}

/// Build a client with the given timeout and user agent.
pub(crate) fn build_client(timeout: Duration, user_agent: &str) -> Result<Client, HttpError> {
    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .map_err(|err| HttpError::Network {
            url: String::new(),
            message: format!("failed to build HTTP client: {err}"),
        })
}

/// `{base}/{segment}` with any trailing slash on `base` collapsed.
pub(crate) fn endpoint_url(base: &str, segment: &str) -> Result<Url, HttpError> {
    let invalid = |message: String| HttpError::InvalidUrl {
        url: base.to_owned(),
        message,
    };
    let mut url = Url::parse(base).map_err(|err| invalid(err.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| invalid("URL cannot be a base".to_owned()))?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}

/// `{base}/events` carrying the bbox and time range as query parameters.
pub(crate) fn events_url(base: &str, params: &QueryParams) -> Result<Url, HttpError> {
    let mut url = endpoint_url(base, "events")?;
    {
        let mut query = url.query_pairs_mut();
        if let Some(bbox) = params.bbox {
            query.append_pair("bbox", &bbox.to_string());
        }
        if let Some(range) = params.time_range {
            query.append_pair("from", &range.start.to_rfc3339());
            query.append_pair("to", &range.end.to_rfc3339());
        }
    }
    if url.query() == Some("") {
        url.set_query(None);
    }
    Ok(url)
}

/// Map a `reqwest` failure into an [`HttpError`].
pub(crate) fn classify(error: &reqwest::Error, url: &Url, timeout: Duration) -> HttpError {
    if error.is_timeout() {
        return HttpError::Timeout {
            url: url.to_string(),
            timeout_secs: timeout.as_secs(),
        };
    }
    if let Some(status) = error.status() {
        return HttpError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            message: error.to_string(),
        };
    }
    HttpError::Network {
        url: url.to_string(),
        message: error.to_string(),
    }
}

/// GET `url` and return the body text on a 2xx status.
pub(crate) async fn get_text(client: &Client, url: Url, timeout: Duration) -> Result<String, HttpError> {
    let response = client
        .get(url.clone())
        .timeout(timeout)
        .send()
        .await
        .map_err(|err| classify(&err, &url, timeout))?
        .error_for_status()
        .map_err(|err| classify(&err, &url, timeout))?;
    response.text().await.map_err(|err| HttpError::Body {
        url: url.to_string(),
        message: err.to_string(),
    })
}

/// GET `url` and report the round-trip time on a 2xx status.
pub(crate) async fn probe(client: &Client, url: Url, timeout: Duration) -> Result<Duration, HttpError> {
    let started = Instant::now();
    client
        .get(url.clone())
        .timeout(timeout)
        .send()
        .await
        .map_err(|err| classify(&err, &url, timeout))?
        .error_for_status()
        .map_err(|err| classify(&err, &url, timeout))?;
    Ok(started.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use firewatch_core::{BoundingBox, Severity, TimeRange};
    use rstest::rstest;

    #[rstest]
    #[case("http://example.test")]
    #[case("http://example.test/")]
    fn events_url_appends_segment(#[case] base: &str) {
        let url = events_url(base, &QueryParams::default()).expect("valid url");
        assert_eq!(url.as_str(), "http://example.test/events");
    }

    #[rstest]
    fn events_url_carries_scope() {
        let start = Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).single().expect("start");
        let end = Utc.with_ymd_and_hms(2024, 8, 2, 0, 0, 0).single().expect("end");
        let params = QueryParams::default()
            .with_bbox(BoundingBox::new(90.0, 15.0, 100.0, 20.0).expect("bbox"))
            .with_time_range(TimeRange::new(start, end));
        let url = events_url("http://example.test/api", &params).expect("valid url");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(url.path(), "/api/events");
        assert_eq!(
            pairs,
            vec![
                ("bbox".to_owned(), "90,15,100,20".to_owned()),
                ("from".to_owned(), start.to_rfc3339()),
                ("to".to_owned(), end.to_rfc3339()),
            ]
        );
    }

    #[rstest]
    fn invalid_base_is_rejected() {
        let err = endpoint_url("not a url", "health").expect_err("should fail");
        assert!(matches!(err, HttpError::InvalidUrl { .. }));
    }

    #[rstest]
    #[case(HttpError::Timeout { url: "u".into(), timeout_secs: 2 }, Severity::Warning)]
    #[case(HttpError::Network { url: "u".into(), message: "refused".into() }, Severity::Warning)]
    #[case(HttpError::Status { url: "u".into(), status: 503, message: "busy".into() }, Severity::Error)]
    fn failures_map_to_severity(#[case] error: HttpError, #[case] severity: Severity) {
        let source_error = SourceError::from(error);
        assert_eq!(source_error.severity, severity);
        assert!(source_error.recoverable);
    }
}
