//! Outbound request construction and execution.
//!
//! The upstream sees a bare `GET` carrying only the proxy's own
//! `User-Agent`; none of the caller's headers (least of all its
//! `Authorization`) are forwarded. Redirects are followed, up to
//! [`MAX_REDIRECTS`] hops, and every hop is the same bare `GET`.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{LOCATION, USER_AGENT};
use hyper::{Method, Request, Response, StatusCode};
use url::Url;

use super::ForwardError;
use crate::error::display_chain;
use crate::server::HttpClient;

pub const PROXY_USER_AGENT: &str = "reddit-forward-proxy/0.1";

pub const MAX_REDIRECTS: usize = 10;

/// Parse the caller-supplied target into an absolute URL.
pub fn parse_target(target: &str) -> Result<Url, ForwardError> {
    Url::parse(target).map_err(|e| ForwardError::InvalidTarget(format!("parse \"{target}\": {e}")))
}

/// Build the outbound `GET` for one hop.
pub fn build_request(url: &Url) -> Result<Request<Full<Bytes>>, ForwardError> {
    Request::builder()
        .method(Method::GET)
        .uri(url.as_str())
        .header(USER_AGENT, PROXY_USER_AGENT)
        .body(Full::new(Bytes::new()))
        .map_err(|e| ForwardError::InvalidTarget(format!("parse \"{url}\": {e}")))
}

/// Fetch `target`, following redirects. Only transport failures and
/// redirect loops are errors; any other HTTP status the final upstream
/// answers with counts as success. `timeout` bounds the whole chain up to
/// the final response head.
pub async fn fetch(
    client: &HttpClient,
    target: Url,
    timeout: Option<Duration>,
) -> Result<Response<Incoming>, ForwardError> {
    let chain = follow_redirects(client, target);
    match timeout {
        Some(limit) => tokio::time::timeout(limit, chain)
            .await
            .map_err(|_| ForwardError::Timeout(limit))?,
        None => chain.await,
    }
}

async fn follow_redirects(
    client: &HttpClient,
    mut url: Url,
) -> Result<Response<Incoming>, ForwardError> {
    for _ in 0..=MAX_REDIRECTS {
        let response = client
            .request(build_request(&url)?)
            .await
            .map_err(|e| ForwardError::Transport(display_chain(&e)))?;
        let Some(next) = redirect_target(&url, &response)? else {
            return Ok(response);
        };
        tracing::debug!(from = %url, to = %next, status = %response.status(), "following redirect");
        url = next;
    }
    Err(ForwardError::Transport(format!(
        "stopped after {MAX_REDIRECTS} redirects"
    )))
}

/// Where a redirect response points, resolved against the URL that
/// produced it. A redirect status without `Location` is a final response.
fn redirect_target<B>(current: &Url, response: &Response<B>) -> Result<Option<Url>, ForwardError> {
    if !matches!(
        response.status(),
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    ) {
        return Ok(None);
    }
    let Some(location) = response.headers().get(LOCATION) else {
        return Ok(None);
    };
    let location = location
        .to_str()
        .map_err(|e| ForwardError::Transport(format!("invalid Location header: {e}")))?;
    current
        .join(location)
        .map(Some)
        .map_err(|e| ForwardError::Transport(format!("invalid Location header {location:?}: {e}")))
}
