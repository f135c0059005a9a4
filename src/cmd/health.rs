//! `reddit-forward-proxy health`: check the health of a running instance.
//!
//! Sends a `GET /api/healthz` request to the specified URL and reports
//! whether the instance answered `"OK"`.

use http_body_util::BodyExt;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::cli::HealthArgs;
use crate::error::ProxyError;
use crate::health::HEALTHY;
use crate::server::HEALTH_PATH;

pub async fn execute(args: HealthArgs) -> Result<(), ProxyError> {
    let url = format!("{}{HEALTH_PATH}", args.url.trim_end_matches('/'));
    let uri: hyper::Uri =
        url.parse().map_err(
            |e: hyper::http::uri::InvalidUri| ProxyError::UriParse {
                source: Box::new(e),
            },
        )?;

    let connector = hyper_util::client::legacy::connect::HttpConnector::new();
    let client = Client::builder(TokioExecutor::new()).build(connector);

    let req = hyper::Request::builder()
        .uri(uri)
        .body(http_body_util::Full::new(bytes::Bytes::new()))
        .map_err(|e| ProxyError::HttpRequest {
            source: Box::new(e),
        })?;

    let response = tokio::time::timeout(std::time::Duration::from_secs(10), client.request(req))
        .await
        .map_err(|_| ProxyError::HttpRequest {
            source: "health check timed out after 10s".into(),
        })?
        .map_err(|e| ProxyError::HttpRequest {
            source: Box::new(e),
        })?;

    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| ProxyError::HttpRequest {
            source: Box::new(e),
        })?
        .to_bytes();

    if !status.is_success() {
        return Err(ProxyError::HealthCheckFailed(status));
    }

    let body_str = String::from_utf8_lossy(&body);
    if args.json {
        println!("{body_str}");
        return Ok(());
    }

    check_body(&body_str)?;
    println!("\u{2713} reddit-forward-proxy is healthy ({})", args.url);
    Ok(())
}

fn check_body(body: &str) -> Result<(), ProxyError> {
    match serde_json::from_str::<String>(body) {
        Ok(status) if status == HEALTHY => Ok(()),
        _ => Err(ProxyError::HealthCheckBody(body.to_string())),
    }
}
