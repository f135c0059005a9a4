//! Process configuration.
//!
//! [`ProxyConfig`] is built once at startup from the `run` arguments,
//! validated as a whole, and handed by reference to whatever needs it.
//! The service key the verifier authenticates with is loaded separately
//! from the file the config points at ([`ServiceKey::load`]).

pub mod key;
pub mod validation;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::cli::RunArgs;
use crate::error::ProxyError;

pub use key::{ClientCredential, ServiceKey};

pub const DEFAULT_PORT: u16 = 8089;

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Identity provider issuer, e.g. `https://acme.zitadel.cloud/`.
    pub issuer: Url,
    pub key_path: PathBuf,
    pub listen: SocketAddr,
    /// `None` means the outbound fetch may wait forever.
    pub upstream_timeout: Option<Duration>,
    /// `None` means the verifier call may wait forever.
    pub verifier_timeout: Option<Duration>,
}

impl ProxyConfig {
    pub fn from_args(args: &RunArgs) -> Result<Self, ProxyError> {
        let mut errors = Vec::new();

        let issuer = validation::issuer_url(&args.domain)
            .map_err(|e| errors.push(e))
            .ok();
        if let Err(e) = validation::validate_key_path(&args.key) {
            errors.push(e);
        }
        let listen = validation::listen_addr(&args.host, args.port)
            .map_err(|e| errors.push(e))
            .ok();
        for (field, value) in [
            ("upstream-timeout-ms", args.upstream_timeout),
            ("verifier-timeout-ms", args.verifier_timeout),
        ] {
            if let Err(e) = validation::validate_timeout(field, value) {
                errors.push(e);
            }
        }

        match (issuer, listen) {
            (Some(issuer), Some(listen)) if errors.is_empty() => Ok(Self {
                issuer,
                key_path: args.key.clone(),
                listen,
                upstream_timeout: args.upstream_timeout.map(Duration::from_millis),
                verifier_timeout: args.verifier_timeout.map(Duration::from_millis),
            }),
            _ => Err(ProxyError::ConfigValidation { errors }),
        }
    }
}
