//! Service key file consumed by the authorization verifier.
//!
//! Two shapes are accepted. The identity provider's JWT-profile export
//! (`type`, `keyId`, `key`, `clientId`) authenticates with a signed
//! client assertion; a `clientSecret` export authenticates with HTTP
//! Basic. When both are present the private key wins.

use std::path::Path;

use serde::Deserialize;

use crate::error::ProxyError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyFile {
    client_id: String,
    #[serde(default)]
    key_id: Option<String>,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
}

#[derive(Clone)]
pub enum ClientCredential {
    /// RSA private key (PEM) that signs `private_key_jwt` assertions.
    PrivateKey { key_id: String, pem: String },
    Secret(String),
}

/// Client identity the proxy presents to the identity provider.
#[derive(Clone)]
pub struct ServiceKey {
    pub client_id: String,
    pub credential: ClientCredential,
}

impl std::fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = f.debug_struct("ServiceKey");
        out.field("client_id", &self.client_id);
        match &self.credential {
            ClientCredential::PrivateKey { key_id, .. } => {
                out.field("key_id", key_id).field("key", &"<redacted>")
            }
            ClientCredential::Secret(_) => out.field("client_secret", &"<redacted>"),
        };
        out.finish()
    }
}

impl ServiceKey {
    #[must_use]
    pub fn with_secret(client_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            credential: ClientCredential::Secret(secret.into()),
        }
    }

    pub async fn load(path: &Path) -> Result<Self, ProxyError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProxyError::KeyFileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ProxyError::Io(e)
            }
        })?;
        let file: KeyFile =
            serde_json::from_str(&content).map_err(|source| ProxyError::KeyFileParse {
                path: path.to_path_buf(),
                source,
            })?;

        let credential = match file {
            KeyFile {
                key_id: Some(key_id),
                key: Some(pem),
                ..
            } => ClientCredential::PrivateKey { key_id, pem },
            KeyFile {
                client_secret: Some(secret),
                ..
            } => ClientCredential::Secret(secret),
            _ => {
                return Err(ProxyError::KeyFileIncomplete {
                    path: path.to_path_buf(),
                })
            }
        };
        Ok(Self {
            client_id: file.client_id,
            credential,
        })
    }
}
