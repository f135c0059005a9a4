//! OAuth2 token introspection (RFC 7662) against the identity provider.
//!
//! At startup [`IntrospectionVerifier::discover`] reads the issuer's
//! OpenID discovery document to find the introspection endpoint. Each
//! [`verify`](AuthorizationVerifier::verify) call then POSTs the caller's
//! token to that endpoint and reads the subject and project roles from the
//! reply. Nothing is cached between calls.
//!
//! The proxy authenticates itself with the service key: a JWT-profile key
//! signs a fresh `private_key_jwt` client assertion (RFC 7523) per call, a
//! client secret is sent as HTTP Basic credentials.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use http::uri::InvalidUri;
use http::HeaderValue;
use http_body_util::{BodyExt, Full};
use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Uri};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;
use url::Url;

use super::{AuthError, AuthorizationVerifier, Principal};
use crate::config::{ClientCredential, ServiceKey};
use crate::error::ProxyError;
use crate::server::HttpClient;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Claim holding the caller's roles on the project, keyed by role name.
pub const ROLES_CLAIM: &str = "urn:zitadel:iam:org:project:roles";

pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

const PROJECT_CLAIM_PREFIX: &str = "urn:zitadel:iam:org:project:";
const DISCOVERY_PATH: &str = ".well-known/openid-configuration";
const DEFAULT_INTROSPECTION_PATH: &str = "oauth/v2/introspect";
const ASSERTION_LIFETIME_SECS: u64 = 300;

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    #[serde(default)]
    introspection_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    #[serde(default)]
    sub: Option<String>,
    #[serde(flatten)]
    claims: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

/// Signs `private_key_jwt` client assertions for one client.
struct ClientAssertion {
    client_id: String,
    audience: String,
    header: Header,
    key: EncodingKey,
}

impl ClientAssertion {
    fn new(client_id: &str, key_id: &str, pem: &str, issuer: &Url) -> Result<Self, BoxError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key_id.to_string());
        Ok(Self {
            client_id: client_id.to_string(),
            audience: issuer.as_str().trim_end_matches('/').to_string(),
            header,
            key: EncodingKey::from_rsa_pem(pem.as_bytes())?,
        })
    }

    fn sign(&self) -> Result<String, jsonwebtoken::errors::Error> {
        let now = jsonwebtoken::get_current_timestamp();
        let claims = AssertionClaims {
            iss: &self.client_id,
            sub: &self.client_id,
            aud: &self.audience,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&self.header, &claims, &self.key)
    }
}

enum ClientAuth {
    Basic(HeaderValue),
    Assertion(ClientAssertion),
}

impl ClientAuth {
    fn from_key(key: &ServiceKey, issuer: &Url) -> Result<Self, BoxError> {
        match &key.credential {
            ClientCredential::PrivateKey { key_id, pem } => Ok(Self::Assertion(
                ClientAssertion::new(&key.client_id, key_id, pem, issuer)?,
            )),
            ClientCredential::Secret(secret) => Ok(Self::Basic(HeaderValue::from_str(
                &basic_credentials(&key.client_id, secret),
            )?)),
        }
    }
}

pub struct IntrospectionVerifier {
    client: HttpClient,
    endpoint: Uri,
    client_auth: ClientAuth,
}

impl std::fmt::Debug for IntrospectionVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let auth = match self.client_auth {
            ClientAuth::Basic(_) => "client_secret_basic",
            ClientAuth::Assertion(_) => "private_key_jwt",
        };
        f.debug_struct("IntrospectionVerifier")
            .field("endpoint", &self.endpoint)
            .field("client_auth", &auth)
            .finish_non_exhaustive()
    }
}

impl IntrospectionVerifier {
    /// `issuer` is the audience of signed client assertions.
    pub fn new(
        client: HttpClient,
        issuer: &Url,
        endpoint: &str,
        key: &ServiceKey,
    ) -> Result<Self, ProxyError> {
        let endpoint: Uri = endpoint.parse().map_err(
            |e: InvalidUri| ProxyError::VerifierInit {
                source: Box::new(e),
            },
        )?;
        let client_auth =
            ClientAuth::from_key(key, issuer).map_err(|source| ProxyError::VerifierInit { source })?;
        Ok(Self {
            client,
            endpoint,
            client_auth,
        })
    }

    /// Locate the introspection endpoint through the issuer's discovery
    /// document. Falls back to the conventional path when the document
    /// does not advertise one. With a `timeout`, an identity provider that
    /// does not answer in time fails initialization.
    pub async fn discover(
        client: HttpClient,
        issuer: &Url,
        key: &ServiceKey,
        timeout: Option<Duration>,
    ) -> Result<Self, ProxyError> {
        let init_err = |source: BoxError| ProxyError::VerifierInit { source };

        let discovery_url = join(issuer, DISCOVERY_PATH).map_err(|e| init_err(Box::new(e)))?;
        let fetch = fetch_discovery(&client, &discovery_url);
        let document = match timeout {
            Some(limit) => tokio::time::timeout(limit, fetch).await.map_err(|_| {
                init_err(
                    format!(
                        "discovery document at {discovery_url} not received within {}ms",
                        limit.as_millis()
                    )
                    .into(),
                )
            })?,
            None => fetch.await,
        }
        .map_err(init_err)?;

        let endpoint = match document.introspection_endpoint {
            Some(endpoint) => endpoint,
            None => join(issuer, DEFAULT_INTROSPECTION_PATH)
                .map_err(|e| init_err(Box::new(e)))?
                .to_string(),
        };

        tracing::info!(endpoint = %endpoint, "token introspection endpoint resolved");
        Self::new(client, issuer, &endpoint, key)
    }

    #[must_use]
    pub const fn endpoint(&self) -> &Uri {
        &self.endpoint
    }
}

async fn fetch_discovery(client: &HttpClient, url: &Url) -> Result<DiscoveryDocument, BoxError> {
    let request = hyper::Request::builder()
        .uri(url.as_str())
        .header(ACCEPT, "application/json")
        .body(Full::new(Bytes::new()))?;

    let response = client.request(request).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("discovery document at {url} returned {status}").into());
    }
    let body = response.into_body().collect().await?.to_bytes();
    Ok(serde_json::from_slice(&body)?)
}

#[async_trait]
impl AuthorizationVerifier for IntrospectionVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let unavailable = |source: BoxError| AuthError::Unavailable { source };

        let request = {
            let mut form = form_urlencoded::Serializer::new(String::new());
            form.append_pair("token", token)
                .append_pair("token_type_hint", "access_token");

            let mut request = hyper::Request::builder()
                .method(Method::POST)
                .uri(self.endpoint.clone())
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(ACCEPT, "application/json");
            match &self.client_auth {
                ClientAuth::Basic(credentials) => {
                    request = request.header(AUTHORIZATION, credentials.clone());
                }
                ClientAuth::Assertion(assertion) => {
                    let signed = assertion.sign().map_err(|e| unavailable(Box::new(e)))?;
                    form.append_pair("client_assertion_type", CLIENT_ASSERTION_TYPE)
                        .append_pair("client_assertion", &signed);
                }
            }
            let form_body = form.finish();
            request
                .body(Full::new(Bytes::from(form_body)))
                .map_err(|e| unavailable(Box::new(e)))?
        };

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| unavailable(Box::new(e)))?;
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| unavailable(Box::new(e)))?
            .to_bytes();

        if !status.is_success() {
            return Err(unavailable(
                format!("introspection endpoint returned {status}").into(),
            ));
        }

        let introspection: IntrospectionResponse =
            serde_json::from_slice(&body).map_err(|e| unavailable(Box::new(e)))?;
        principal_from(introspection)
    }
}

fn principal_from(introspection: IntrospectionResponse) -> Result<Principal, AuthError> {
    if !introspection.active {
        return Err(AuthError::InvalidCredential("token is not active".into()));
    }
    let subject = introspection
        .sub
        .ok_or_else(|| AuthError::InvalidCredential("token has no subject".into()))?;
    Ok(Principal {
        subject,
        roles: roles_from_claims(&introspection.claims),
    })
}

/// Collect role names from the project role claims.
///
/// Roles appear under [`ROLES_CLAIM`] and, for tokens scoped to a specific
/// project, under `urn:zitadel:iam:org:project:<id>:roles`. Both map role
/// names to the organisations granting them.
fn roles_from_claims(claims: &HashMap<String, serde_json::Value>) -> BTreeSet<String> {
    claims
        .iter()
        .filter(|(name, _)| {
            name.as_str() == ROLES_CLAIM
                || name
                    .strip_prefix(PROJECT_CLAIM_PREFIX)
                    .is_some_and(|rest| rest.ends_with(":roles"))
        })
        .filter_map(|(_, value)| value.as_object())
        .flat_map(|roles| roles.keys().cloned())
        .collect()
}

/// RFC 6749 §2.3.1 client credentials: each part form-encoded, then base64.
fn basic_credentials(client_id: &str, client_secret: &str) -> String {
    let id: String = form_urlencoded::byte_serialize(client_id.as_bytes()).collect();
    let secret: String = form_urlencoded::byte_serialize(client_secret.as_bytes()).collect();
    format!("Basic {}", STANDARD.encode(format!("{id}:{secret}")))
}

fn join(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    if base.path().ends_with('/') {
        base.join(path)
    } else {
        let mut base = base.clone();
        base.set_path(&format!("{}/", base.path()));
        base.join(path)
    }
}
