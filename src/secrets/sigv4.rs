//! AWS credentials and Signature Version 4 request signing.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::fs;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, HOST};
use reqwest::{Client, Method};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use crate::error::{Result, SnowsampleError};

const SIGN_ALG: &str = "AWS4-HMAC-SHA256";

/// Host serving `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI` paths.
const CONTAINER_CREDENTIALS_HOST: &str = "http://169.254.170.2";

const CONTAINER_TIMEOUT_SECS: u64 = 5;

type HmacSha256 = Hmac<Sha256>;

/// Static AWS access keys.
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub key_id: String,
    pub secret: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("key_id", &self.key_id)
            .field("secret", &"<secret>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<secret>"))
            .finish()
    }
}

impl AwsCredentials {
    /// Reads `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and the optional
    /// `AWS_SESSION_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| SnowsampleError::secrets("AWS_ACCESS_KEY_ID is not set"))?;
        let secret = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| SnowsampleError::secrets("AWS_SECRET_ACCESS_KEY is not set"))?;
        let session_token = std::env::var("AWS_SESSION_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());
        Ok(Self {
            key_id,
            secret,
            session_token,
        })
    }

    /// Environment keys first, then the container credentials endpoint
    /// (ECS task roles, EKS pod identity).
    pub async fn resolve() -> Result<Self> {
        if let Ok(credentials) = Self::from_env() {
            return Ok(credentials);
        }
        let Some(endpoint) = ContainerEndpoint::from_lookup(|name| std::env::var(name).ok())? else {
            return Err(SnowsampleError::secrets(
                "No AWS credentials: set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY, \
                 or run with a container credentials endpoint",
            ));
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(CONTAINER_TIMEOUT_SECS))
            .build()
            .map_err(|e| SnowsampleError::secrets(format!("Failed to create HTTP client: {e}")))?;
        Self::from_container(&client, &endpoint.url, endpoint.authorization.as_deref()).await
    }

    /// Fetches temporary credentials from a container credentials endpoint.
    pub async fn from_container(
        client: &Client,
        url: &str,
        authorization: Option<&str>,
    ) -> Result<Self> {
        debug!(%url, "Fetching container credentials");
        let mut request = client.get(url).header(ACCEPT, "application/json");
        if let Some(token) = authorization {
            request = request.header(AUTHORIZATION, token);
        }
        let response = request.send().await.map_err(|e| {
            SnowsampleError::secrets(format!("Container credentials request failed: {e}"))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            SnowsampleError::secrets(format!("Failed to read container credentials: {e}"))
        })?;
        if !status.is_success() {
            return Err(SnowsampleError::secrets(format!(
                "Container credentials endpoint returned {status}"
            )));
        }

        let parsed: ContainerCredentials = serde_json::from_str(&body)
            .map_err(|e| SnowsampleError::secrets(format!("Invalid container credentials: {e}")))?;
        Ok(Self {
            key_id: parsed.access_key_id,
            secret: parsed.secret_access_key,
            session_token: parsed.token.filter(|t| !t.is_empty()),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerCredentials {
    access_key_id: String,
    secret_access_key: String,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
struct ContainerEndpoint {
    url: String,
    authorization: Option<String>,
}

impl ContainerEndpoint {
    /// `None` when no container endpoint variable is set.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let url = match (
            var("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI"),
            var("AWS_CONTAINER_CREDENTIALS_FULL_URI"),
        ) {
            (Some(path), _) => format!("{CONTAINER_CREDENTIALS_HOST}{path}"),
            (None, Some(full)) => full,
            (None, None) => return Ok(None),
        };

        let authorization = match var("AWS_CONTAINER_AUTHORIZATION_TOKEN") {
            Some(token) => Some(token),
            None => match var("AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE") {
                Some(path) => {
                    let token = fs::read_to_string(&path).map_err(|e| {
                        SnowsampleError::secrets(format!("Cannot read token file {path}: {e}"))
                    })?;
                    Some(token.trim().to_string())
                }
                None => None,
            },
        };

        Ok(Some(Self { url, authorization }))
    }
}

/// Signs requests for one service in one region.
///
/// See <https://docs.aws.amazon.com/IAM/latest/UserGuide/create-signed-request.html>
#[derive(Debug)]
pub struct AwsRequestSigner<'a> {
    pub date: DateTime<Utc>,
    pub credentials: &'a AwsCredentials,
    pub region: &'a str,
    pub service: &'a str,
}

impl AwsRequestSigner<'_> {
    /// Adds `host`, `x-amz-date`, the session token (if any) and the
    /// `authorization` header to `headers`.
    pub fn sign(&self, method: &Method, url: &Url, headers: &mut HeaderMap, body: &[u8]) -> Result<()> {
        let host = url
            .host_str()
            .ok_or_else(|| SnowsampleError::secrets(format!("URL has no host: {url}")))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        headers.insert(HOST, header_value(&host)?);

        let amz_date = self.date.format("%Y%m%dT%H%M%SZ").to_string();
        headers.insert(HeaderName::from_static("x-amz-date"), header_value(&amz_date)?);

        if let Some(token) = &self.credentials.session_token {
            headers.insert(
                HeaderName::from_static("x-amz-security-token"),
                header_value(token)?,
            );
        }

        let payload_hash = hex::encode(Sha256::digest(body));
        let (canonical_headers, signed_headers) = canonical_headers(headers)?;

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method,
            url.path(),
            canonical_query_string(url),
            canonical_headers,
            signed_headers,
            payload_hash,
        );
        let request_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));

        let scope = self.credential_scope();
        let string_to_sign = format!("{SIGN_ALG}\n{amz_date}\n{scope}\n{request_hash}");
        let signature = hex::encode(hmac_sha256(&self.signing_key()?, string_to_sign.as_bytes())?);

        let auth = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            SIGN_ALG, self.credentials.key_id, scope, signed_headers, signature,
        );
        headers.insert(AUTHORIZATION, header_value(&auth)?);
        Ok(())
    }

    /// Derives the signing key.
    ///
    /// Each HMAC output keys the next step; a single chained HMAC state does
    /// not produce the same key.
    pub fn signing_key(&self) -> Result<Vec<u8>> {
        let date_key = hmac_sha256(
            format!("AWS4{}", self.credentials.secret).as_bytes(),
            self.date.format("%Y%m%d").to_string().as_bytes(),
        )?;
        let region_key = hmac_sha256(&date_key, self.region.as_bytes())?;
        let service_key = hmac_sha256(&region_key, self.service.as_bytes())?;
        hmac_sha256(&service_key, b"aws4_request")
    }

    fn credential_scope(&self) -> String {
        format!(
            "{}/{}/{}/aws4_request",
            self.date.format("%Y%m%d"),
            self.region,
            self.service,
        )
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| SnowsampleError::internal(format!("HMAC key rejected: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn header_value(s: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(s)
        .map_err(|e| SnowsampleError::secrets(format!("Invalid header value: {e}")))
}

/// URI encoding set following AWS rules.
const AWS_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn canonical_query_string(url: &Url) -> String {
    let params: BTreeMap<String, String> = url
        .query_pairs()
        .map(|(k, v)| {
            (
                utf8_percent_encode(&k, AWS_ENCODE_SET).to_string(),
                utf8_percent_encode(&v, AWS_ENCODE_SET).to_string(),
            )
        })
        .collect();

    let mut buf = String::new();
    for (idx, (key, val)) in params.into_iter().enumerate() {
        if idx > 0 {
            buf.push('&');
        }
        let _ = write!(buf, "{key}={val}");
    }
    buf
}

fn canonical_headers(header_map: &HeaderMap) -> Result<(String, String)> {
    let mut headers: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (key, val) in header_map {
        let val = val
            .to_str()
            .map_err(|e| SnowsampleError::secrets(format!("Non-ASCII header {key}: {e}")))?;
        headers.entry(key.as_str()).or_default().push(val);
    }

    let mut header_buf = String::new();
    let mut signed_buf = String::new();
    for (idx, (key, vals)) in headers.into_iter().enumerate() {
        if idx > 0 {
            signed_buf.push(';');
        }
        signed_buf.push_str(key);

        header_buf.push_str(key);
        header_buf.push(':');
        let joined: Vec<&str> = vals.into_iter().map(str::trim).collect();
        header_buf.push_str(&joined.join(","));
        header_buf.push('\n');
    }

    Ok((header_buf, signed_buf))
}
