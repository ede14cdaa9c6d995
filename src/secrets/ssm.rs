//! AWS Systems Manager Parameter Store client.
//!
//! Speaks the JSON protocol directly: one signed `AmazonSSM.GetParameters`
//! POST per batch.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::sigv4::{AwsCredentials, AwsRequestSigner};
use super::{Parameter, ParameterBatch, SecretStore};
use crate::error::{Result, SnowsampleError};

/// Default timeout for parameter store requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// The service caps a `GetParameters` batch at this many names.
pub const MAX_BATCH_SIZE: usize = 10;

const TARGET: &str = "AmazonSSM.GetParameters";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetParametersRequest<'a> {
    names: &'a [String],
    with_decryption: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetParametersResponse {
    #[serde(default)]
    parameters: Vec<SsmParameter>,
    #[serde(default)]
    invalid_parameters: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SsmParameter {
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct SsmErrorBody {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

/// Parameter store client for one region.
#[derive(Debug, Clone)]
pub struct SsmClient {
    region: String,
    endpoint: Url,
    credentials: AwsCredentials,
    client: Client,
}

impl SsmClient {
    /// Creates a client for `region`, using the regional endpoint unless
    /// `endpoint` overrides it.
    pub fn new(region: &str, endpoint: Option<&str>, credentials: AwsCredentials) -> Result<Self> {
        let endpoint = endpoint
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://ssm.{region}.amazonaws.com/"));
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| SnowsampleError::config(format!("Invalid SSM endpoint '{endpoint}': {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| SnowsampleError::secrets(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            region: region.to_string(),
            endpoint,
            credentials,
            client,
        })
    }

    /// Creates a client with credentials from the environment or the
    /// container credentials endpoint.
    pub async fn from_env(region: &str, endpoint: Option<&str>) -> Result<Self> {
        Self::new(region, endpoint, AwsCredentials::resolve().await?)
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Builds the signed headers and body of a `GetParameters` call.
    fn build_request(&self, names: &[String], with_decryption: bool) -> Result<(HeaderMap, Vec<u8>)> {
        if names.len() > MAX_BATCH_SIZE {
            return Err(SnowsampleError::config(format!(
                "At most {MAX_BATCH_SIZE} parameters can be fetched in one batch, got {}",
                names.len()
            )));
        }

        let body = serde_json::to_vec(&GetParametersRequest {
            names,
            with_decryption,
        })
        .map_err(|e| SnowsampleError::internal(format!("Failed to encode request: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-amz-json-1.1"),
        );
        headers.insert(
            HeaderName::from_static("x-amz-target"),
            HeaderValue::from_static(TARGET),
        );

        let signer = AwsRequestSigner {
            date: Utc::now(),
            credentials: &self.credentials,
            region: &self.region,
            service: "ssm",
        };
        signer.sign(&Method::POST, &self.endpoint, &mut headers, &body)?;

        Ok((headers, body))
    }
}

fn parse_response(status: reqwest::StatusCode, body: &str) -> Result<ParameterBatch> {
    if !status.is_success() {
        let detail = match serde_json::from_str::<SsmErrorBody>(body) {
            Ok(err) => {
                let kind = err.kind.rsplit('#').next().unwrap_or_default().to_string();
                format!("{kind}: {}", err.message)
            }
            Err(_) => body.to_string(),
        };
        return Err(SnowsampleError::secrets(format!(
            "GetParameters failed ({status}): {detail}"
        )));
    }

    let response: GetParametersResponse = serde_json::from_str(body)
        .map_err(|e| SnowsampleError::secrets(format!("Failed to parse GetParameters response: {e}")))?;

    Ok(ParameterBatch {
        parameters: response
            .parameters
            .into_iter()
            .map(|p| Parameter::new(p.name, p.value))
            .collect(),
        invalid_parameters: response.invalid_parameters,
    })
}

#[async_trait]
impl SecretStore for SsmClient {
    async fn get_parameters(
        &self,
        names: &[String],
        with_decryption: bool,
    ) -> Result<ParameterBatch> {
        let (headers, body) = self.build_request(names, with_decryption)?;
        debug!(endpoint = %self.endpoint, count = names.len(), "GetParameters");

        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SnowsampleError::secrets("Parameter store request timed out")
                } else {
                    SnowsampleError::secrets(format!("Parameter store request failed: {e}"))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SnowsampleError::secrets(format!("Failed to read response: {e}")))?;

        parse_response(status, &text)
    }
}
