//! Warehouse credential resolution.
//!
//! Credentials live in a remote parameter store. They are fetched in one
//! batch request with decryption and converted eagerly into a typed
//! [`SnowflakeCredentials`]; any requested name the store did not return is
//! reported as missing instead of being replaced by an empty value.

mod mock;
mod sigv4;
mod ssm;

pub use mock::StaticSecretStore;
pub use sigv4::{AwsCredentials, AwsRequestSigner};
pub use ssm::SsmClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

use crate::error::{Result, SnowsampleError};

/// One named parameter returned by a secret store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Response of a batch parameter lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterBatch {
    pub parameters: Vec<Parameter>,
    /// Requested names the store does not know.
    pub invalid_parameters: Vec<String>,
}

/// A remote key-value secret store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetches the named parameters in a single request.
    async fn get_parameters(&self, names: &[String], with_decryption: bool)
        -> Result<ParameterBatch>;
}

/// Parameter names of each credential field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialNames {
    pub url: String,
    pub account: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub schema: String,
    pub warehouse: String,
    pub bucket: String,
    pub prefix: String,
}

impl Default for CredentialNames {
    fn default() -> Self {
        Self {
            url: "/SNOWFLAKE/URL".to_string(),
            account: "/SNOWFLAKE/ACCOUNT_ID".to_string(),
            user: "/SNOWFLAKE/USER_ID".to_string(),
            password: "/SNOWFLAKE/PASSWORD".to_string(),
            database: "/SNOWFLAKE/DATABASE".to_string(),
            schema: "/SNOWFLAKE/SCHEMA".to_string(),
            warehouse: "/SNOWFLAKE/WAREHOUSE".to_string(),
            bucket: "/SNOWFLAKE/BUCKET".to_string(),
            prefix: "/SNOWFLAKE/PREFIX".to_string(),
        }
    }
}

impl CredentialNames {
    /// All names in field order.
    pub fn all(&self) -> Vec<String> {
        vec![
            self.url.clone(),
            self.account.clone(),
            self.user.clone(),
            self.password.clone(),
            self.database.clone(),
            self.schema.clone(),
            self.warehouse.clone(),
            self.bucket.clone(),
            self.prefix.clone(),
        ]
    }
}

/// Resolved warehouse credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct SnowflakeCredentials {
    pub url: String,
    pub account: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub schema: String,
    pub warehouse: String,
    pub bucket: String,
    pub prefix: String,
}

impl fmt::Debug for SnowflakeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeCredentials")
            .field("url", &self.url)
            .field("account", &self.account)
            .field("user", &self.user)
            .field("password", &"<secret>")
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("warehouse", &self.warehouse)
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl SnowflakeCredentials {
    /// Builds credentials from a name→value map.
    ///
    /// Every name in `names` must be present with a non-empty value; all
    /// absent names are reported together.
    pub fn from_parameters(names: &CredentialNames, values: &BTreeMap<String, String>) -> Result<Self> {
        let missing: Vec<String> = names
            .all()
            .into_iter()
            .filter(|n| values.get(n).map_or(true, |v| v.is_empty()))
            .collect();
        if !missing.is_empty() {
            return Err(SnowsampleError::credential_missing(missing));
        }

        let get = |name: &String| values.get(name).cloned().unwrap_or_default();
        Ok(Self {
            url: get(&names.url),
            account: get(&names.account),
            user: get(&names.user),
            password: get(&names.password),
            database: get(&names.database),
            schema: get(&names.schema),
            warehouse: get(&names.warehouse),
            bucket: get(&names.bucket),
            prefix: get(&names.prefix),
        })
    }

    /// Connector options (`sfURL`, `sfAccount`, ...).
    pub fn to_options(&self) -> BTreeMap<String, String> {
        [
            ("sfURL", &self.url),
            ("sfAccount", &self.account),
            ("sfUser", &self.user),
            ("sfPassword", &self.password),
            ("sfDatabase", &self.database),
            ("sfSchema", &self.schema),
            ("sfWarehouse", &self.warehouse),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
    }

    /// Staging location (`s3://<bucket>/<prefix>`).
    pub fn staging_location(&self) -> String {
        format!(
            "s3://{}/{}",
            self.bucket.trim_end_matches('/'),
            self.prefix.trim_start_matches('/')
        )
    }
}

/// Fetches exactly `names` with decryption in one batch call.
///
/// The returned map's key set equals the requested name set. Names the store
/// reports as invalid, omits, or returns empty raise `CredentialMissing`.
pub async fn resolve_parameters(
    store: &dyn SecretStore,
    names: &[String],
) -> Result<BTreeMap<String, String>> {
    let requested: BTreeSet<&String> = names.iter().collect();
    debug!(count = requested.len(), "Fetching parameters");

    let batch = store.get_parameters(names, true).await?;

    let mut values = BTreeMap::new();
    for param in batch.parameters {
        if requested.contains(&param.name) && !param.value.is_empty() {
            values.insert(param.name, param.value);
        }
    }

    let missing: Vec<String> = requested
        .iter()
        .filter(|n| !values.contains_key(n.as_str()))
        .map(|n| n.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(SnowsampleError::credential_missing(missing));
    }

    Ok(values)
}

/// Resolves the warehouse credentials named by `names`.
pub async fn resolve_credentials(
    store: &dyn SecretStore,
    names: &CredentialNames,
) -> Result<SnowflakeCredentials> {
    let values = resolve_parameters(store, &names.all()).await?;
    let credentials = SnowflakeCredentials::from_parameters(names, &values)?;
    info!(
        account = %credentials.account,
        user = %credentials.user,
        password = %mask_secret(&credentials.password),
        "Resolved warehouse credentials"
    );
    Ok(credentials)
}

/// Masks a secret for display, showing only the last 4 characters.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        "*".repeat(chars.len())
    } else {
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****...{tail}")
    }
}
