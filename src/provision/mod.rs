//! Driver provisioning.
//!
//! Keeps exactly one copy of the newest published version of each driver
//! artifact in a local directory. Version metadata and artifacts come from a
//! Maven-layout repository through an [`ArtifactFetcher`]; files are managed
//! through an [`ArtifactStore`], so both sides can be swapped out in tests.

mod fetch;
mod metadata;
mod store;

pub use fetch::{ArtifactFetcher, HttpArtifactFetcher};
pub use metadata::MavenMetadata;
pub use store::{ArtifactStore, LocalArtifactStore};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::{Result, SnowsampleError};

/// Default repository root (Maven Central).
pub const DEFAULT_REPOSITORY: &str = "https://repo1.maven.org/maven2";

/// Default group the warehouse drivers are published under.
pub const DEFAULT_GROUP: &str = "net.snowflake";

/// JDBC driver product name.
pub const JDBC_DRIVER: &str = "snowflake-jdbc";

/// Connector product name.
pub const SPARK_CONNECTOR: &str = "spark-snowflake_2.12";

/// A product to keep up to date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSpec {
    /// Artifact id in the repository.
    pub name: String,

    /// Only consider versions ending with this suffix (e.g. `-spark_3.4`).
    #[serde(default)]
    pub version_suffix: Option<String>,
}

impl ProductSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version_suffix: None,
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.version_suffix = Some(suffix.into());
        self
    }
}

/// The default product list: JDBC driver plus connector.
pub fn default_products() -> Vec<ProductSpec> {
    vec![ProductSpec::new(JDBC_DRIVER), ProductSpec::new(SPARK_CONNECTOR)]
}

/// A driver artifact present on local disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub product: String,
    pub version: String,
    pub path: PathBuf,
}

impl Artifact {
    /// File name used for a product version: `<product>-<version>.jar`.
    pub fn file_name(product: &str, version: &str) -> String {
        format!("{product}-{version}.jar")
    }
}

/// Extracts the version from `file_name` if it is an artifact of `product`.
///
/// Versions must start with a digit so that `foo-bar-1.0.jar` is not taken as
/// a version of product `foo`.
pub fn artifact_version(product: &str, file_name: &str) -> Option<String> {
    let pattern = format!(r"^{}-(\d[0-9A-Za-z._-]*)\.jar$", regex::escape(product));
    let re = Regex::new(&pattern).ok()?;
    re.captures(file_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn is_valid_version(version: &str) -> bool {
    !version.is_empty()
        && !version.contains("..")
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// URL layout of a Maven repository for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavenRepository {
    base_url: String,
    group: String,
}

impl MavenRepository {
    pub fn new(base_url: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            group: group.into(),
        }
    }

    fn group_path(&self) -> String {
        self.group.replace('.', "/")
    }

    /// `<base>/<group path>/<product>/maven-metadata.xml`
    pub fn metadata_url(&self, product: &str) -> String {
        format!(
            "{}/{}/{product}/maven-metadata.xml",
            self.base_url,
            self.group_path()
        )
    }

    /// `<base>/<group path>/<product>/<version>/<product>-<version>.jar`
    pub fn artifact_url(&self, product: &str, version: &str) -> String {
        format!(
            "{}/{}/{product}/{version}/{}",
            self.base_url,
            self.group_path(),
            Artifact::file_name(product, version)
        )
    }
}

impl Default for MavenRepository {
    fn default() -> Self {
        Self::new(DEFAULT_REPOSITORY, DEFAULT_GROUP)
    }
}

/// Resolves, downloads and prunes driver artifacts.
pub struct Provisioner {
    repository: MavenRepository,
    fetcher: Box<dyn ArtifactFetcher>,
    store: Box<dyn ArtifactStore>,
}

impl Provisioner {
    pub fn new(
        repository: MavenRepository,
        fetcher: Box<dyn ArtifactFetcher>,
        store: Box<dyn ArtifactStore>,
    ) -> Self {
        Self {
            repository,
            fetcher,
            store,
        }
    }

    /// Makes sure the newest version of `product` is the only one on disk.
    ///
    /// Idempotent: when the newest version is already present nothing is
    /// downloaded. Unresolvable metadata is an error; nothing on disk is
    /// touched in that case.
    pub async fn ensure_latest(&self, product: &ProductSpec) -> Result<Artifact> {
        let version = self.latest_version(product).await?;
        let file_name = Artifact::file_name(&product.name, &version);

        let installed: Vec<String> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|f| artifact_version(&product.name, f).is_some())
            .collect();

        let path = if installed.contains(&file_name) {
            info!(product = %product.name, %version, "Driver up to date");
            self.store.path_of(&file_name)
        } else {
            let url = self.repository.artifact_url(&product.name, &version);
            info!(product = %product.name, %version, %url, "Downloading driver");
            let bytes = self.fetcher.fetch_bytes(&url).await?;
            self.store.write(&file_name, &bytes).await?
        };

        for stale in installed.iter().filter(|f| **f != file_name) {
            info!(product = %product.name, file = %stale, "Removing stale driver");
            self.store.remove(stale).await?;
        }

        Ok(Artifact {
            product: product.name.clone(),
            version,
            path,
        })
    }

    /// Runs [`Self::ensure_latest`] for each product in order.
    pub async fn ensure_all(&self, products: &[ProductSpec]) -> Result<Vec<Artifact>> {
        let mut artifacts = Vec::with_capacity(products.len());
        for product in products {
            artifacts.push(self.ensure_latest(product).await?);
        }
        Ok(artifacts)
    }

    /// Lists artifacts of the given products currently on disk.
    pub async fn list_local(&self, products: &[ProductSpec]) -> Result<Vec<Artifact>> {
        let files = self.store.list().await?;
        let mut artifacts = Vec::new();
        for product in products {
            for file in &files {
                if let Some(version) = artifact_version(&product.name, file) {
                    artifacts.push(Artifact {
                        product: product.name.clone(),
                        version,
                        path: self.store.path_of(file),
                    });
                }
            }
        }
        Ok(artifacts)
    }

    async fn latest_version(&self, product: &ProductSpec) -> Result<String> {
        let url = self.repository.metadata_url(&product.name);
        debug!(product = %product.name, %url, "Fetching version metadata");

        let xml = self.fetcher.fetch_text(&url).await?;
        let metadata = MavenMetadata::parse(&xml).map_err(|e| {
            SnowsampleError::provision(format!("{} ({}): {e}", product.name, url))
        })?;

        let version = metadata
            .resolve_version(product.version_suffix.as_deref())
            .ok_or_else(|| match &product.version_suffix {
                Some(suffix) => SnowsampleError::provision(format!(
                    "No published version of {} ends with '{suffix}'",
                    product.name
                )),
                None => SnowsampleError::provision(format!(
                    "Metadata for {} lists no version",
                    product.name
                )),
            })?;

        if !is_valid_version(&version) {
            return Err(SnowsampleError::provision(format!(
                "Refusing suspicious version '{version}' for {}",
                product.name
            )));
        }
        Ok(version)
    }
}
