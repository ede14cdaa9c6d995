//! Maven repository metadata (`maven-metadata.xml`) parsing.

use crate::error::{Result, SnowsampleError};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    versioning: Option<RawVersioning>,
}

#[derive(Debug, Default, Deserialize)]
struct RawVersioning {
    #[serde(default)]
    latest: Option<String>,
    #[serde(default)]
    release: Option<String>,
    #[serde(default)]
    versions: Option<RawVersions>,
}

#[derive(Debug, Default, Deserialize)]
struct RawVersions {
    #[serde(default)]
    version: Vec<String>,
}

/// Version information published for one artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MavenMetadata {
    pub latest: Option<String>,
    pub release: Option<String>,
    /// Published versions in repository order (oldest first).
    pub versions: Vec<String>,
}

impl MavenMetadata {
    /// Parses a `maven-metadata.xml` document.
    ///
    /// A document without a `<versioning>` block is rejected.
    pub fn parse(xml: &str) -> Result<Self> {
        let raw: RawMetadata = quick_xml::de::from_str(xml)
            .map_err(|e| SnowsampleError::provision(format!("Malformed maven metadata: {e}")))?;

        let versioning = raw
            .versioning
            .ok_or_else(|| SnowsampleError::provision("Maven metadata has no <versioning> block"))?;

        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        Ok(Self {
            latest: clean(versioning.latest),
            release: clean(versioning.release),
            versions: versioning
                .versions
                .map(|v| v.version)
                .unwrap_or_default()
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    /// Picks the version to install.
    ///
    /// With a suffix filter the newest listed version ending with the suffix
    /// wins. Without one: `<release>`, then `<latest>`, then the last listed
    /// version.
    pub fn resolve_version(&self, suffix: Option<&str>) -> Option<String> {
        match suffix {
            Some(suffix) => self
                .versions
                .iter()
                .rev()
                .find(|v| v.ends_with(suffix))
                .cloned(),
            None => self
                .release
                .clone()
                .or_else(|| self.latest.clone())
                .or_else(|| self.versions.last().cloned()),
        }
    }
}
