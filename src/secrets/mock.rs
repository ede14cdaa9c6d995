//! In-memory secret store for testing and offline runs.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{CredentialNames, Parameter, ParameterBatch, SecretStore};
use crate::error::Result;

/// A secret store that answers from a fixed map.
///
/// Unknown names are reported as invalid, the way the remote store does.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretStore {
    values: BTreeMap<String, String>,
    calls: Arc<AtomicUsize>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// A store holding a placeholder value for every name in `names`.
    pub fn with_placeholders(names: &CredentialNames) -> Self {
        names.all().into_iter().fold(Self::new(), |store, name| {
            let value = name
                .rsplit('/')
                .next()
                .unwrap_or(name.as_str())
                .to_lowercase();
            store.with(name, value)
        })
    }

    /// Number of batch requests served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn get_parameters(
        &self,
        names: &[String],
        _with_decryption: bool,
    ) -> Result<ParameterBatch> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut batch = ParameterBatch::default();
        for name in names {
            match self.values.get(name) {
                Some(value) => batch.parameters.push(Parameter::new(name.clone(), value.clone())),
                None => batch.invalid_parameters.push(name.clone()),
            }
        }
        Ok(batch)
    }
}
