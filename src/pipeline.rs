//! The four pipeline stages wired together.
//!
//! Drivers, session, credentials, query: each stage runs to completion
//! before the next starts and any failure ends the run.

use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::frame::{QueryResult, Summary};
use crate::provision::{Artifact, Provisioner};
use crate::query::{QueryExecutor, VariantQuery};
use crate::secrets::{resolve_credentials, SecretStore};
use crate::session::SessionBuilder;
use crate::source::DataSource;

/// Everything a run produces.
#[derive(Debug)]
pub struct PipelineOutput {
    pub artifacts: Vec<Artifact>,
    pub result: QueryResult,
    pub summary: Summary,
}

/// A configured pipeline.
pub struct Pipeline {
    config: Config,
    provisioner: Provisioner,
    secrets: Box<dyn SecretStore>,
    sources: Vec<Arc<dyn DataSource>>,
    download: bool,
}

impl Pipeline {
    pub fn new(config: Config, provisioner: Provisioner, secrets: Box<dyn SecretStore>) -> Self {
        Self {
            config,
            provisioner,
            secrets,
            sources: Vec::new(),
            download: true,
        }
    }

    /// Registers an extra data source on the session.
    pub fn with_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Uses whatever drivers are already on disk instead of checking the
    /// repository.
    pub fn offline(mut self) -> Self {
        self.download = false;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs all four stages.
    pub async fn run(&self) -> Result<PipelineOutput> {
        let products = &self.config.drivers.products;
        let artifacts = if self.download {
            self.provisioner.ensure_all(products).await?
        } else {
            self.provisioner.list_local(products).await?
        };
        info!(count = artifacts.len(), "Drivers ready");

        let mut builder = SessionBuilder::from_settings(&self.config.session).artifacts(&artifacts);
        for source in &self.sources {
            builder = builder.source(Arc::clone(source));
        }
        let session = builder.build()?;

        let outcome = async {
            let credentials = resolve_credentials(self.secrets.as_ref(), &self.config.secrets.names).await?;
            let query = VariantQuery::weather(&self.config.query.table, self.config.query.limit);
            QueryExecutor::new(&session)
                .with_format(&self.config.query.format)
                .execute(&credentials, &query)
                .await
        }
        .await;
        session.stop();

        let result = outcome?;
        let summary = result.describe();
        Ok(PipelineOutput {
            artifacts,
            result,
            summary,
        })
    }
}
