//! End-to-end runs of all four stages with in-process fakes.

use super::{session_lock, FakeRepository, REPOSITORY};
use pretty_assertions::assert_eq;
use serde_json::json;
use snowsample::config::Config;
use snowsample::pipeline::Pipeline;
use snowsample::provision::{
    LocalArtifactStore, MavenRepository, Provisioner, JDBC_DRIVER, SPARK_CONNECTOR,
};
use snowsample::secrets::{CredentialNames, StaticSecretStore};
use snowsample::session::Session;
use snowsample::source::{VariantSource, VARIANT_FORMAT};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn repository() -> FakeRepository {
    let repo = FakeRepository::new();
    repo.publish(JDBC_DRIVER, "3.14.4", &["3.14.3", "3.14.4"]);
    repo.publish(SPARK_CONNECTOR, "2.12.0-spark_3.4", &["2.12.0-spark_3.4"]);
    repo
}

fn config(dir: &Path, limit: usize) -> Config {
    let mut config = Config::default();
    config.drivers.dir = dir.to_path_buf();
    config.drivers.repository = REPOSITORY.to_string();
    config.query.format = VARIANT_FORMAT.to_string();
    config.query.limit = limit;
    config
}

fn provisioner(repo: &FakeRepository, config: &Config) -> Provisioner {
    Provisioner::new(
        MavenRepository::new(&config.drivers.repository, &config.drivers.group),
        Box::new(repo.clone()),
        Box::new(LocalArtifactStore::new(&config.drivers.dir)),
    )
}

fn observations() -> VariantSource {
    VariantSource::new(vec![
        json!({"main": {"temp_max": 300.0, "temp_min": 290.0}, "time": 1_477_494_000,
               "city": {"coord": {"lat": 51.5, "lon": -0.1}}}),
        json!({"main": {"temp_max": 280.0, "temp_min": 270.0}, "time": 1_477_497_600,
               "city": {"coord": {"lat": 48.9, "lon": 2.4}}}),
        json!({"main": {"temp_max": 290.0, "temp_min": 280.0}, "time": 1_477_501_200,
               "city": {"coord": {"lat": 59.9, "lon": 10.8}}}),
    ])
}

#[tokio::test]
async fn test_full_run_produces_bounded_table_and_summary() {
    let _guard = session_lock();
    let dir = tempdir().unwrap();
    let repo = repository();
    let config = config(dir.path(), 2);
    let provisioner = provisioner(&repo, &config);
    let secrets = StaticSecretStore::with_placeholders(&CredentialNames::default());

    let output = Pipeline::new(config, provisioner, Box::new(secrets.clone()))
        .with_source(Arc::new(observations()))
        .run()
        .await
        .unwrap();

    assert_eq!(output.artifacts.len(), 2);
    assert_eq!(repo.downloads(), 2);
    assert_eq!(secrets.calls(), 1);
    assert!(!Session::is_active());

    let names: Vec<&str> = output.result.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["TEMP_MAX_FAR", "TEMP_MIN_FAR", "TIME", "LAT", "LON"]
    );
    assert_eq!(output.result.row_count, 2);
    assert!(output.result.row_count <= 2);

    let max = output.summary.column("TEMP_MAX_FAR").unwrap();
    assert_eq!(max.count, 2);
    assert!((max.max.unwrap() - 80.33).abs() < 1e-9);
    assert!((max.min.unwrap() - 44.33).abs() < 1e-9);
    assert!(output.summary.column("TIME").is_none());
}

#[tokio::test]
async fn test_offline_run_uses_existing_drivers() {
    let _guard = session_lock();
    let dir = tempdir().unwrap();
    let repo = repository();
    let config = config(dir.path(), 100);

    provisioner(&repo, &config)
        .ensure_all(&config.drivers.products)
        .await
        .unwrap();
    assert_eq!(repo.downloads(), 2);

    let provisioner = provisioner(&repo, &config);
    let secrets = StaticSecretStore::with_placeholders(&CredentialNames::default());
    let output = Pipeline::new(config, provisioner, Box::new(secrets))
        .with_source(Arc::new(observations()))
        .offline()
        .run()
        .await
        .unwrap();

    assert_eq!(repo.downloads(), 2);
    assert_eq!(output.artifacts.len(), 2);
    assert_eq!(output.result.row_count, 3);
    assert!(output.result.truncation_warning().is_none());
}

#[tokio::test]
async fn test_missing_credentials_stop_the_run_and_release_the_session() {
    let _guard = session_lock();
    let dir = tempdir().unwrap();
    let repo = repository();
    let config = config(dir.path(), 10);
    let provisioner = provisioner(&repo, &config);
    let secrets = StaticSecretStore::new().with("/SNOWFLAKE/URL", "acme.snowflakecomputing.com");

    let err = Pipeline::new(config, provisioner, Box::new(secrets))
        .with_source(Arc::new(observations()))
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.category(), "Credential Error");
    assert!(err.to_string().contains("/SNOWFLAKE/PASSWORD"));
    assert!(!Session::is_active());
    // Provisioning completed before the failure.
    assert!(dir.path().join("snowflake-jdbc-3.14.4.jar").is_file());
}

#[tokio::test]
async fn test_provision_failure_stops_before_session() {
    let _guard = session_lock();
    let dir = tempdir().unwrap();
    let repo = FakeRepository::new();
    let config = config(dir.path(), 10);
    let provisioner = provisioner(&repo, &config);
    let secrets = StaticSecretStore::with_placeholders(&CredentialNames::default());

    let err = Pipeline::new(config, provisioner, Box::new(secrets.clone()))
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.category(), "Provision Error");
    assert_eq!(secrets.calls(), 0);
}
