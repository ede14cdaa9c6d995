//! Session lifecycle and driver checks.

use super::session_lock;
use pretty_assertions::assert_eq;
use snowsample::config::SessionSettings;
use snowsample::provision::{Artifact, JDBC_DRIVER, SPARK_CONNECTOR};
use snowsample::session::{Session, SessionBuilder};
use snowsample::source::SNOWFLAKE_SOURCE_NAME;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_only_one_session_per_process() {
    let _guard = session_lock();

    let first = Session::builder().build().unwrap();
    assert!(Session::is_active());
    let err = Session::builder().build().unwrap_err();
    assert_eq!(err.category(), "Session Error");

    first.stop();
    assert!(!Session::is_active());
    let second = Session::builder().build().unwrap();
    drop(second);
    assert!(!Session::is_active());
}

#[test]
fn test_provisioned_jars_enable_the_warehouse_format() {
    let _guard = session_lock();
    let dir = tempdir().unwrap();
    let artifacts: Vec<Artifact> = [(JDBC_DRIVER, "3.14.4"), (SPARK_CONNECTOR, "2.12.0-spark_3.4")]
        .into_iter()
        .map(|(product, version)| {
            let path = dir.path().join(Artifact::file_name(product, version));
            fs::write(&path, b"jar").unwrap();
            Artifact {
                product: product.to_string(),
                version: version.to_string(),
                path,
            }
        })
        .collect();

    let settings = SessionSettings {
        master: "local[*]".to_string(),
        extra_class_path: vec!["/opt/hadoop/lib/aws-sdk.jar".to_string()],
        ..SessionSettings::default()
    };
    let session = SessionBuilder::from_settings(&settings)
        .artifacts(&artifacts)
        .build()
        .unwrap();

    let classpath = session.classpath();
    assert_eq!(classpath.len(), 3);
    assert!(classpath[0].ends_with("snowflake-jdbc-3.14.4.jar"));
    assert_eq!(classpath[2], "/opt/hadoop/lib/aws-sdk.jar");
    assert_eq!(session.settings()["master"], "local[*]");

    assert!(session.source("snowflake").is_ok());
    assert!(session.source(SNOWFLAKE_SOURCE_NAME).is_ok());
    session.stop();
}

#[test]
fn test_missing_connector_blocks_the_warehouse_format() {
    let _guard = session_lock();
    let dir = tempdir().unwrap();
    let jdbc = dir.path().join("snowflake-jdbc-3.14.4.jar");
    fs::write(&jdbc, b"jar").unwrap();

    let session = Session::builder().jar(&jdbc).build().unwrap();
    let err = session.source("snowflake").unwrap_err();
    assert!(err.to_string().contains(SPARK_CONNECTOR));
    assert!(session.source("variant").is_ok());
}

#[test]
fn test_missing_jar_fails_build_without_taking_the_slot() {
    let _guard = session_lock();
    let err = Session::builder()
        .jar("/nonexistent/snowflake-jdbc-3.14.4.jar")
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("Jar not found"));
    assert!(!Session::is_active());
}

#[test]
fn test_cluster_master_rejected() {
    let _guard = session_lock();
    let err = Session::builder().master("yarn").build().unwrap_err();
    assert!(err.to_string().contains("Unsupported master"));
}
