//! Driver provisioning against an in-memory repository and a temp directory.

use super::{FakeRepository, REPOSITORY};
use pretty_assertions::assert_eq;
use snowsample::provision::{
    LocalArtifactStore, MavenRepository, ProductSpec, Provisioner, JDBC_DRIVER, SPARK_CONNECTOR,
};
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use tokio_test::{assert_err, assert_ok};

fn provisioner(repo: &FakeRepository, dir: &Path) -> Provisioner {
    Provisioner::new(
        MavenRepository::new(REPOSITORY, "net.snowflake"),
        Box::new(repo.clone()),
        Box::new(LocalArtifactStore::new(dir)),
    )
}

fn jar_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_fresh_directory_downloads_newest() {
    let dir = tempdir().unwrap();
    let repo = FakeRepository::new();
    repo.publish(JDBC_DRIVER, "3.14.4", &["3.13.0", "3.14.3", "3.14.4"]);

    let artifact = provisioner(&repo, dir.path())
        .ensure_latest(&ProductSpec::new(JDBC_DRIVER))
        .await
        .unwrap();

    assert_eq!(artifact.version, "3.14.4");
    assert_eq!(artifact.path, dir.path().join("snowflake-jdbc-3.14.4.jar"));
    assert_eq!(jar_names(dir.path()), vec!["snowflake-jdbc-3.14.4.jar"]);
    assert_eq!(
        fs::read_to_string(&artifact.path).unwrap(),
        "jar snowflake-jdbc 3.14.4"
    );
    assert_eq!(repo.downloads(), 1);
}

#[tokio::test]
async fn test_second_run_downloads_nothing() {
    let dir = tempdir().unwrap();
    let repo = FakeRepository::new();
    repo.publish(JDBC_DRIVER, "3.14.4", &["3.14.4"]);
    let provisioner = provisioner(&repo, dir.path());
    let product = ProductSpec::new(JDBC_DRIVER);

    let first = provisioner.ensure_latest(&product).await.unwrap();
    let second = provisioner.ensure_latest(&product).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(repo.downloads(), 1);
    assert_eq!(jar_names(dir.path()), vec!["snowflake-jdbc-3.14.4.jar"]);
}

#[tokio::test]
async fn test_stale_versions_are_replaced() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("snowflake-jdbc-3.13.0.jar"), b"old").unwrap();
    fs::write(dir.path().join("snowflake-jdbc-3.14.3.jar"), b"old").unwrap();
    fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

    let repo = FakeRepository::new();
    repo.publish(JDBC_DRIVER, "3.14.4", &["3.13.0", "3.14.3", "3.14.4"]);

    provisioner(&repo, dir.path())
        .ensure_latest(&ProductSpec::new(JDBC_DRIVER))
        .await
        .unwrap();

    assert_eq!(
        jar_names(dir.path()),
        vec!["notes.txt", "snowflake-jdbc-3.14.4.jar"]
    );
}

#[tokio::test]
async fn test_products_do_not_prune_each_other() {
    let dir = tempdir().unwrap();
    let repo = FakeRepository::new();
    repo.publish(JDBC_DRIVER, "3.14.4", &["3.14.4"]);
    repo.publish(
        SPARK_CONNECTOR,
        "2.12.0-spark_3.4",
        &["2.11.3-spark_3.3", "2.12.0-spark_3.3", "2.12.0-spark_3.4"],
    );

    let provisioner = provisioner(&repo, dir.path());
    let products = vec![
        ProductSpec::new(JDBC_DRIVER),
        ProductSpec::new(SPARK_CONNECTOR).with_suffix("spark_3.3"),
    ];
    let artifacts = assert_ok!(provisioner.ensure_all(&products).await);

    assert_eq!(artifacts.len(), 2);
    assert_eq!(artifacts[1].version, "2.12.0-spark_3.3");
    assert_eq!(
        jar_names(dir.path()),
        vec![
            "snowflake-jdbc-3.14.4.jar",
            "spark-snowflake_2.12-2.12.0-spark_3.3.jar"
        ]
    );

    let local = provisioner.list_local(&products).await.unwrap();
    assert_eq!(local, artifacts);
}

#[tokio::test]
async fn test_malformed_metadata_leaves_disk_untouched() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("snowflake-jdbc-3.13.0.jar"), b"old").unwrap();

    let repo = FakeRepository::new();
    repo.publish_raw_metadata(JDBC_DRIVER, "<metadata><groupId>net.snowflake</groupId></metadata>");

    let err = assert_err!(
        provisioner(&repo, dir.path())
            .ensure_latest(&ProductSpec::new(JDBC_DRIVER))
            .await
    );

    assert_eq!(err.category(), "Provision Error");
    assert_eq!(jar_names(dir.path()), vec!["snowflake-jdbc-3.13.0.jar"]);
    assert_eq!(repo.downloads(), 0);
}

#[tokio::test]
async fn test_unreachable_repository_is_provision_error() {
    let dir = tempdir().unwrap();
    let repo = FakeRepository::new();

    let err = provisioner(&repo, dir.path())
        .ensure_latest(&ProductSpec::new(JDBC_DRIVER))
        .await
        .unwrap_err();
    assert_eq!(err.category(), "Provision Error");
    assert!(err.to_string().contains("404"));
}
