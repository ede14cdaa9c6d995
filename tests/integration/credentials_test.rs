//! Credential resolution through the secret store seam.

use super::{Canned, FakeHttpServer};
use pretty_assertions::assert_eq;
use serde_json::json;
use snowsample::secrets::{
    resolve_credentials, AwsCredentials, CredentialNames, SecretStore, SsmClient,
    StaticSecretStore,
};

fn full_store() -> StaticSecretStore {
    StaticSecretStore::new()
        .with("/SNOWFLAKE/URL", "acme.snowflakecomputing.com")
        .with("/SNOWFLAKE/ACCOUNT_ID", "acme")
        .with("/SNOWFLAKE/USER_ID", "analyst")
        .with("/SNOWFLAKE/PASSWORD", "hunter22")
        .with("/SNOWFLAKE/DATABASE", "SNOWFLAKE_SAMPLE_DATA")
        .with("/SNOWFLAKE/SCHEMA", "WEATHER")
        .with("/SNOWFLAKE/WAREHOUSE", "COMPUTE_WH")
        .with("/SNOWFLAKE/BUCKET", "acme-staging")
        .with("/SNOWFLAKE/PREFIX", "tmp/")
}

#[tokio::test]
async fn test_resolves_all_fields_in_one_call() {
    let store = full_store();
    let creds = resolve_credentials(&store, &CredentialNames::default())
        .await
        .unwrap();

    assert_eq!(store.calls(), 1);
    assert_eq!(creds.account, "acme");
    assert_eq!(creds.staging_location(), "s3://acme-staging/tmp/");

    let options = creds.to_options();
    assert_eq!(options["sfURL"], "acme.snowflakecomputing.com");
    assert_eq!(options["sfWarehouse"], "COMPUTE_WH");
    assert!(!format!("{creds:?}").contains("hunter22"));
}

#[tokio::test]
async fn test_every_missing_name_is_reported() {
    let store = StaticSecretStore::new()
        .with("/SNOWFLAKE/URL", "acme.snowflakecomputing.com")
        .with("/SNOWFLAKE/ACCOUNT_ID", "acme")
        .with("/SNOWFLAKE/USER_ID", "analyst")
        .with("/SNOWFLAKE/PASSWORD", "")
        .with("/SNOWFLAKE/DATABASE", "DB")
        .with("/SNOWFLAKE/SCHEMA", "S")
        .with("/SNOWFLAKE/WAREHOUSE", "WH");

    let err = resolve_credentials(&store, &CredentialNames::default())
        .await
        .unwrap_err();
    let message = err.to_string();

    assert_eq!(err.category(), "Credential Error");
    for name in ["/SNOWFLAKE/PASSWORD", "/SNOWFLAKE/BUCKET", "/SNOWFLAKE/PREFIX"] {
        assert!(message.contains(name), "{message} should name {name}");
    }
    assert!(!message.contains("/SNOWFLAKE/URL"));
}

#[tokio::test]
async fn test_custom_names_are_honored() {
    let names = CredentialNames {
        password: "/team/pw".to_string(),
        ..CredentialNames::default()
    };
    let store = full_store().with("/team/pw", "s3cr3t-team");
    let creds = resolve_credentials(&store, &names).await.unwrap();
    assert_eq!(creds.password, "s3cr3t-team");
}

fn test_credentials() -> AwsCredentials {
    AwsCredentials {
        key_id: "AKIDEXAMPLE".to_string(),
        secret: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
        session_token: None,
    }
}

#[tokio::test]
async fn test_ssm_client_signs_and_parses() {
    let body = json!({
        "Parameters": [
            {"Name": "/SNOWFLAKE/USER_ID", "Type": "String", "Value": "analyst", "Version": 1},
            {"Name": "/SNOWFLAKE/PASSWORD", "Type": "SecureString", "Value": "hunter22", "Version": 3}
        ],
        "InvalidParameters": ["/SNOWFLAKE/NOPE"]
    })
    .to_string();
    let server = FakeHttpServer::start().await;
    server.route("POST /", vec![Canned::ok(body)]);

    let client = SsmClient::new("eu-west-1", Some(server.base()), test_credentials()).unwrap();
    let names = vec![
        "/SNOWFLAKE/USER_ID".to_string(),
        "/SNOWFLAKE/PASSWORD".to_string(),
        "/SNOWFLAKE/NOPE".to_string(),
    ];
    let batch = client.get_parameters(&names, true).await.unwrap();

    assert_eq!(batch.parameters.len(), 2);
    assert_eq!(batch.parameters[1].value, "hunter22");
    assert_eq!(batch.invalid_parameters, vec!["/SNOWFLAKE/NOPE"]);

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let headers = requests[0].headers.to_lowercase();
    assert!(headers.contains("x-amz-target: amazonssm.getparameters"));
    assert!(headers.contains("credential=akidexample/"));
    assert!(headers.contains("/eu-west-1/ssm/aws4_request"));
    assert!(requests[0].body.contains("\"WithDecryption\":true"));
}

#[tokio::test]
async fn test_ssm_error_is_secret_store_error() {
    let body = json!({
        "__type": "com.amazon.coral.service#AccessDeniedException",
        "message": "User is not authorized to perform ssm:GetParameters"
    })
    .to_string();
    let server = FakeHttpServer::start().await;
    server.route("POST /", vec![Canned::status("400 Bad Request", body)]);

    let client = SsmClient::new("eu-west-1", Some(server.base()), test_credentials()).unwrap();
    let err = client
        .get_parameters(&["/SNOWFLAKE/URL".to_string()], true)
        .await
        .unwrap_err();

    assert_eq!(err.category(), "Secret Store Error");
    assert!(err.to_string().contains("AccessDeniedException"));
}

#[tokio::test]
async fn test_container_credentials_are_fetched_with_token() {
    let server = FakeHttpServer::start().await;
    server.route(
        "GET /v2/credentials/task-1",
        vec![Canned::ok(
            json!({
                "AccessKeyId": "ASIAEXAMPLE",
                "SecretAccessKey": "container-secret",
                "Token": "session-token",
                "Expiration": "2026-10-16T12:00:00Z"
            })
            .to_string(),
        )],
    );

    let url = format!("{}v2/credentials/task-1", server.base());
    let creds = AwsCredentials::from_container(&reqwest::Client::new(), &url, Some("pod-token"))
        .await
        .unwrap();

    assert_eq!(creds.key_id, "ASIAEXAMPLE");
    assert_eq!(creds.secret, "container-secret");
    assert_eq!(creds.session_token.as_deref(), Some("session-token"));
    let headers = server.requests()[0].headers.to_lowercase();
    assert!(headers.contains("authorization: pod-token"));
}

#[tokio::test]
async fn test_container_credentials_failure_is_secret_store_error() {
    let server = FakeHttpServer::start().await;
    let url = format!("{}v2/credentials/unknown", server.base());

    let err = AwsCredentials::from_container(&reqwest::Client::new(), &url, None)
        .await
        .unwrap_err();
    assert_eq!(err.category(), "Secret Store Error");
    assert!(err.to_string().contains("404"));
}
