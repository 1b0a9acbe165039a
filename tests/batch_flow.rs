//! Integration tests for the batch drivers using wiremock.
//!
//! These tests mock the OpsRamp API and run each driver over a few input
//! rows, checking that every row yields exactly one record with the right
//! status and that one row's failure never stops the rest of the batch.

use std::time::Duration;

use opsramp_lc::auth::TokenProvider;
use opsramp_lc::batch::membership::{self, Target};
use opsramp_lc::batch::tagging::{self, TagRequest};
use opsramp_lc::batch::{
    InputColumns, NO_RESOURCE, OutputFormat, SheetRow, lookup, read_rows, unmanage, write_records,
};
use opsramp_lc::client::OpsRampClient;
use opsramp_lc::retry::RetryPolicy;
use opsramp_lc::tags::ClearPolicy;
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper: create a mock client with a pre-seeded token.
fn mock_client(server: &MockServer) -> OpsRampClient {
    let tp = TokenProvider::with_token("mock-token");
    OpsRampClient::with_base_url(tp, &server.uri())
        .expect("client should build")
        .with_retry_policy(RetryPolicy::fixed(5, Duration::ZERO))
}

fn row(n: usize, server: &str, client: Option<&str>) -> SheetRow {
    SheetRow {
        row: n,
        server_name: server.to_string(),
        client_name: client.map(str::to_string),
    }
}

/// Mounts a single-page search answer for `name`.
async fn mount_search(server: &MockServer, name: &str, results: Value) {
    Mock::given(method("GET"))
        .and(path("/api/v2/tenants/msp-1/resources/search"))
        .and(query_param("queryString", format!("name:{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": results,
            "nextPage": false
        })))
        .mount(server)
        .await;
}

fn device(id: &str, name: &str, client: &str, unique_id: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "hostName": name,
        "ipAddress": "10.0.0.5",
        "agentInstalled": true,
        "state": "active",
        "status": "UP",
        "client": {"id": 7, "name": client, "uniqueId": unique_id},
        "tags": [{"name": "Environment", "value": "Production"}]
    })
}

// ── Lookup ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn lookup_picks_the_matching_client_and_reports_misses() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    mount_search(
        &server,
        "web01",
        json!([
            device("r-1", "web01", "Globex", "c-9"),
            device("r-2", "web01", "Acme Inc", "c-7")
        ]),
    )
    .await;
    mount_search(&server, "ghost", json!([])).await;

    let rows = [row(2, "web01", Some("Acme")), row(3, "ghost", Some("Acme"))];
    let records = lookup::run(&client, "msp-1", &rows).await;

    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["Client Name"], "Acme Inc");
    assert_eq!(records[0]["Client UniqueID"], "c-7");
    assert_eq!(records[0][lookup::LOOKUP_STATUS], lookup::FOUND);
    assert_eq!(records[0]["Tags"]["Environment"], "Production");

    assert_eq!(records[1]["Host Name"], "ghost");
    assert_eq!(records[1][lookup::LOOKUP_STATUS], NO_RESOURCE);
}

#[tokio::test]
async fn lookup_rejects_close_but_different_client_names() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    mount_search(
        &server,
        "web01",
        json!([
            device("r-1", "web01", "Ac Me", "c-9"),
            device("r-2", "web01", "Globex", "c-8")
        ]),
    )
    .await;

    let records = lookup::run(&client, "msp-1", &[row(2, "web01", Some("Acme"))]).await;
    assert_eq!(records[0][lookup::LOOKUP_STATUS], NO_RESOURCE);
}

#[tokio::test]
async fn lookup_skips_search_rows_without_id() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    mount_search(
        &server,
        "web01",
        json!([
            {"name": "web01", "agentInstalled": true, "client": {"name": "Acme Inc"}},
            device("r-1", "web01", "Acme Inc", "c-7")
        ]),
    )
    .await;

    let records = lookup::run(&client, "msp-1", &[row(2, "web01", Some("Acme"))]).await;
    assert_eq!(records[0][lookup::LOOKUP_STATUS], lookup::FOUND);
    assert_eq!(records[0]["Client UniqueID"], "c-7");
}

#[tokio::test]
async fn lookup_search_failure_is_recorded_per_row() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    Mock::given(method("GET"))
        .and(path("/api/v2/tenants/msp-1/resources/search"))
        .and(query_param("queryString", "name:broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream failure"))
        .mount(&server)
        .await;
    mount_search(&server, "web01", json!([device("r-1", "web01", "Acme", "c-7")])).await;

    let rows = [row(2, "broken", None), row(3, "web01", None)];
    let records = lookup::run(&client, "msp-1", &rows).await;

    let status = records[0][lookup::LOOKUP_STATUS].as_str().unwrap();
    assert!(status.starts_with("Error - "), "got {status}");
    assert_eq!(records[1][lookup::LOOKUP_STATUS], lookup::FOUND);
}

// ── Unmanage ───────────────────────────────────────────────────────────

#[tokio::test]
async fn unmanage_reports_every_row() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    // A decommissioned device is down; it is still unmanaged.
    let mut old = device("r-9", "old01", "Acme Inc", "c-7");
    old["agentInstalled"] = json!(false);
    old["state"] = json!("inactive");
    old["status"] = json!("DOWN");
    mount_search(&server, "old01", json!([old])).await;
    mount_search(&server, "ghost", json!([])).await;
    mount_search(&server, "bad01", json!([device("r-5", "bad01", "Acme Inc", "c-7")])).await;

    Mock::given(method("POST"))
        .and(path("/api/v2/tenants/c-7/devices/r-9/unmanage"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/tenants/c-7/devices/r-5/unmanage"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "0x3001",
            "message": "Device is not in managed state"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let rows = [
        row(2, "old01", Some("Acme")),
        row(3, "ghost", Some("Acme")),
        row(4, "bad01", None),
    ];
    let records = unmanage::run(&client, "msp-1", &rows).await;

    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["status"], unmanage::UNMANAGED);
    assert_eq!(records[0]["unique_id"], "c-7");
    assert_eq!(records[0]["ip_address"], "10.0.0.5");
    assert_eq!(records[1]["status"], NO_RESOURCE);
    assert_eq!(records[1]["client_name"], "Acme");
    assert_eq!(records[2]["status"], unmanage::UNMANAGE_FAILED);
}

#[tokio::test]
async fn unmanage_without_client_tenant_is_an_error_row() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    mount_search(&server, "orphan01", json!([{"id": "r-3", "name": "orphan01"}])).await;

    let records = unmanage::run(&client, "msp-1", &[row(2, "orphan01", None)]).await;
    let status = records[0]["status"].as_str().unwrap();
    assert!(status.starts_with("Error - "), "got {status}");
}

// ── Tagging ────────────────────────────────────────────────────────────

#[tokio::test]
async fn tagging_assigns_in_the_client_tenant() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    mount_search(&server, "web01", json!([device("r-1", "web01", "Acme Inc", "c-7")])).await;

    Mock::given(method("POST"))
        .and(path("/opsql/api/v3/tenants/c-7/queries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": "tag-1", "name": "Patch Window"}],
            "nextPage": false
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/tenants/c-7/tags/tag-1/values"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"uniqueId": "val-3", "value": "Sunday 02:00"}],
            "nextPage": false
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v3/tenants/c-7/tags/tag-1/values/val-3/tagged-entities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"successCount": 1})))
        .expect(1)
        .mount(&server)
        .await;
    mount_search(&server, "ghost", json!([])).await;

    let request = TagRequest {
        tag: "Patch Window".into(),
        value: "Sunday 02:00".into(),
        policy: ClearPolicy::OnConflict,
    };
    let rows = [row(2, "web01", Some("Acme")), row(3, "ghost", None)];
    let records = tagging::run(&client, "msp-1", &rows, &request).await;

    assert_eq!(records[0]["resource_id"], "r-1");
    assert_eq!(records[0]["status"], tagging::ASSIGNED);
    assert_eq!(records[1]["resource_id"], "N/A");
    assert_eq!(records[1]["status"], NO_RESOURCE);
}

#[tokio::test]
async fn tagging_endpoint_404_is_not_reported_as_missing_device() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    mount_search(&server, "web01", json!([device("r-1", "web01", "Acme Inc", "c-7")])).await;
    Mock::given(method("POST"))
        .and(path("/opsql/api/v3/tenants/c-7/queries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": "tag-1", "name": "Patch Window"}],
            "nextPage": false
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/tenants/c-7/tags/tag-1/values"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"uniqueId": "val-3", "value": "Sunday 02:00"}],
            "nextPage": false
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v3/tenants/c-7/tags/tag-1/values/val-3/tagged-entities"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let request = TagRequest {
        tag: "Patch Window".into(),
        value: "Sunday 02:00".into(),
        policy: ClearPolicy::OnConflict,
    };
    let records = tagging::run(&client, "msp-1", &[row(2, "web01", None)], &request).await;

    assert_eq!(records[0]["resource_id"], "r-1");
    let status = records[0]["status"].as_str().unwrap();
    assert_ne!(status, NO_RESOURCE);
    assert!(status.starts_with("Error - not found: tag-1 Tag with val-3 Value"), "got {status}");
}

// ── Membership ─────────────────────────────────────────────────────────

#[tokio::test]
async fn membership_updates_the_config_once_for_the_batch() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    mount_search(&server, "web01", json!([device("r-1", "web01", "Acme", "c-7")])).await;
    mount_search(&server, "ghost", json!([])).await;
    mount_search(&server, "web02", json!([device("r-2", "web02", "Acme", "c-7")])).await;

    let config_path = "/api/v2/tenants/c-7/patches/configurations/pc-1";
    Mock::given(method("GET"))
        .and(path(config_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "patchConfigName": "ACME-PROD-W-DA",
            "scheduleJob": {"entities": [{"resource": {"id": "r-2", "type": "DEVICE"}}]}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(config_path))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let target = Target::PatchConfig {
        tenant: "c-7".into(),
        config_id: "pc-1".into(),
    };
    let rows = [
        row(2, "web01", None),
        row(3, "ghost", None),
        row(4, "web02", None),
    ];
    let records = membership::run(&client, "msp-1", &rows, &target).await;

    let statuses: Vec<&str> = records.iter().map(|r| r["status"].as_str().unwrap()).collect();
    assert_eq!(
        statuses,
        vec![membership::ADDED, NO_RESOURCE, membership::ALREADY_MEMBER]
    );
    let servers: Vec<&str> = records
        .iter()
        .map(|r| r["server_name"].as_str().unwrap())
        .collect();
    assert_eq!(servers, vec!["web01", "ghost", "web02"]);
}

#[tokio::test]
async fn membership_group_failure_marks_every_resolved_row() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    mount_search(&server, "web01", json!([device("r-1", "web01", "Acme", "c-7")])).await;
    mount_search(&server, "web02", json!([device("r-2", "web02", "Acme", "c-7")])).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/tenants/c-7/patches/configurations/pc-404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let target = Target::PatchConfig {
        tenant: "c-7".into(),
        config_id: "pc-404".into(),
    };
    let rows = [row(2, "web01", None), row(3, "web02", None)];
    let records = membership::run(&client, "msp-1", &rows, &target).await;

    assert_eq!(records.len(), 2);
    for record in &records {
        let status = record["status"].as_str().unwrap();
        assert!(status.starts_with("Error - "), "got {status}");
        assert_eq!(record["target"], "patch configuration pc-404");
    }
}

#[tokio::test]
async fn membership_by_convention_finds_config_by_derived_name() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    mount_search(
        &server,
        "PDAWACME01X",
        json!([device("r-1", "PDAWACME01X", "Acme Inc", "c-7")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/tenants/msp-1/clients/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7,
            "uniqueId": "c-7",
            "name": "Acme (Managed Services)"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/tenants/c-7/patches/configurations/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"id": "pc-1", "patchConfigName": "ACME-DEV-W-DA"},
                {"id": "pc-2", "patchConfigName": "acme-prod-w-da"}
            ],
            "nextPage": false
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/tenants/c-7/patches/configurations/pc-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "patchConfigName": "acme-prod-w-da",
            "scheduleJob": {"entities": []}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/tenants/c-7/patches/configurations/pc-2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let records = membership::run(
        &client,
        "msp-1",
        &[row(2, "PDAWACME01X", None)],
        &Target::PatchConvention,
    )
    .await;

    assert_eq!(records[0]["status"], membership::ADDED);
    assert_eq!(records[0]["target"], "ACME-PROD-W-DA");
}

// ── Input and output ───────────────────────────────────────────────────

#[tokio::test]
async fn csv_input_to_json_report() {
    let server = MockServer::start().await;
    let client = mock_client(&server);
    mount_search(&server, "web01", json!([device("r-1", "web01", "Acme", "c-7")])).await;

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("servers.csv");
    std::fs::write(&input, "Server Name,Client Name\nweb01,Acme\n,\n").unwrap();

    let rows = read_rows(&input, &InputColumns::default()).unwrap();
    assert_eq!(rows.len(), 1);

    let records = lookup::run(&client, "msp-1", &rows).await;
    let output = dir.path().join("report.json");
    write_records(&records, OutputFormat::Json, &output, "root").unwrap();

    let written: Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(written[0]["Host Name"], "web01");
    assert_eq!(written[0]["Lookup Status"], "Found");
}
