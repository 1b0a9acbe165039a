//! OpsQL object queries and client (tenant) lookups.
//!
//! These run against the partner tenant the client was configured with,
//! not against an individual client tenant.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::OpsRampClient;
use crate::error::Result;
use crate::page::collect_pages;
use crate::resources::string_or_number;

/// Body of `POST opsql/api/v3/tenants/{tenant}/queries`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectQuery<'a> {
    /// Object type, e.g. `"resource"`, `"tag"`, `"alert"`.
    pub object_type: &'a str,
    /// Fields to project.
    pub fields: &'a [&'a str],
    /// OpsQL filter expression, e.g. `agentInstalled = "true"`.
    pub filter_criteria: &'a str,
}

/// A client (customer tenant) as returned by the clients endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Numeric or string client id, kept as text.
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    /// Client tenant id.
    #[serde(default)]
    pub unique_id: Option<String>,
    /// Display name, e.g. `"ACME (Acme Corporation)"`.
    #[serde(default)]
    pub name: Option<String>,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClientInfo {
    /// The part of the display name before any parenthesis, trimmed.
    pub fn short_name(&self) -> &str {
        self.name
            .as_deref()
            .unwrap_or_default()
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
    }
}

/// Runs an OpsQL query and returns the raw response document.
pub async fn query_objects(
    client: &OpsRampClient,
    tenant: &str,
    query: &ObjectQuery<'_>,
) -> Result<Value> {
    let path = format!("opsql/api/v3/tenants/{tenant}/queries");
    client
        .post_json(&path, query, query.filter_criteria)
        .await
}

/// Details of one client of `tenant`.
pub async fn client_details(
    client: &OpsRampClient,
    tenant: &str,
    client_id: &str,
) -> Result<ClientInfo> {
    let path = format!("api/v2/tenants/{tenant}/clients/{client_id}");
    client.get_json(&path, client_id).await
}

/// Every client of `tenant`.
pub async fn list_clients(client: &OpsRampClient, tenant: &str) -> Result<Vec<ClientInfo>> {
    collect_pages("Clients", move |page_no| {
        let path = format!("api/v2/tenants/{tenant}/clients/search?pageNo={page_no}");
        client.get_page(path, format!("All Clients on Page {page_no}"))
    })
    .await
}
