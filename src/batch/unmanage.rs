//! Decommission driver: unmanage every listed device.
//!
//! Decommissioned hosts are usually down, so the agent/state eligibility
//! filter is not applied here. Multiple hits are still narrowed by client
//! name, and the first survivor is unmanaged in its own client tenant.

use serde_json::Value;

use super::{NO_RESOURCE, NOT_AVAILABLE, Record, SheetRow, lookup_status, text_or_na};
use crate::client::OpsRampClient;
use crate::error::{OpsRampError, Result};
use crate::resolve;
use crate::resources::{self, Resource};

/// Root element for XML reports of this driver.
pub const XML_ROOT: &str = "UnmanagedServers";

/// Status of a successful unmanage.
pub const UNMANAGED: &str = "Server is Unmanaged from OpsRamp";

/// Status of an unmanage the API rejected.
pub const UNMANAGE_FAILED: &str = "Failed to Unmanage the server from OpsRamp";

fn record(
    server_name: &str,
    resource: Option<&Resource>,
    client_name: Option<&str>,
    status: &str,
) -> Record {
    let client = resource.and_then(|r| r.client.as_ref());
    let mut record = Record::new();
    record.insert("server_name".into(), Value::String(server_name.to_string()));
    record.insert(
        "client_name".into(),
        text_or_na(client.and_then(|c| c.name.as_deref()).or(client_name)),
    );
    record.insert(
        "client_id".into(),
        text_or_na(client.and_then(|c| c.id.as_deref())),
    );
    record.insert(
        "unique_id".into(),
        text_or_na(client.and_then(|c| c.unique_id.as_deref())),
    );
    record.insert(
        "ip_address".into(),
        text_or_na(resource.and_then(|r| r.ip_address.as_deref())),
    );
    record.insert("status".into(), Value::String(status.to_string()));
    record
}

async fn unmanage_row(client: &OpsRampClient, tenant: &str, row: &SheetRow) -> Result<Record> {
    let mut entries =
        resources::search(client, tenant, &[("name", row.server_name.as_str())]).await?;
    entries.retain(|r| !r.id.is_empty());
    if entries.is_empty() {
        log::warn!("No results found for server: {}", row.server_name);
        return Ok(record(&row.server_name, None, row.client_name.as_deref(), NO_RESOURCE));
    }

    let Some(resource) = resolve::disambiguate(entries, row.client_name.as_deref())
        .into_iter()
        .next()
    else {
        log::warn!(
            "No entries found for client '{}' for server {}.",
            row.client_name.as_deref().unwrap_or(NOT_AVAILABLE),
            row.server_name
        );
        return Ok(record(&row.server_name, None, row.client_name.as_deref(), NO_RESOURCE));
    };

    let client_tenant = resource.client_unique_id().ok_or_else(|| {
        OpsRampError::UnexpectedResponse {
            label: format!("{} Resource", row.server_name),
            detail: "resource carries no client uniqueId".to_string(),
        }
    })?;

    let reply = resources::unmanage(client, client_tenant, &resource.id).await?;
    let status = if reply.is_success() {
        UNMANAGED
    } else {
        UNMANAGE_FAILED
    };
    log::info!("{}: {status}", row.server_name);
    Ok(record(&row.server_name, Some(&resource), row.client_name.as_deref(), status))
}

/// Unmanages each row's device, searching `tenant`. One record per row.
pub async fn run(client: &OpsRampClient, tenant: &str, rows: &[SheetRow]) -> Vec<Record> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        match unmanage_row(client, tenant, row).await {
            Ok(record) => records.push(record),
            Err(e) => {
                log::error!("Error processing server {}: {e}", row.server_name);
                records.push(record(
                    &row.server_name,
                    None,
                    row.client_name.as_deref(),
                    &lookup_status(&e),
                ));
            }
        }
    }
    records
}
