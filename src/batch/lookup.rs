//! Device inventory report.
//!
//! Resolves each row to one device and flattens it into an inventory
//! record: identity first, then a fixed list of device fields, cloud
//! attributes, ownership, classification and finally the tag map.

use serde_json::{Map, Value};

use super::{NOT_AVAILABLE, Record, SheetRow, lookup_status, text_or_na};
use crate::client::OpsRampClient;
use crate::resolve;
use crate::resources::{Resource, ServerType};

/// Device fields copied verbatim, `"N/A"` when absent.
pub const DEVICE_FIELDS: &[&str] = &[
    "ipAddress",
    "dns",
    "dnsName",
    "classCode",
    "macAddress",
    "deviceType",
    "serialNumber",
    "status",
    "osName",
    "make",
    "model",
    "manufacturer",
    "osArchitecture",
    "agentInstalled",
    "agentInstalledTime",
    "agentVersion",
    "type",
    "delete",
];

/// Keys read from the resource's `attributes`.
pub const ATTRIBUTE_FIELDS: &[&str] = &["accountNumber", "accountName", "instanceId"];

/// Outcome key. `status` already holds the device availability.
pub const LOOKUP_STATUS: &str = "Lookup Status";

/// Status of rows that resolved to a device.
pub const FOUND: &str = "Found";

/// Inventory record for one resolved device.
pub fn inventory_record(resource: &Resource) -> Record {
    let mut record = Record::new();
    record.insert("Host Name".into(), text_or_na(resource.display_host()));
    record.insert("Name".into(), text_or_na(resource.name.as_deref()));

    for field in DEVICE_FIELDS {
        let value = resource
            .field(field)
            .unwrap_or_else(|| Value::String(NOT_AVAILABLE.into()));
        record.insert((*field).to_string(), value);
    }

    for attr in ATTRIBUTE_FIELDS {
        let value = resource
            .attributes
            .as_ref()
            .and_then(|a| a.get(*attr))
            .cloned()
            .unwrap_or_else(|| Value::String(NOT_AVAILABLE.into()));
        record.insert((*attr).to_string(), value);
    }

    let client = resource.client.as_ref();
    record.insert(
        "Client Name".into(),
        text_or_na(client.and_then(|c| c.name.as_deref())),
    );
    record.insert(
        "Client ID".into(),
        text_or_na(client.and_then(|c| c.id.as_deref())),
    );
    record.insert(
        "Client UniqueID".into(),
        text_or_na(client.and_then(|c| c.unique_id.as_deref())),
    );
    record.insert(
        "Location".into(),
        text_or_na(resource.location.as_ref().and_then(|l| l.name.as_deref())),
    );
    record.insert(
        "Physical".into(),
        Value::Bool(resource.is_physical.unwrap_or(false)),
    );
    record.insert(
        "Server Type".into(),
        Value::String(ServerType::classify(resource).to_string()),
    );

    let tags: Map<String, Value> = resource
        .tags
        .iter()
        .map(|tag| (tag.name.clone(), text_or_na(tag.value.as_deref())))
        .collect();
    record.insert("Tags".into(), Value::Object(tags));
    record.insert(LOOKUP_STATUS.into(), Value::String(FOUND.into()));
    record
}

fn failure_record(row: &SheetRow, status: String) -> Record {
    let mut record = Record::new();
    record.insert("Host Name".into(), Value::String(row.server_name.clone()));
    record.insert("Client Name".into(), text_or_na(row.client_name.as_deref()));
    record.insert(LOOKUP_STATUS.into(), Value::String(status));
    record
}

/// One inventory record per row, searching `tenant`.
pub async fn run(client: &OpsRampClient, tenant: &str, rows: &[SheetRow]) -> Vec<Record> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let resolved =
            resolve::resolve_device(client, tenant, &row.server_name, row.client_name.as_deref())
                .await;
        match resolved {
            Ok(resource) => {
                log::info!("{} Resource fetched successfully", row.server_name);
                records.push(inventory_record(&resource));
            }
            Err(e) => {
                log::error!("Error fetching resources for server {}: {e}", row.server_name);
                records.push(failure_record(row, lookup_status(&e)));
            }
        }
    }
    records
}
