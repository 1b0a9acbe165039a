//! Tagging driver: force-assign one tag value to every listed device.

use serde_json::Value;

use super::{Record, SheetRow, error_status, lookup_status, text_or_na};
use crate::client::OpsRampClient;
use crate::resolve;
use crate::tags::{self, Assignment, ClearPolicy};

/// Tag and value applied to every row.
#[derive(Debug, Clone)]
pub struct TagRequest {
    /// Tag name, matched case and punctuation insensitively.
    pub tag: String,
    /// Value name under the tag.
    pub value: String,
    /// Whether prior values are cleared up front or only on conflict.
    pub policy: ClearPolicy,
}

/// Status of an assignment that went through first time.
pub const ASSIGNED: &str = "Tag assigned";

/// Status of an assignment that needed the previous value cleared.
pub const REASSIGNED: &str = "Tag assigned after clearing previous value";

fn status_for(assignment: &Assignment) -> &'static str {
    if assignment.cleared {
        REASSIGNED
    } else {
        ASSIGNED
    }
}

fn record(
    row: &SheetRow,
    resource_id: Option<&str>,
    request: &TagRequest,
    status: String,
) -> Record {
    let mut record = Record::new();
    record.insert("server_name".into(), Value::String(row.server_name.clone()));
    record.insert("client_name".into(), text_or_na(row.client_name.as_deref()));
    record.insert("resource_id".into(), text_or_na(resource_id));
    record.insert("tag".into(), Value::String(request.tag.clone()));
    record.insert("value".into(), Value::String(request.value.clone()));
    record.insert("status".into(), Value::String(status));
    record
}

/// Resolves each row in `tenant` and assigns the tag value in the device's
/// own client tenant (falling back to `tenant` when the device carries no
/// client id).
pub async fn run(
    client: &OpsRampClient,
    tenant: &str,
    rows: &[SheetRow],
    request: &TagRequest,
) -> Vec<Record> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let client_name = row.client_name.as_deref();
        let resource = match resolve::resolve_device(client, tenant, &row.server_name, client_name)
            .await
        {
            Ok(resource) => resource,
            Err(e) => {
                log::error!("Error resolving server {}: {e}", row.server_name);
                records.push(record(row, None, request, lookup_status(&e)));
                continue;
            }
        };

        let tag_tenant = resource.client_unique_id().unwrap_or(tenant);
        let ids = [resource.id.clone()];
        let status = match tags::force_assign_tag_value(
            client,
            tag_tenant,
            &ids,
            &request.tag,
            &request.value,
            request.policy,
        )
        .await
        {
            Ok(assignment) => {
                log::info!(
                    "{}: {} : {} assigned",
                    row.server_name,
                    request.tag,
                    request.value
                );
                status_for(&assignment).to_string()
            }
            Err(e) => {
                log::error!("Error tagging server {}: {e}", row.server_name);
                error_status(&e)
            }
        };
        records.push(record(row, Some(&resource.id), request, status));
    }
    records
}
