//! Credential sets (SSH/WMI/SNMP logins) and their device assignments.

use serde::Serialize;
use serde_json::Value;

use crate::client::{OpsRampClient, Reply};
use crate::error::Result;

/// Body of the credential-set assignment call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignDevices {
    /// Devices to attach.
    pub assigned_devices: Vec<DeviceId>,
}

/// `{"uniqueId": ...}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceId {
    /// Resource id.
    pub unique_id: String,
}

/// Every credential set of `tenant`.
pub async fn list(client: &OpsRampClient, tenant: &str) -> Result<Value> {
    let path = format!("api/v2/tenants/{tenant}/credentialSets");
    client
        .get_json(&path, &format!("{tenant} Credential sets"))
        .await
}

/// Credential sets attached to one device.
pub async fn for_resource(
    client: &OpsRampClient,
    tenant: &str,
    resource_id: &str,
) -> Result<Value> {
    let path = format!("api/v2/tenants/{tenant}/devices/{resource_id}/credentialSets/minimal");
    client
        .get_json(&path, &format!("{resource_id} Credential sets"))
        .await
}

/// Attaches a credential set to a device.
pub async fn assign(
    client: &OpsRampClient,
    tenant: &str,
    credential_set_id: &str,
    resource_id: &str,
) -> Result<Reply> {
    let path = format!("api/v2/tenants/{tenant}/credentialSets/{credential_set_id}");
    let body = AssignDevices {
        assigned_devices: vec![DeviceId {
            unique_id: resource_id.to_string(),
        }],
    };
    client
        .post(&path, &body, &format!("{resource_id} Credential sets"))
        .await
}
