//! Management profiles (gateway/collector bindings) of devices.

use serde_json::{Value, json};

use crate::client::{OpsRampClient, Reply};
use crate::error::Result;

/// Every management profile of `tenant`.
pub async fn list(client: &OpsRampClient, tenant: &str) -> Result<Value> {
    let path = format!("api/v2/tenants/{tenant}/managementProfiles/search");
    client
        .get_json(&path, &format!("{tenant} All Management Profiles"))
        .await
}

/// Binds a device to the management profile named `profile`.
pub async fn set_for_resource(
    client: &OpsRampClient,
    tenant: &str,
    resource_id: &str,
    profile: &str,
) -> Result<Reply> {
    let path = format!("api/v2/tenants/{tenant}/resources/{resource_id}");
    client
        .post(
            &path,
            &json!({ "managementProfile": profile }),
            &format!("{resource_id} mapping with {profile}"),
        )
        .await
}
