//! Patch configurations: scheduled patch-install groups of devices.
//!
//! Updates re-post the whole configuration document, so membership changes
//! fetch the current document, edit `scheduleJob.entities` in place, reset
//! the schedule anchor and post it back. Fields this crate does not model
//! survive the round trip untouched.

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::client::OpsRampClient;
use crate::error::{OpsRampError, Result};
use crate::groups::{self, AddOutcome, EntityRef};
use crate::page::collect_pages;
use crate::query;
use crate::resources::string_or_number;

/// Fixed schedule anchor written on create and on every update.
pub const SCHEDULE_ANCHOR: &str = "2024-04-14T10:10:10+0000";

/// Marker appended to descriptions of configurations this crate creates.
pub const CREATED_MARKER: &str = "Don't Remove : 'Created By Script'";

/// Summary row from the configuration search endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchConfigSummary {
    /// Configuration id.
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    /// Configuration name.
    #[serde(default)]
    pub patch_config_name: Option<String>,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn base(tenant: &str) -> String {
    format!("api/v2/tenants/{tenant}/patches/configurations")
}

/// Every patch configuration in `tenant`.
pub async fn list(client: &OpsRampClient, tenant: &str) -> Result<Vec<PatchConfigSummary>> {
    let base = base(tenant);
    collect_pages("Patch configurations", move |page_no| {
        let path = format!("{base}/search?pageNo={page_no}");
        let label = format!("{tenant} All Patch Configuration groups on {page_no}");
        client.get_page(path, label)
    })
    .await
}

/// The full configuration document.
pub async fn details(client: &OpsRampClient, tenant: &str, config_id: &str) -> Result<Value> {
    let path = format!("{}/{config_id}", base(tenant));
    client
        .get_json(&path, &format!("{config_id} Detailed Patch Config"))
        .await
}

/// Document posted by [`create`].
pub fn new_config_document(name: &str, maintenance_period: Value, entity_ids: &[String]) -> Value {
    let entities: Vec<EntityRef> = entity_ids.iter().map(EntityRef::device).collect();
    json!({
        "patchConfigName": name,
        "description": format!("{name}\n{CREATED_MARKER}"),
        "approvalType": { "approvalType": 0 },
        "rebootOptions": { "rebootRequired": true, "mandatoryReboot": false },
        "scheduleJob": {
            "entities": entities,
            "script": { "jobType": "missingPatchesDownloadUpdate" },
            "schedule": {
                "startDate": SCHEDULE_ANCHOR,
                "pattern": { "type": "never" }
            }
        },
        "enablePatching": true,
        "maintenancePeriod": maintenance_period,
    })
}

/// Creates a configuration with the given members and maintenance window.
pub async fn create(
    client: &OpsRampClient,
    tenant: &str,
    name: &str,
    maintenance_period: Value,
    entity_ids: &[String],
) -> Result<Value> {
    let doc = new_config_document(name, maintenance_period, entity_ids);
    let reply = client
        .post(
            &base(tenant),
            &doc,
            &format!("{name} new Patching Group with {} entities", entity_ids.len()),
        )
        .await?;
    Ok(reply.into_result()?.unwrap_or(Value::Null))
}

fn entities_of(doc: &Value) -> Vec<Value> {
    doc.pointer("/scheduleJob/entities")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

// Writes the entity list back and resets the schedule anchor.
fn rewrite(doc: &mut Value, entities: Vec<Value>, label: &str) -> Result<()> {
    let schedule_job = groups::object_mut(doc, "scheduleJob", label)?;
    schedule_job.insert("entities".to_string(), Value::Array(entities));

    let anchor = Value::String(SCHEDULE_ANCHOR.to_string());
    let schedule = schedule_job
        .entry("schedule")
        .or_insert_with(|| Value::Object(Map::new()));
    match schedule.as_object_mut() {
        Some(map) => {
            map.insert("startDate".to_string(), anchor);
        }
        None => *schedule = json!({ "startDate": anchor }),
    }
    Ok(())
}

fn config_name(doc: &Value) -> &str {
    doc.get("patchConfigName")
        .and_then(Value::as_str)
        .unwrap_or("patch configuration")
}

/// Adds devices to a configuration, skipping current members.
///
/// Issues one GET and, unless every id is already a member, exactly one
/// POST carrying the merged member list.
pub async fn add_resources(
    client: &OpsRampClient,
    tenant: &str,
    config_id: &str,
    entity_ids: &[String],
) -> Result<AddOutcome> {
    let mut doc = details(client, tenant, config_id).await?;
    let merge = groups::merge_members(&entities_of(&doc), entity_ids);
    let outcome = AddOutcome::from(&merge);
    if merge.is_noop() {
        log::info!("All requested entities are already in {}", config_name(&doc));
        return Ok(outcome);
    }

    let label = format!("{} Patching Group updated", config_name(&doc));
    rewrite(&mut doc, merge.merged, &label)?;
    let path = format!("{}/{config_id}", base(tenant));
    client.post(&path, &doc, &label).await?.into_result()?;
    Ok(outcome)
}

/// Removes devices from a configuration. Returns the ids actually removed;
/// nothing is posted when none of them were members.
pub async fn remove_resources(
    client: &OpsRampClient,
    tenant: &str,
    config_id: &str,
    entity_ids: &[String],
) -> Result<Vec<String>> {
    let mut doc = details(client, tenant, config_id).await?;
    let (kept, removed) = groups::remove_members(&entities_of(&doc), entity_ids);
    if removed.is_empty() {
        return Ok(removed);
    }

    let label = format!("{} Patching Group removing resources", config_name(&doc));
    rewrite(&mut doc, kept, &label)?;
    let path = format!("{}/{config_id}", base(tenant));
    client.post(&path, &doc, &label).await?.into_result()?;
    Ok(removed)
}

/// Patch install status of one device.
pub async fn install_status(
    client: &OpsRampClient,
    tenant: &str,
    resource_id: &str,
) -> Result<Value> {
    let path = format!("api/v2/tenants/{tenant}/resources/{resource_id}/patches/install/status");
    client
        .get_json(&path, &format!("Patch Install Status for {resource_id}"))
        .await
}

/// Patch scan status of one device.
pub async fn scan_status(client: &OpsRampClient, tenant: &str, resource_id: &str) -> Result<Value> {
    let path = format!("api/v2/tenants/{tenant}/resources/{resource_id}/patches/scan/status");
    client
        .get_json(&path, &format!("Patch Scan Status for {resource_id}"))
        .await
}

// ── Naming convention ──────────────────────────────────────────────────

fn environment(code: char) -> Option<&'static str> {
    Some(match code {
        'P' => "PROD",
        'D' => "DEV",
        'U' => "UAT",
        'F' => "DR",
        'Q' => "QA",
        'S' => "STG",
        _ => return None,
    })
}

/// Derives a configuration name `CLIENT-ENV-OS-LOC[_LOC...]` from server
/// names following the corporate convention: character 1 is the
/// environment, 2..3 the location and 4 the OS.
///
/// # Errors
///
/// `OpsRampError::Input` when a name is too short, has 9 or 10 characters,
/// carries an unknown environment code, or the servers disagree on
/// environment or OS.
pub fn derive_group_name(servers: &[&str], client_display_name: &str) -> Result<String> {
    let invalid: Vec<&str> = servers
        .iter()
        .copied()
        .filter(|s| {
            let len = s.chars().count();
            len < 4 || (9..=10).contains(&len)
        })
        .collect();
    if !invalid.is_empty() || servers.is_empty() {
        return Err(naming_error(format!("invalid server names: {invalid:?}")));
    }

    let mut envs = Vec::new();
    let mut locations = Vec::new();
    let mut systems = Vec::new();
    for server in servers {
        let prefix: Vec<char> = server.to_uppercase().chars().take(8).collect();
        if prefix.len() < 4 {
            return Err(naming_error(format!("invalid server name: {server}")));
        }
        push_unique(&mut envs, prefix[0].to_string());
        push_unique(&mut locations, prefix[1..3].iter().collect());
        push_unique(&mut systems, prefix[3].to_string());
    }
    if envs.len() > 1 || systems.len() > 1 {
        return Err(naming_error(format!(
            "servers disagree: environments {envs:?}, operating systems {systems:?}"
        )));
    }
    locations.sort();

    let env_code = envs[0].chars().next().unwrap_or_default();
    let env = environment(env_code)
        .ok_or_else(|| naming_error(format!("unknown environment code '{env_code}'")))?;
    let client_name = client_display_name
        .split('(')
        .next()
        .unwrap_or_default()
        .trim()
        .to_uppercase();

    Ok(format!("{client_name}-{env}-{}-{}", systems[0], locations.join("_")))
}

/// Like [`derive_group_name`], reading the client display name from
/// `partner_tenant`'s client record.
pub async fn group_name_for_client(
    client: &OpsRampClient,
    partner_tenant: &str,
    client_id: &str,
    servers: &[&str],
) -> Result<String> {
    let info = query::client_details(client, partner_tenant, client_id).await?;
    derive_group_name(servers, info.short_name())
}

fn push_unique(values: &mut Vec<String>, value: String) {
    if !values.contains(&value) {
        values.push(value);
    }
}

fn naming_error(message: String) -> OpsRampError {
    OpsRampError::Input {
        message,
        source: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn new_document_has_anchor_and_members() {
        let doc = new_config_document("ACME-PROD-W-DA", json!({"duration": 4}), &ids(&["r1"]));
        assert_eq!(doc["scheduleJob"]["schedule"]["startDate"], SCHEDULE_ANCHOR);
        assert_eq!(
            doc["scheduleJob"]["entities"],
            json!([{"resource": {"id": "r1", "type": "DEVICE"}}])
        );
        assert!(doc["description"].as_str().unwrap().ends_with(CREATED_MARKER));
        assert_eq!(doc["maintenancePeriod"], json!({"duration": 4}));
    }

    #[test]
    fn rewrite_resets_anchor_and_keeps_other_fields() {
        let mut doc = json!({
            "patchConfigName": "G1",
            "scheduleJob": {
                "script": {"jobType": "missingPatchesDownloadUpdate"},
                "schedule": {"startDate": "2025-01-01T00:00:00+0000", "pattern": {"type": "never"}}
            }
        });
        rewrite(&mut doc, vec![json!({"resource": {"id": "x", "type": "DEVICE"}})], "G1").unwrap();
        assert_eq!(doc["scheduleJob"]["schedule"]["startDate"], SCHEDULE_ANCHOR);
        assert_eq!(doc["scheduleJob"]["schedule"]["pattern"]["type"], "never");
        assert_eq!(doc["scheduleJob"]["script"]["jobType"], "missingPatchesDownloadUpdate");
        assert_eq!(entities_of(&doc).len(), 1);
    }

    #[test]
    fn rewrite_builds_missing_schedule_job() {
        let mut doc = json!({"patchConfigName": "G2"});
        rewrite(&mut doc, vec![], "G2").unwrap();
        assert_eq!(doc["scheduleJob"]["schedule"]["startDate"], SCHEDULE_ANCHOR);
        assert!(rewrite(&mut json!([1]), vec![], "bad").is_err());
    }

    #[test]
    fn group_name_follows_convention() {
        let name = derive_group_name(&["PDAWACME01X", "pnyWacme02x"], "Acme (Acme Corp)").unwrap();
        assert_eq!(name, "ACME-PROD-W-DA_NY");
    }

    #[test]
    fn group_name_rejects_bad_input() {
        assert!(derive_group_name(&["PDAWAC001"], "Acme").is_err());
        assert!(derive_group_name(&["PDAWACME01X", "UDAWACME01X"], "Acme").is_err());
        assert!(derive_group_name(&["PDAWACME01X", "PDALACME01X"], "Acme").is_err());
        assert!(derive_group_name(&["XDAWACME01X"], "Acme").is_err());
        assert!(derive_group_name(&[], "Acme").is_err());
    }
}
