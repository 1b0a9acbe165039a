//! Membership driver: add resolved devices to a patch configuration or a
//! job.
//!
//! Rows are resolved first; the group call then runs once per target with
//! every resolved id, so a configuration is fetched and re-posted once per
//! batch rather than once per row. Each row's status reflects what happened
//! to its own id.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use super::{Record, SheetRow, lookup_status, text_or_na};
use crate::client::OpsRampClient;
use crate::error::{OpsRampError, Result};
use crate::groups::AddOutcome;
use crate::jobs;
use crate::patch_config;
use crate::resolve;
use crate::resources::Resource;

/// Where resolved devices go.
#[derive(Debug, Clone)]
pub enum Target {
    /// A patch configuration by id.
    PatchConfig {
        /// Tenant owning the configuration.
        tenant: String,
        /// Configuration id.
        config_id: String,
    },
    /// A job by id, refusing devices another job of `job_type` holds.
    Job {
        /// Tenant owning the job.
        tenant: String,
        /// Job id.
        job_id: String,
        /// Job type checked for conflicting membership.
        job_type: String,
    },
    /// Per client, the patch configuration whose name follows the server
    /// naming convention (see [`patch_config::derive_group_name`]).
    PatchConvention,
}

/// Status of an id the call added.
pub const ADDED: &str = "Added";
/// Status of an id that was already a member.
pub const ALREADY_MEMBER: &str = "Already a member";
/// Status of an id another job of the same type holds.
pub const HELD_BY_OTHER_JOB: &str = "Already in another job of the same type";

struct Resolved<'a> {
    slot: usize,
    row: &'a SheetRow,
    resource: Resource,
}

fn record(row: &SheetRow, resource_id: Option<&str>, target: &str, status: String) -> Record {
    let mut record = Record::new();
    record.insert("server_name".into(), Value::String(row.server_name.clone()));
    record.insert("client_name".into(), text_or_na(row.client_name.as_deref()));
    record.insert("resource_id".into(), text_or_na(resource_id));
    record.insert("target".into(), Value::String(target.to_string()));
    record.insert("status".into(), Value::String(status));
    record
}

/// Per-id statuses for a patch configuration add.
pub fn patch_statuses(outcome: &AddOutcome, requested: &[String]) -> HashMap<String, &'static str> {
    match outcome {
        AddOutcome::AlreadyMembers => requested
            .iter()
            .map(|id| (id.clone(), ALREADY_MEMBER))
            .collect(),
        AddOutcome::Updated {
            added,
            already_present,
        } => added
            .iter()
            .map(|id| (id.clone(), ADDED))
            .chain(already_present.iter().map(|id| (id.clone(), ALREADY_MEMBER)))
            .collect(),
    }
}

/// Per-id statuses for a safe job add.
pub fn job_statuses(report: &jobs::SafeAddReport) -> HashMap<String, &'static str> {
    report
        .added
        .iter()
        .map(|id| (id.clone(), ADDED))
        .chain(report.already_in_job.iter().map(|id| (id.clone(), ALREADY_MEMBER)))
        .chain(report.conflicts.iter().map(|id| (id.clone(), HELD_BY_OTHER_JOB)))
        .collect()
}

async fn add_to_patch_config(
    client: &OpsRampClient,
    tenant: &str,
    config_id: &str,
    ids: &[String],
) -> Result<HashMap<String, &'static str>> {
    let outcome = patch_config::add_resources(client, tenant, config_id, ids).await?;
    Ok(patch_statuses(&outcome, ids))
}

async fn find_config_id(client: &OpsRampClient, tenant: &str, name: &str) -> Result<String> {
    patch_config::list(client, tenant)
        .await?
        .into_iter()
        .find(|c| {
            c.patch_config_name
                .as_deref()
                .is_some_and(|n| n.trim().eq_ignore_ascii_case(name))
        })
        .and_then(|c| c.id)
        .ok_or_else(|| OpsRampError::NotFound {
            what: format!("patch configuration named {name}"),
        })
}

// Applies one group call and writes a record for each member of `batch`.
fn settle(
    outcomes: &mut [Option<Record>],
    batch: &[&Resolved<'_>],
    target: &str,
    result: Result<HashMap<String, &'static str>>,
) {
    match result {
        Ok(statuses) => {
            for entry in batch {
                let status = statuses
                    .get(&entry.resource.id)
                    .copied()
                    .unwrap_or(ALREADY_MEMBER);
                log::info!("{}: {status} ({target})", entry.row.server_name);
                outcomes[entry.slot] = Some(record(
                    entry.row,
                    Some(&entry.resource.id),
                    target,
                    status.to_string(),
                ));
            }
        }
        Err(e) => {
            log::error!("Error updating {target}: {e}");
            for entry in batch {
                outcomes[entry.slot] = Some(record(
                    entry.row,
                    Some(&entry.resource.id),
                    target,
                    format!("Error - {e}"),
                ));
            }
        }
    }
}

async fn run_convention(
    client: &OpsRampClient,
    tenant: &str,
    resolved: &[Resolved<'_>],
    outcomes: &mut [Option<Record>],
) {
    let mut by_client: BTreeMap<(String, String), Vec<&Resolved<'_>>> = BTreeMap::new();
    for entry in resolved {
        let client_ref = entry.resource.client.as_ref();
        let ids = client_ref.and_then(|c| c.id.clone().zip(c.unique_id.clone()));
        match ids {
            Some(key) => by_client.entry(key).or_default().push(entry),
            None => {
                outcomes[entry.slot] = Some(record(
                    entry.row,
                    Some(&entry.resource.id),
                    "patch configuration",
                    "Error - resource carries no client id".to_string(),
                ));
            }
        }
    }

    for ((client_id, client_tenant), batch) in by_client {
        let servers: Vec<&str> = batch.iter().map(|e| e.row.server_name.as_str()).collect();
        let name = match patch_config::group_name_for_client(client, tenant, &client_id, &servers)
            .await
        {
            Ok(name) => name,
            Err(e) => {
                log::error!("Cannot derive a patch configuration name for {servers:?}: {e}");
                settle(outcomes, &batch, "patch configuration", Err(e));
                continue;
            }
        };

        let ids: Vec<String> = batch.iter().map(|e| e.resource.id.clone()).collect();
        let result = match find_config_id(client, &client_tenant, &name).await {
            Ok(config_id) => add_to_patch_config(client, &client_tenant, &config_id, &ids).await,
            Err(e) => Err(e),
        };
        settle(outcomes, &batch, &name, result);
    }
}

/// Resolves each row in `tenant` and adds the devices to `target`. One
/// record per row, in row order.
pub async fn run(
    client: &OpsRampClient,
    tenant: &str,
    rows: &[SheetRow],
    target: &Target,
) -> Vec<Record> {
    let label = match target {
        Target::PatchConfig { config_id, .. } => format!("patch configuration {config_id}"),
        Target::Job { job_id, .. } => format!("job {job_id}"),
        Target::PatchConvention => "patch configuration".to_string(),
    };

    let mut outcomes: Vec<Option<Record>> = vec![None; rows.len()];
    let mut resolved = Vec::new();
    for (slot, row) in rows.iter().enumerate() {
        match resolve::resolve_device(client, tenant, &row.server_name, row.client_name.as_deref())
            .await
        {
            Ok(resource) => resolved.push(Resolved {
                slot,
                row,
                resource,
            }),
            Err(e) => {
                log::error!("Error resolving server {}: {e}", row.server_name);
                outcomes[slot] = Some(record(row, None, &label, lookup_status(&e)));
            }
        }
    }

    if !resolved.is_empty() {
        let batch: Vec<&Resolved<'_>> = resolved.iter().collect();
        let ids: Vec<String> = resolved.iter().map(|e| e.resource.id.clone()).collect();
        match target {
            Target::PatchConfig { tenant, config_id } => {
                let result = add_to_patch_config(client, tenant, config_id, &ids).await;
                settle(&mut outcomes, &batch, &label, result);
            }
            Target::Job {
                tenant,
                job_id,
                job_type,
            } => {
                let result = jobs::safe_add_resources(client, tenant, job_id, &ids, job_type)
                    .await
                    .map(|report| job_statuses(&report));
                settle(&mut outcomes, &batch, &label, result);
            }
            Target::PatchConvention => {
                run_convention(client, tenant, &resolved, &mut outcomes).await;
            }
        }
    }

    outcomes.into_iter().flatten().collect()
}
