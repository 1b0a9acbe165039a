//! Scheduled jobs (e.g. the daily missing-patches scan) and their device
//! membership.
//!
//! [`safe_add_resources`] is the membership call batch drivers use: a device
//! may belong to at most one job of a given job type, so ids already in a
//! different job of that type are reported as conflicts instead of added.

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::client::OpsRampClient;
use crate::error::Result;
use crate::groups::{self, AddOutcome, EntityRef};
use crate::page::collect_pages;
use crate::resources::string_or_number;

/// Job type of the patch-scan jobs this crate creates and reconciles.
pub const MISSING_PATCHES_JOB: &str = "missingPatchesRequest";

/// Fixed schedule anchor used when creating jobs.
pub const JOB_SCHEDULE_ANCHOR: &str = "2024-12-19T00:00:00+0000";

/// Summary row from the job search endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobSummary {
    /// Job id.
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    /// Job name.
    #[serde(default)]
    pub name: Option<String>,
    /// Script block; `jobType` identifies the kind of job.
    #[serde(default)]
    pub script: Option<Value>,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobSummary {
    /// `script.jobType`, when present.
    pub fn job_type(&self) -> Option<&str> {
        self.script.as_ref()?.get("jobType")?.as_str()
    }
}

/// What [`safe_add_resources`] did with each requested id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafeAddReport {
    /// Ids added to the target job.
    pub added: Vec<String>,
    /// Ids already in the target job.
    pub already_in_job: Vec<String>,
    /// Ids refused because another job of the same type holds them.
    pub conflicts: Vec<String>,
}

fn base(tenant: &str) -> String {
    format!("api/v2/tenants/{tenant}/jobs")
}

/// Every job in `tenant`.
pub async fn list(client: &OpsRampClient, tenant: &str) -> Result<Vec<JobSummary>> {
    let base = base(tenant);
    collect_pages("Jobs", move |page_no| {
        let path = format!("{base}/search?pageNo={page_no}");
        client.get_page(path, format!("All Jobs on {tenant} at PageNo {page_no}"))
    })
    .await
}

/// The full job document.
pub async fn details(client: &OpsRampClient, tenant: &str, job_id: &str) -> Result<Value> {
    let path = format!("{}/{job_id}", base(tenant));
    client
        .get_json(&path, &format!("Detailed Job info {job_id}"))
        .await
}

/// Document posted by [`create`]: a daily missing-patches request job.
pub fn new_job_document(name: &str, entity_ids: &[String]) -> Value {
    let entities: Vec<EntityRef> = entity_ids.iter().map(EntityRef::device).collect();
    json!({
        "name": name,
        "entities": entities,
        "schedule": {
            "startDate": JOB_SCHEDULE_ANCHOR,
            "pattern": { "type": "daily", "frequency": "everyday" },
            "daysToAdd": 0
        },
        "jobQueued": false,
        "script": { "jobType": MISSING_PATCHES_JOB },
        "requiredParams": []
    })
}

/// Creates a job with the given members.
pub async fn create(
    client: &OpsRampClient,
    tenant: &str,
    name: &str,
    entity_ids: &[String],
) -> Result<Value> {
    let doc = new_job_document(name, entity_ids);
    let reply = client
        .post(
            &base(tenant),
            &doc,
            &format!("new Job '{name}' on {} entities", entity_ids.len()),
        )
        .await?;
    Ok(reply.into_result()?.unwrap_or(Value::Null))
}

fn entities_of(doc: &Value) -> Vec<Value> {
    doc.get("entities")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Adds devices to a job, skipping current members.
///
/// Returns [`AddOutcome::AlreadyMembers`] without posting when nothing is
/// new; otherwise posts the whole job document with the merged list once.
pub async fn add_resources(
    client: &OpsRampClient,
    tenant: &str,
    job_id: &str,
    entity_ids: &[String],
) -> Result<AddOutcome> {
    let mut doc = details(client, tenant, job_id).await?;
    let merge = groups::merge_members(&entities_of(&doc), entity_ids);
    let outcome = AddOutcome::from(&merge);
    if merge.is_noop() {
        log::info!("All Entities {entity_ids:?} are Already in the Same Job");
        return Ok(outcome);
    }

    let label = format!("Adding resources {:?} to {job_id}", merge.added);
    let map = doc.as_object_mut().ok_or_else(|| {
        crate::error::OpsRampError::UnexpectedResponse {
            label: label.clone(),
            detail: "job document is not a JSON object".to_string(),
        }
    })?;
    map.insert("entities".to_string(), Value::Array(merge.merged));

    let path = format!("{}/{job_id}", base(tenant));
    client.post(&path, &doc, &label).await?.into_result()?;
    Ok(outcome)
}

/// Partitions `entity_ids` against the target job's members and the members
/// of every other job of the same type.
pub fn plan_safe_add(
    entity_ids: &[String],
    target_members: &[String],
    same_type_members: &[String],
) -> SafeAddReport {
    let mut report = SafeAddReport::default();
    for id in entity_ids {
        let bucket = if target_members.contains(id) {
            &mut report.already_in_job
        } else if same_type_members.contains(id) {
            &mut report.conflicts
        } else {
            &mut report.added
        };
        if !bucket.contains(id) {
            bucket.push(id.clone());
        }
    }
    report
}

/// Adds devices to `job_id` only when no job of `job_type` already holds
/// them.
///
/// Lists every job, fetches the details of each job of `job_type`, then
/// adds the ids that appear in none of them. Ids in the target job land in
/// `already_in_job`; ids in another job of that type land in `conflicts`.
pub async fn safe_add_resources(
    client: &OpsRampClient,
    tenant: &str,
    job_id: &str,
    entity_ids: &[String],
    job_type: &str,
) -> Result<SafeAddReport> {
    let same_type: Vec<JobSummary> = list(client, tenant)
        .await?
        .into_iter()
        .filter(|job| job.job_type() == Some(job_type))
        .collect();

    let mut held_elsewhere = Vec::new();
    for job in &same_type {
        let Some(id) = job.id.as_deref() else { continue };
        if id == job_id {
            continue;
        }
        let doc = details(client, tenant, id).await?;
        held_elsewhere.extend(groups::member_ids(&entities_of(&doc)));
    }

    let target = details(client, tenant, job_id).await?;
    let target_members = groups::member_ids(&entities_of(&target));
    let mut report = plan_safe_add(entity_ids, &target_members, &held_elsewhere);

    if !report.conflicts.is_empty() {
        log::warn!("{:?} Already in Other Job", report.conflicts);
    }
    if !report.already_in_job.is_empty() {
        log::info!("{:?} Already in Same Job", report.already_in_job);
    }
    if report.added.is_empty() {
        log::info!("Resources are Empty after Filtering");
        return Ok(report);
    }

    if let AddOutcome::Updated { added, .. } =
        add_resources(client, tenant, job_id, &report.added).await?
    {
        report.added = added;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn plan_partitions_ids() {
        let report = plan_safe_add(&ids(&["A", "B", "C", "A"]), &ids(&["B"]), &ids(&["C", "Z"]));
        assert_eq!(report.added, ids(&["A"]));
        assert_eq!(report.already_in_job, ids(&["B"]));
        assert_eq!(report.conflicts, ids(&["C"]));
    }

    #[test]
    fn target_membership_wins_over_conflict() {
        let report = plan_safe_add(&ids(&["A"]), &ids(&["A"]), &ids(&["A"]));
        assert_eq!(report.already_in_job, ids(&["A"]));
        assert!(report.conflicts.is_empty());
    }

    #[test]
    fn job_type_reads_script_block() {
        let job: JobSummary = serde_json::from_value(json!({
            "id": 91,
            "name": "Daily scan",
            "script": {"jobType": "missingPatchesRequest"}
        }))
        .unwrap();
        assert_eq!(job.id.as_deref(), Some("91"));
        assert_eq!(job.job_type(), Some(MISSING_PATCHES_JOB));
        assert_eq!(JobSummary::default().job_type(), None);
    }

    #[test]
    fn new_job_document_shape() {
        let doc = new_job_document("Scan", &ids(&["r1", "r2"]));
        assert_eq!(doc["script"]["jobType"], MISSING_PATCHES_JOB);
        assert_eq!(doc["schedule"]["startDate"], JOB_SCHEDULE_ANCHOR);
        assert_eq!(doc["entities"].as_array().unwrap().len(), 2);
        assert_eq!(doc["jobQueued"], false);
    }
}
