//! Tag reconciliation: find-or-create tags and tag values, then assign them
//! to resources.
//!
//! Tag names and values are matched with [`clean_compare`] (case and
//! punctuation insensitive), so `"Patch-Window"` and `"patch window"` are the
//! same tag. [`force_assign_tag_value`] is the idempotent entry point the
//! batch driver uses.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::client::{OpsRampClient, Reply};
use crate::error::{OpsRampError, Result};
use crate::matching::{Comparator, clean_compare};
use crate::page::collect_pages;
use crate::resources::string_or_number;

/// OpsQL page size used when listing tags.
const TAG_PAGE_SIZE: u32 = 1000;

// ── Types ──────────────────────────────────────────────────────────────

/// A tag (category) defined in a tenant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Tag {
    /// Tag id.
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    /// Tag name as entered in OpsRamp.
    #[serde(default)]
    pub name: String,
}

/// One assignable value of a tag.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagValue {
    /// Value id as returned by create calls.
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    /// Value id as returned by list calls.
    #[serde(default, deserialize_with = "string_or_number")]
    pub unique_id: Option<String>,
    /// The value text.
    #[serde(default)]
    pub value: String,
}

impl TagValue {
    /// The id assignment calls expect: `uniqueId` when listed, `id` when
    /// freshly created.
    pub fn key(&self) -> Option<&str> {
        self.unique_id.as_deref().or(self.id.as_deref())
    }
}

/// `{"entityType": "resource", "entityId": ...}` body element of tag
/// assignment calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggedEntity {
    /// Always `"resource"` here.
    pub entity_type: String,
    /// Resource id.
    pub entity_id: String,
}

impl TaggedEntity {
    /// A resource entity.
    pub fn resource(id: impl Into<String>) -> Self {
        TaggedEntity {
            entity_type: "resource".to_string(),
            entity_id: id.into(),
        }
    }
}

/// How [`force_assign_tag_value`] treats values previously assigned under
/// the same tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClearPolicy {
    /// Assign; only when the API reports a conflict, unassign the tag from
    /// the entities and assign once more.
    #[default]
    OnConflict,
    /// Unassign the tag from the entities first, then assign.
    Always,
}

/// Outcome of a successful [`force_assign_tag_value`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Resolved or created tag id.
    pub tag_id: String,
    /// Resolved or created value id.
    pub value_id: String,
    /// `true` when an unassign ran before the final assignment.
    pub cleared: bool,
}

// ── Endpoint functions ─────────────────────────────────────────────────

/// Every tag in `tenant`, via OpsQL.
pub async fn list(client: &OpsRampClient, tenant: &str) -> Result<Vec<Tag>> {
    let path = format!("opsql/api/v3/tenants/{tenant}/queries");
    collect_pages("Tags", move |page_no| {
        let body = json!({
            "objectType": "tag",
            "fields": ["id", "name"],
            "pageSize": TAG_PAGE_SIZE,
            "pageNo": page_no,
        });
        let label = format!("All Tags on Page {page_no} for {tenant}");
        client.post_page(path.clone(), body, label)
    })
    .await
}

/// Every value defined under `tag_id`.
pub async fn values(client: &OpsRampClient, tenant: &str, tag_id: &str) -> Result<Vec<TagValue>> {
    collect_pages("Tag values", move |page_no| {
        let path = format!("api/v3/tenants/{tenant}/tags/{tag_id}/values?pageNo={page_no}");
        client.get_page(path, format!("{tag_id} Values"))
    })
    .await
}

/// Creates tags by name and returns what the API created.
pub async fn create(client: &OpsRampClient, tenant: &str, names: &[&str]) -> Result<Vec<Tag>> {
    let path = format!("api/v3/tenants/{tenant}/tags");
    let body: Vec<Value> = names.iter().map(|name| json!({ "name": name })).collect();
    client
        .post_json(&path, &body, &format!("{tenant} new Tag created"))
        .await
}

/// Creates values under `tag_id` and returns what the API created.
pub async fn create_values(
    client: &OpsRampClient,
    tenant: &str,
    tag_id: &str,
    values: &[&str],
) -> Result<Vec<TagValue>> {
    let path = format!("api/v3/tenants/{tenant}/tags/{tag_id}/values");
    let body: Vec<Value> = values.iter().map(|value| json!({ "value": value })).collect();
    client
        .post_json(&path, &body, &format!("{tenant} new Values created"))
        .await
}

/// Assigns a tag value to entities. The [`Reply`] is returned as is so the
/// caller can inspect an error `code`.
pub async fn assign(
    client: &OpsRampClient,
    tenant: &str,
    tag_id: &str,
    value_id: &str,
    entities: &[TaggedEntity],
) -> Result<Reply> {
    let path = format!("api/v3/tenants/{tenant}/tags/{tag_id}/values/{value_id}/tagged-entities");
    client
        .post(
            &path,
            entities,
            &format!("{tag_id} Tag with {value_id} Value is Added to {} entities", entities.len()),
        )
        .await
}

/// Removes a tag (whatever its value) from entities.
pub async fn unassign(
    client: &OpsRampClient,
    tenant: &str,
    tag_id: &str,
    entities: &[TaggedEntity],
) -> Result<Reply> {
    let path = format!("api/v3/tenants/{tenant}/tags/{tag_id}/untagged-entities");
    client
        .post(
            &path,
            entities,
            &format!("{tag_id} Tag is Removed from {} entities", entities.len()),
        )
        .await
}

fn first_created<T>(
    created: Vec<T>,
    key: impl Fn(&T) -> Option<&str>,
    what: &str,
) -> Result<String> {
    created
        .iter()
        .find_map(|item| key(item).map(str::to_string))
        .ok_or_else(|| OpsRampError::UnexpectedResponse {
            label: format!("create {what}"),
            detail: "no id in the created entities".to_string(),
        })
}

/// Id of the tag named `name`, creating the tag when none matches.
pub async fn force_get_tag_id(client: &OpsRampClient, tenant: &str, name: &str) -> Result<String> {
    let existing = list(client, tenant).await?;
    if let Some(tag) = existing
        .iter()
        .find(|tag| clean_compare(&tag.name, Comparator::Equals(name)))
    {
        return tag.id.clone().ok_or_else(|| OpsRampError::UnexpectedResponse {
            label: format!("All Tags for {tenant}"),
            detail: format!("tag '{name}' is listed without an id"),
        });
    }

    log::info!("Tag '{name}' not found in {tenant}, creating it");
    let created = create(client, tenant, &[name]).await?;
    first_created(created, |tag| tag.id.as_deref(), "tag")
}

/// Id of the value `value` under `tag_id`, creating it when none matches.
pub async fn force_get_value_id(
    client: &OpsRampClient,
    tenant: &str,
    tag_id: &str,
    value: &str,
) -> Result<String> {
    let existing = values(client, tenant, tag_id).await?;
    if let Some(id) = existing
        .iter()
        .find(|v| clean_compare(&v.value, Comparator::Equals(value)))
        .and_then(|v| v.key().map(str::to_string))
    {
        return Ok(id);
    }

    log::info!("Value '{value}' not found under tag {tag_id}, creating it");
    let created = create_values(client, tenant, tag_id, &[value]).await?;
    first_created(created, TagValue::key, "tag value")
}

/// `(tag_id, value_id)`, creating either as needed.
pub async fn force_get_tag_value_ids(
    client: &OpsRampClient,
    tenant: &str,
    tag: &str,
    value: &str,
) -> Result<(String, String)> {
    let tag_id = force_get_tag_id(client, tenant, tag).await?;
    let value_id = force_get_value_id(client, tenant, &tag_id, value).await?;
    Ok((tag_id, value_id))
}

fn is_conflict(reply: &Reply) -> bool {
    reply.status() == reqwest::StatusCode::CONFLICT || reply.error_code().is_some()
}

/// Makes every resource in `resource_ids` carry `tag` = `value`, creating
/// the tag and the value when missing.
///
/// # Errors
///
/// - `OpsRampError::Conflict`: the assignment still reported an error code
///   after clearing.
/// - `OpsRampError::Remote`: any other failed reply.
pub async fn force_assign_tag_value(
    client: &OpsRampClient,
    tenant: &str,
    resource_ids: &[String],
    tag: &str,
    value: &str,
    policy: ClearPolicy,
) -> Result<Assignment> {
    log::info!("Assigning {tag} : {value} to {} resources", resource_ids.len());
    let entities: Vec<TaggedEntity> = resource_ids.iter().map(TaggedEntity::resource).collect();
    let (tag_id, value_id) = force_get_tag_value_ids(client, tenant, tag, value).await?;

    let mut cleared = false;
    if policy == ClearPolicy::Always {
        unassign(client, tenant, &tag_id, &entities).await?.into_result()?;
        cleared = true;
    }

    let mut reply = assign(client, tenant, &tag_id, &value_id, &entities).await?;
    if is_conflict(&reply) && !cleared {
        log::warn!("Assigning {tag} : {value} conflicted, unassigning previous value and retrying");
        unassign(client, tenant, &tag_id, &entities).await?.into_result()?;
        cleared = true;
        reply = assign(client, tenant, &tag_id, &value_id, &entities).await?;
    }

    if let Some(code) = reply.error_code() {
        return Err(OpsRampError::Conflict {
            message: format!("assigning {tag} : {value} failed with code {code}"),
        });
    }
    reply.into_result()?;

    Ok(Assignment {
        tag_id,
        value_id,
        cleared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn tag_value_key_prefers_unique_id() {
        let listed: TagValue =
            serde_json::from_value(json!({"id": 7, "uniqueId": "val-7", "value": "Prod"})).unwrap();
        assert_eq!(listed.key(), Some("val-7"));

        let created: TagValue = serde_json::from_value(json!({"id": 8, "value": "UAT"})).unwrap();
        assert_eq!(created.key(), Some("8"));
    }

    #[test]
    fn tagged_entity_shape() {
        let entity = serde_json::to_value(TaggedEntity::resource("r-1")).unwrap();
        assert_eq!(entity, json!({"entityType": "resource", "entityId": "r-1"}));
    }

    #[test]
    fn conflict_detection() {
        let coded = Reply::new(StatusCode::OK, Some(json!({"code": "0x1203"})), "assign");
        assert!(is_conflict(&coded));
        let status = Reply::new(StatusCode::CONFLICT, None, "assign");
        assert!(is_conflict(&status));
        let fine = Reply::new(StatusCode::OK, Some(json!({"successCount": 1})), "assign");
        assert!(!is_conflict(&fine));
    }

    #[test]
    fn first_created_requires_an_id() {
        let tags = vec![Tag {
            id: None,
            name: "x".into(),
        }];
        assert!(first_created(tags, |t| t.id.as_deref(), "tag").is_err());
    }

    #[test]
    fn default_policy_clears_on_conflict() {
        assert_eq!(ClearPolicy::default(), ClearPolicy::OnConflict);
    }
}
