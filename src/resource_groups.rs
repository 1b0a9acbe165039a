//! Resource groups (`deviceGroups`): static device collections.
//!
//! Unlike patch configurations and jobs, membership is extended through the
//! additive `childs` endpoint, so only ids that are not yet members are
//! posted.

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::client::OpsRampClient;
use crate::error::Result;
use crate::groups::{self, AddOutcome, MemberRef};
use crate::page::collect_pages;
use crate::resources::string_or_number;

/// Row of the `deviceGroups/minimal` listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceGroup {
    /// Group id.
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    /// Group name (upper case when created here).
    #[serde(default)]
    pub name: Option<String>,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn base(tenant: &str) -> String {
    format!("api/v2/tenants/{tenant}/deviceGroups")
}

/// Every resource group in `tenant`. The endpoint answers with a bare
/// array (one final page) or with paged results.
pub async fn list(client: &OpsRampClient, tenant: &str) -> Result<Vec<ResourceGroup>> {
    let base = base(tenant);
    collect_pages("Resource Groups", move |page_no| {
        let path = format!("{base}/minimal?pageNo={page_no}");
        let label = format!("All Resource Groups on {tenant} page {page_no}");
        client.get_page(path, label)
    })
    .await
}

/// The full group document, including `childs` when the API returns them.
pub async fn details(client: &OpsRampClient, tenant: &str, group_id: &str) -> Result<Value> {
    let path = format!("{}/{group_id}", base(tenant));
    client
        .get_json(&path, &format!("Detailed Resource Group info {group_id}"))
        .await
}

/// Upper-cased group name and capitalised description.
pub fn new_group_document(name: &str) -> Value {
    let lower = name.to_lowercase();
    let mut chars = lower.chars();
    let description: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    json!([{
        "name": name.to_uppercase(),
        "description": description,
        "linkedService": false,
        "rootVisibility": true,
        "type": "DEVICE_GROUP",
        "entityType": "DEVICE_GROUP"
    }])
}

/// Creates a resource group.
pub async fn create(client: &OpsRampClient, tenant: &str, name: &str) -> Result<Value> {
    let reply = client
        .post(
            &base(tenant),
            &new_group_document(name),
            &format!("new Resource Group '{}'", name.to_uppercase()),
        )
        .await?;
    Ok(reply.into_result()?.unwrap_or(Value::Null))
}

fn children_of(doc: &Value) -> Vec<Value> {
    ["childs", "children", "entities"]
        .iter()
        .find_map(|key| doc.get(*key).and_then(Value::as_array))
        .cloned()
        .unwrap_or_default()
}

/// Adds devices to a group, posting only those not already members.
pub async fn add_resources(
    client: &OpsRampClient,
    tenant: &str,
    group_id: &str,
    entity_ids: &[String],
) -> Result<AddOutcome> {
    let doc = details(client, tenant, group_id).await?;
    let merge = groups::merge_members(&children_of(&doc), entity_ids);
    let outcome = AddOutcome::from(&merge);
    if merge.is_noop() {
        log::info!("All Entities {entity_ids:?} are already in Resource Group {group_id}");
        return Ok(outcome);
    }

    let children: Vec<MemberRef> = merge.added.iter().map(MemberRef::device).collect();
    let path = format!("{}/{group_id}/childs", base(tenant));
    client
        .post(
            &path,
            &children,
            &format!("Adding resources {:?} to Resource Group {group_id}", merge.added),
        )
        .await?
        .into_result()?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_group_document_normalises_case() {
        let doc = new_group_document("acme PROD web");
        assert_eq!(doc[0]["name"], "ACME PROD WEB");
        assert_eq!(doc[0]["description"], "Acme prod web");
        assert_eq!(doc[0]["type"], "DEVICE_GROUP");
        assert_eq!(new_group_document("")[0]["description"], "");
    }

    #[test]
    fn children_read_from_any_known_key() {
        let doc = json!({"childs": [{"id": "r1", "type": "DEVICE"}]});
        assert_eq!(groups::member_ids(&children_of(&doc)), vec!["r1".to_string()]);
        assert!(children_of(&json!({"name": "G"})).is_empty());
    }

    #[test]
    fn member_ref_shape() {
        let value = serde_json::to_value(MemberRef::device("r9")).unwrap();
        assert_eq!(value, json!({"id": "r9", "type": "DEVICE"}));
    }
}
