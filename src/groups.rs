//! Membership arithmetic shared by patch configurations, jobs and resource
//! groups.
//!
//! Groups are re-posted as whole documents, so existing entity entries are
//! kept as raw JSON (unknown fields survive the round trip) and only new
//! members are built from [`EntityRef`]. Invariant: after [`merge_members`]
//! every member id appears at most once among the entries it produced.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Entity type OpsRamp uses for devices inside groups.
pub const DEVICE: &str = "DEVICE";

/// `{"resource": {"id": ..., "type": "DEVICE"}}`, the member shape used by
/// patch configurations and jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    /// Referenced device.
    pub resource: MemberRef,
}

/// `{"id": ..., "type": ...}`, the bare member shape used by resource
/// groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRef {
    /// Device id.
    pub id: String,
    /// Entity type, normally [`DEVICE`].
    #[serde(rename = "type")]
    pub kind: String,
}

impl MemberRef {
    /// A device member.
    pub fn device(id: impl Into<String>) -> Self {
        MemberRef {
            id: id.into(),
            kind: DEVICE.to_string(),
        }
    }
}

impl EntityRef {
    /// A device entity.
    pub fn device(id: impl Into<String>) -> Self {
        EntityRef {
            resource: MemberRef::device(id),
        }
    }

    fn to_value(&self) -> Value {
        serde_json::json!({ "resource": { "id": self.resource.id, "type": self.resource.kind } })
    }
}

/// Result of merging requested ids into an existing member list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Merge {
    /// Existing entries followed by one entry per newly added id.
    pub merged: Vec<Value>,
    /// Ids that were not members before, in request order.
    pub added: Vec<String>,
    /// Requested ids that were already members.
    pub already_present: Vec<String>,
}

impl Merge {
    /// `true` when the merge would not change the group.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
    }
}

/// What an add-members call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// The group was updated with `added`; `already_present` were skipped.
    Updated {
        /// Newly added ids.
        added: Vec<String>,
        /// Requested ids that were already members.
        already_present: Vec<String>,
    },
    /// Every requested id was already a member; nothing was posted.
    AlreadyMembers,
}

impl From<&Merge> for AddOutcome {
    fn from(merge: &Merge) -> Self {
        if merge.is_noop() {
            AddOutcome::AlreadyMembers
        } else {
            AddOutcome::Updated {
                added: merge.added.clone(),
                already_present: merge.already_present.clone(),
            }
        }
    }
}

/// Mutable access to `doc[key]` as an object, creating it when absent.
pub(crate) fn object_mut<'a>(
    doc: &'a mut Value,
    key: &str,
    label: &str,
) -> crate::error::Result<&'a mut serde_json::Map<String, Value>> {
    let map = doc.as_object_mut().ok_or_else(|| shape_error(label))?;
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    if slot.is_null() {
        *slot = Value::Object(serde_json::Map::new());
    }
    slot.as_object_mut().ok_or_else(|| shape_error(label))
}

fn shape_error(label: &str) -> crate::error::OpsRampError {
    crate::error::OpsRampError::UnexpectedResponse {
        label: label.to_string(),
        detail: "document is not a JSON object".to_string(),
    }
}

/// Member id of an entity entry: `resource.id`, or a bare `id`.
pub fn entity_id(entity: &Value) -> Option<String> {
    let id = entity
        .get("resource")
        .and_then(|r| r.get("id"))
        .or_else(|| entity.get("id"))?;
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Ids of every entry in `entities`, skipping entries without one.
pub fn member_ids(entities: &[Value]) -> Vec<String> {
    entities.iter().filter_map(entity_id).collect()
}

/// Set difference of `requested` against `existing`, then union.
///
/// Repeated ids inside `requested` are added once, and an id listed more
/// than once in `existing` keeps only its first entry. Entries without an id
/// are kept as they are.
pub fn merge_members(existing: &[Value], requested: &[String]) -> Merge {
    let mut current: Vec<String> = Vec::new();
    let mut merged = Vec::with_capacity(existing.len() + requested.len());
    for entity in existing {
        match entity_id(entity) {
            Some(id) if current.contains(&id) => continue,
            Some(id) => current.push(id),
            None => {}
        }
        merged.push(entity.clone());
    }
    let mut merge = Merge {
        merged,
        ..Merge::default()
    };

    for id in requested {
        if current.contains(id) {
            if !merge.already_present.contains(id) {
                merge.already_present.push(id.clone());
            }
        } else if !merge.added.contains(id) {
            merge.merged.push(EntityRef::device(id.clone()).to_value());
            merge.added.push(id.clone());
        }
    }

    merge
}

/// Drops every entry whose id is in `ids`. Returns the kept entries and the
/// ids actually removed.
pub fn remove_members(existing: &[Value], ids: &[String]) -> (Vec<Value>, Vec<String>) {
    let mut removed = Vec::new();
    let kept = existing
        .iter()
        .filter(|entity| match entity_id(entity) {
            Some(id) if ids.contains(&id) => {
                removed.push(id);
                false
            }
            _ => true,
        })
        .cloned()
        .collect();
    (kept, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn merge_adds_only_missing_members() {
        let existing = vec![
            json!({"resource": {"id": "B", "type": "DEVICE", "name": "srv-b"}}),
            json!({"resource": {"id": "C", "type": "DEVICE"}}),
        ];
        let merge = merge_members(&existing, &ids(&["A", "B"]));

        assert_eq!(member_ids(&merge.merged), ids(&["B", "C", "A"]));
        assert_eq!(merge.added, ids(&["A"]));
        assert_eq!(merge.already_present, ids(&["B"]));
        // Unknown fields on existing entries survive.
        assert_eq!(merge.merged[0]["resource"]["name"], "srv-b");
    }

    #[test]
    fn merge_deduplicates_the_request_itself() {
        let merge = merge_members(&[], &ids(&["A", "A", "B"]));
        assert_eq!(member_ids(&merge.merged), ids(&["A", "B"]));
        assert_eq!(merge.merged[0], json!({"resource": {"id": "A", "type": "DEVICE"}}));
    }

    #[test]
    fn merge_with_nothing_new_is_noop() {
        let existing = vec![json!({"resource": {"id": "A", "type": "DEVICE"}})];
        let merge = merge_members(&existing, &ids(&["A"]));
        assert!(merge.is_noop());
        assert_eq!(merge.merged, existing);
    }

    #[test]
    fn existing_duplicates_collapse_to_first_entry() {
        let existing = vec![
            json!({"resource": {"id": "A", "type": "DEVICE", "name": "first"}}),
            json!({"resource": {"id": "A", "type": "DEVICE", "name": "second"}}),
            json!({"note": "no id"}),
        ];
        let merge = merge_members(&existing, &ids(&["A", "B"]));
        assert_eq!(member_ids(&merge.merged), ids(&["A", "B"]));
        assert_eq!(merge.merged.len(), 3);
        assert_eq!(merge.merged[0]["resource"]["name"], "first");
        assert_eq!(merge.merged[1], json!({"note": "no id"}));
        assert_eq!(merge.already_present, ids(&["A"]));
        assert_eq!(merge.added, ids(&["B"]));
    }

    #[test]
    fn entity_id_reads_both_shapes() {
        assert_eq!(entity_id(&json!({"resource": {"id": "X"}})), Some("X".into()));
        assert_eq!(entity_id(&json!({"id": 42, "type": "DEVICE"})), Some("42".into()));
        assert_eq!(entity_id(&json!({"name": "no id"})), None);
    }

    #[test]
    fn remove_reports_what_was_removed() {
        let existing = vec![
            json!({"resource": {"id": "A", "type": "DEVICE"}}),
            json!({"resource": {"id": "B", "type": "DEVICE"}}),
        ];
        let (kept, removed) = remove_members(&existing, &ids(&["B", "Z"]));
        assert_eq!(member_ids(&kept), ids(&["A"]));
        assert_eq!(removed, ids(&["B"]));
    }
}
