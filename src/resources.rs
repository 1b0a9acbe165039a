//! Resource (device) lookup and lifecycle calls.
//!
//! - [`search`]: tenant-scoped search by field filters (e.g. `name`).
//! - [`get`]: a single resource by id.
//! - [`manage`] / [`unmanage`]: state changes; the returned [`Reply`] is
//!   the success signal.
//! - [`availability_rule`], [`availability_info`], [`oob_interfaces`],
//!   [`templates`]: read-only detail endpoints returned as raw JSON.
//!
//! Device-level calls take the *client* tenant (the resource's
//! `client.uniqueId`), while search usually runs against the partner tenant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::client::{OpsRampClient, Reply};
use crate::error::Result;
use crate::matching::{Comparator, clean_compare};
use crate::page::collect_pages;

// ── Response types ─────────────────────────────────────────────────────

/// A monitored device as returned by the resource endpoints.
///
/// Only the fields the crate reasons about are typed. Everything else the
/// API sends is kept in `extra` so reports can surface it verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// OpsRamp resource id (UUID). Empty when the API omitted it.
    #[serde(default)]
    pub id: String,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Host name reported by the agent or discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,

    /// Fully qualified DNS name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_name: Option<String>,

    /// Primary IP address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    /// Owning client (tenant).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientRef>,

    /// Site the device is registered under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<NamedRef>,

    /// Tags currently carried by the device.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<ResourceTag>,

    /// `true` for bare-metal hardware.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_physical: Option<bool>,

    /// Cloud provider for cloud instances (e.g. `"AWS"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider: Option<String>,

    /// Device type string (e.g. `"Server"`, `"Virtual"`, `"VM"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,

    /// Whether the OpsRamp agent is installed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_installed: Option<bool>,

    /// Lifecycle state (`"active"`, `"inactive"`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Availability status (`"up"`, `"down"`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Free-form attributes (`accountNumber`, `instanceId`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,

    /// Every other field the API returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Client reference embedded in a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRef {
    /// Numeric or string client id, kept as text.
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    /// Client display name, e.g. `"Acme Inc (Legacy)"`.
    #[serde(default)]
    pub name: Option<String>,
    /// Client tenant id used by device-level endpoints.
    #[serde(default)]
    pub unique_id: Option<String>,
}

/// `{ "name": ... }` reference (locations and similar).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedRef {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
}

/// A tag name/value pair carried by a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceTag {
    /// Tag name.
    #[serde(default)]
    pub name: String,
    /// Assigned value.
    #[serde(default, deserialize_with = "string_or_number")]
    pub value: Option<String>,
}

pub(crate) fn string_or_number<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Coarse hosting classification used in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerType {
    /// Bare-metal hardware.
    Physical,
    /// AWS instance (tag or cloud provider says so).
    Aws,
    /// Hypervisor guest.
    Virtual,
    /// None of the above could be established.
    Unknown,
}

impl ServerType {
    /// Classifies a resource: physical wins, then AWS, then virtual.
    pub fn classify(resource: &Resource) -> Self {
        if resource.is_physical.unwrap_or(false) {
            return ServerType::Physical;
        }
        let aws_tag = resource.tags.iter().any(|tag| tag.name.contains("AWS"));
        let aws_provider = resource
            .cloud_provider
            .as_deref()
            .is_some_and(|p| p.eq_ignore_ascii_case("aws"));
        if aws_tag || aws_provider {
            return ServerType::Aws;
        }
        match resource.device_type.as_deref().map(str::to_lowercase) {
            Some(t) if t == "virtual" || t == "vm" => ServerType::Virtual,
            _ => ServerType::Unknown,
        }
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServerType::Physical => "Physical",
            ServerType::Aws => "AWS",
            ServerType::Virtual => "Virtual",
            ServerType::Unknown => "Unknown",
        })
    }
}

impl Resource {
    /// Best available host name: `hostName`, then `name`, then
    /// `resourceName`.
    pub fn display_host(&self) -> Option<&str> {
        self.host_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.name.as_deref().filter(|s| !s.is_empty()))
            .or(self.extra.get("resourceName").and_then(Value::as_str))
    }

    /// Client display name, if the resource carries one.
    pub fn client_name(&self) -> Option<&str> {
        self.client.as_ref()?.name.as_deref()
    }

    /// Client tenant id (`client.uniqueId`).
    pub fn client_unique_id(&self) -> Option<&str> {
        self.client.as_ref()?.unique_id.as_deref()
    }

    /// Any top-level field by its API name, typed or not.
    pub fn field(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.extra.get(name) {
            return Some(value.clone());
        }
        serde_json::to_value(self).ok()?.get(name).cloned()
    }

    /// For each requested name, the value of the first tag whose cleaned
    /// name contains it (`None` when no tag matches). Order follows `names`.
    pub fn tag_values(&self, names: &[&str]) -> Vec<(String, Option<String>)> {
        names
            .iter()
            .map(|&wanted| {
                let value = self
                    .tags
                    .iter()
                    .find(|tag| clean_compare(wanted, Comparator::ContainedIn(&tag.name)))
                    .and_then(|tag| tag.value.clone());
                (wanted.to_string(), value)
            })
            .collect()
    }
}

/// `[start, end]` in whole seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityWindow {
    /// Window start (inclusive).
    pub start: i64,
    /// Window end, normally "now".
    pub end: i64,
}

impl AvailabilityWindow {
    /// Default look-back for availability reports.
    pub const DEFAULT_DAYS: u32 = 14;

    /// The trailing `days` ending at `now`.
    pub fn trailing(days: u32, now: DateTime<Utc>) -> Self {
        let end = now.timestamp();
        AvailabilityWindow {
            start: end - i64::from(days) * 24 * 60 * 60,
            end,
        }
    }
}

// ── Endpoint functions ─────────────────────────────────────────────────

/// Builds the `queryString` value: each pair percent-encoded as
/// `key:value`, pairs joined by `+`.
pub fn query_string(filter: &[(&str, &str)]) -> String {
    filter
        .iter()
        .map(|(key, value)| format!("{}:{}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("+")
}

/// Searches resources in `tenant` matching every `(field, value)` pair.
///
/// Walks all result pages. An empty result is `Ok(vec![])`; deciding
/// whether that is an error is left to the caller.
///
/// # Errors
///
/// - `OpsRampError::Remote`: the search endpoint rejected the query.
/// - `OpsRampError::Throttled` / `OpsRampError::Auth`: retries exhausted.
pub async fn search(
    client: &OpsRampClient,
    tenant: &str,
    filter: &[(&str, &str)],
) -> Result<Vec<Resource>> {
    let query = query_string(filter);
    let subject = filter.first().map(|(_, v)| *v).unwrap_or("all");
    let label = format!("{subject} Resource");
    let page_label = label.clone();
    collect_pages(&label, move |page_no| {
        let path = format!(
            "api/v2/tenants/{tenant}/resources/search?queryString={query}&pageNo={page_no}"
        );
        client.get_page(path, page_label.clone())
    })
    .await
}

/// Fetches one resource.
///
/// # Errors
///
/// - `OpsRampError::NotFound`: unknown id in this tenant.
pub async fn get(client: &OpsRampClient, tenant: &str, resource_id: &str) -> Result<Resource> {
    let path = format!("api/v2/tenants/{tenant}/resources/{resource_id}");
    client
        .get_json(&path, &format!("{resource_id} Resource"))
        .await
}

/// Moves a device back into managed state.
pub async fn manage(client: &OpsRampClient, tenant: &str, resource_id: &str) -> Result<Reply> {
    let path = format!("api/v2/tenants/{tenant}/devices/{resource_id}/manage");
    client.post_empty(&path, &format!("{resource_id} Managed")).await
}

/// Moves a device to unmanaged state (monitoring and billing stop).
pub async fn unmanage(client: &OpsRampClient, tenant: &str, resource_id: &str) -> Result<Reply> {
    let path = format!("api/v2/tenants/{tenant}/devices/{resource_id}/unmanage");
    client
        .post_empty(&path, &format!("{resource_id} Unmanaged"))
        .await
}

/// Availability rule configured for a device.
pub async fn availability_rule(
    client: &OpsRampClient,
    tenant: &str,
    resource_id: &str,
) -> Result<Value> {
    let path = format!("api/v2/tenants/{tenant}/resources/{resource_id}/availability/rule");
    client
        .get_json(&path, &format!("Availability Rule for {resource_id}"))
        .await
}

/// Availability data over the trailing `days` ending now.
pub async fn availability_info(
    client: &OpsRampClient,
    tenant: &str,
    resource_id: &str,
    days: u32,
) -> Result<Value> {
    let window = AvailabilityWindow::trailing(days, Utc::now());
    let path = format!(
        "api/v2/tenants/{tenant}/resources/{resource_id}/availability?startTime={}&endTime={}",
        window.start, window.end
    );
    client
        .get_json(&path, &format!("Availability Info for {resource_id}"))
        .await
}

/// Out-of-band management cards (iLO, iDRAC) discovered on a device.
pub async fn oob_interfaces(
    client: &OpsRampClient,
    tenant: &str,
    resource_id: &str,
) -> Result<Value> {
    let path =
        format!("api/v2/tenants/{tenant}/resources/{resource_id}/inventory/oobInterfaceCards");
    client
        .get_json(&path, &format!("OOB Interface for {resource_id}"))
        .await
}

/// Monitoring templates applied to a device.
pub async fn templates(client: &OpsRampClient, tenant: &str, resource_id: &str) -> Result<Value> {
    let path = format!("api/v2/tenants/{tenant}/resources/{resource_id}/templates/search");
    client
        .get_json(&path, &format!("{resource_id} Templates"))
        .await
}
