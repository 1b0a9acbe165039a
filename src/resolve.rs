//! Device resolution: turn a spreadsheet (server name, client name) pair
//! into exactly one [`Resource`].
//!
//! A name search often returns several records: stale discoveries, agentless
//! duplicates, or the same host name reused by different clients. Entries
//! are first filtered for eligibility, then, if more than one survives and a
//! client name was supplied, narrowed by fuzzy client-name similarity. The
//! first survivor wins.

use crate::client::OpsRampClient;
use crate::error::{OpsRampError, Result};
use crate::matching::client_names_match;
use crate::resources::{self, Resource};

/// Agent-installed entries, followed by agentless entries that are both
/// `active` and `up`. Entries without an id and everything else are
/// dropped; relative order within each group is kept.
pub fn eligible(entries: Vec<Resource>) -> Vec<Resource> {
    let (installed, agentless): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .filter(|r| !r.id.is_empty())
        .partition(|r| r.agent_installed.unwrap_or(false));

    let reachable = agentless.into_iter().filter(|r| {
        let state = r.state.as_deref().unwrap_or_default();
        let status = r.status.as_deref().unwrap_or_default();
        state.eq_ignore_ascii_case("active") && status.eq_ignore_ascii_case("up")
    });

    installed.into_iter().chain(reachable).collect()
}

/// Narrows `entries` to those whose client name is similar to
/// `client_name`. A single entry, or a missing/blank client name, passes
/// through untouched.
pub fn disambiguate(entries: Vec<Resource>, client_name: Option<&str>) -> Vec<Resource> {
    let wanted = match client_name.map(str::trim) {
        Some(name) if !name.is_empty() && entries.len() > 1 => name,
        _ => return entries,
    };

    entries
        .into_iter()
        .filter(|r| client_names_match(wanted, r.client_name().unwrap_or("N/A")))
        .collect()
}

/// Applies eligibility and disambiguation to search results and returns the
/// first survivor.
///
/// # Errors
///
/// `OpsRampError::NotFound` naming the stage that emptied the list.
pub fn select(
    server_name: &str,
    entries: Vec<Resource>,
    client_name: Option<&str>,
) -> Result<Resource> {
    if client_name.is_none_or(|c| c.trim().is_empty()) {
        log::warn!(
            "Client name is missing for server {server_name}. Proceeding without client filtering."
        );
    }

    let candidates = eligible(entries);
    if candidates.is_empty() {
        log::warn!("No valid entries found for server {server_name}.");
        return Err(OpsRampError::NotFound {
            what: format!("eligible resource named {server_name}"),
        });
    }

    if candidates.len() > 1 {
        if let Some(name) = client_name.filter(|c| !c.trim().is_empty()) {
            log::warn!(
                "Multiple valid entries found for server {server_name}. Filtering by client name: {name}."
            );
        }
    }

    disambiguate(candidates, client_name)
        .into_iter()
        .next()
        .ok_or_else(|| {
            let client = client_name.unwrap_or_default();
            log::warn!("No entries found for client '{client}' for server {server_name}.");
            OpsRampError::NotFound {
                what: format!("resource named {server_name} for client '{client}'"),
            }
        })
}

/// Searches `tenant` for `server_name` and resolves the result to one
/// device.
///
/// # Errors
///
/// - `OpsRampError::NotFound`: no search hit, no eligible entry, or no
///   entry for the given client.
/// - Transport errors from the search call.
pub async fn resolve_device(
    client: &OpsRampClient,
    tenant: &str,
    server_name: &str,
    client_name: Option<&str>,
) -> Result<Resource> {
    let entries = resources::search(client, tenant, &[("name", server_name)]).await?;
    if entries.len() > 1 {
        log::info!("Multiple entries found for server {server_name}.");
    }
    select(server_name, entries, client_name)
}
