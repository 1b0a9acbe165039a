//! Async Rust client library for OpsRamp device lifecycle automation.
//!
//! Provides OAuth2 client-credential authentication, a transport with
//! throttle backoff and token refresh, paginated listing, idempotent tag and
//! group-membership reconciliation, and spreadsheet-driven batch drivers
//! (inventory lookup, unmanage, tagging, patch/job membership).
//!
//! # Modules
//!
//! - [`auth`]: Client-credential token provider with expiry tracking.
//! - [`client`]: Authenticated HTTP wrapper and the shared response interpreter.
//! - [`retry`]: Bounded retry policy for throttled requests.
//! - [`page`]: `results`/`nextPage` pages and the collect-all-pages loop.
//! - [`error`]: Typed error hierarchy (`OpsRampError`).
//! - [`matching`]: Name normalisation, strict and fuzzy comparators.
//! - [`resources`]: Device search, fetch, manage/unmanage, availability.
//! - [`resolve`]: Turning a (server, client) name pair into one device.
//! - [`tags`]: Find-or-create tags and values, force assignment.
//! - [`groups`]: Membership merge primitives shared by the group managers.
//! - [`patch_config`], [`jobs`], [`resource_groups`]: Group managers.
//! - [`credential_sets`], [`profiles`], [`query`], [`metrics`]: Smaller
//!   collaborators.
//! - [`config`]: Settings file and CLI/environment overlay.
//! - [`batch`]: Spreadsheet input, record output and the batch drivers.
//!
//! # Quick Start
//!
//! ```ignore
//! use opsramp_lc::auth::{Credentials, TokenProvider};
//! use opsramp_lc::client::{ClientOptions, OpsRampClient};
//! use opsramp_lc::resolve::resolve_device;
//!
//! let creds = Credentials::new(key, secret);
//! let auth = TokenProvider::new("acme", creds);
//! let client = OpsRampClient::new("acme", auth, ClientOptions::default())?;
//! let device = resolve_device(&client, "msp_123", "web01", Some("Acme Inc")).await?;
//! ```

#![warn(missing_docs)]

pub mod auth;
pub mod batch;
pub mod client;
pub mod config;
pub mod credential_sets;
pub mod error;
pub mod groups;
pub mod jobs;
pub mod matching;
pub mod metrics;
pub mod page;
pub mod patch_config;
pub mod profiles;
pub mod query;
pub mod resolve;
pub mod resource_groups;
pub mod resources;
pub mod retry;
pub mod tags;
