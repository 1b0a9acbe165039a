//! CLI entry point for opsramp-lc: spreadsheet-driven OpsRamp device
//! lifecycle batches.
//!
//! Reads a sheet of (server name, client name) rows, resolves each row to a
//! device and runs one operation per subcommand, then writes a report with
//! one status record per row.
//!
//! Exit codes:
//! - 0: success (individual row failures are reported in the output file)
//! - 1: runtime error (settings, authentication, unreadable input, etc.)
//! - 2: argument validation error (clap handles this automatically)

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use opsramp_lc::auth::TokenProvider;
use opsramp_lc::batch::{
    self, OutputFormat, lookup, membership, read_rows, tagging, unmanage, write_records,
};
use opsramp_lc::client::OpsRampClient;
use opsramp_lc::config::{Overrides, Settings};
use opsramp_lc::error::Result;
use opsramp_lc::jobs::MISSING_PATCHES_JOB;
use opsramp_lc::tags::ClearPolicy;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Settings file (TOML). Flags and environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// API subdomain: `{subdomain}.api.opsramp.com`.
    #[arg(long, global = true, env = "OPSRAMP_SUBDOMAIN")]
    subdomain: Option<String>,

    /// Tenant searched for devices (usually the partner tenant).
    #[arg(long, global = true, env = "OPSRAMP_TENANT_ID")]
    tenant_id: Option<String>,

    /// OAuth client key.
    #[arg(long, global = true, env = "OPSRAMP_CLIENT_KEY")]
    client_key: Option<String>,

    /// OAuth client secret. Prefer the OPSRAMP_CLIENT_SECRET environment
    /// variable to keep the secret out of process listings and shell
    /// history.
    #[arg(long, global = true, env = "OPSRAMP_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Report format: json, yaml, xml, csv or xlsx.
    #[arg(long, global = true)]
    format: Option<OutputFormat>,

    /// Report path. Defaults to a per-command name in the working directory.
    #[arg(long, short, global = true)]
    output: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace). RUST_LOG wins when set.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

/// The input sheet every subcommand reads.
#[derive(Args)]
struct InputArgs {
    /// Spreadsheet (.xlsx or .csv) with a header row.
    #[arg(long, short)]
    input: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Write an inventory record for every listed device.
    Lookup {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Unmanage every listed device.
    Unmanage {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Assign one tag value to every listed device.
    Tag {
        #[command(flatten)]
        input: InputArgs,

        /// Tag name (created when missing).
        #[arg(long)]
        tag: String,

        /// Tag value (created when missing).
        #[arg(long)]
        value: String,

        /// Unassign the tag before assigning instead of only on conflict.
        #[arg(long)]
        clear_first: bool,
    },

    /// Add listed devices to a patch configuration.
    PatchAdd {
        #[command(flatten)]
        input: InputArgs,

        /// Configuration id.
        #[arg(long, required_unless_present = "by_convention")]
        config_id: Option<String>,

        /// Pick each client's configuration by the server naming convention.
        #[arg(long, conflicts_with = "config_id")]
        by_convention: bool,

        /// Tenant owning the configuration (defaults to --tenant-id).
        #[arg(long)]
        target_tenant: Option<String>,
    },

    /// Add listed devices to a job unless another job of the same type
    /// already holds them.
    JobAdd {
        #[command(flatten)]
        input: InputArgs,

        /// Job id.
        #[arg(long)]
        job_id: String,

        /// Job type checked for conflicting membership.
        #[arg(long, default_value = MISSING_PATCHES_JOB)]
        job_type: String,

        /// Tenant owning the job (defaults to --tenant-id).
        #[arg(long)]
        target_tenant: Option<String>,
    },
}

impl Command {
    fn input(&self) -> &Path {
        match self {
            Command::Lookup { input }
            | Command::Unmanage { input }
            | Command::Tag { input, .. }
            | Command::PatchAdd { input, .. }
            | Command::JobAdd { input, .. } => &input.input,
        }
    }

    /// Default report name without extension.
    fn report_stem(&self) -> &'static str {
        match self {
            Command::Lookup { .. } => "all_servers_filtered",
            Command::Unmanage { .. } => "Unmanage_output",
            Command::Tag { .. } => "Tagging_output",
            Command::PatchAdd { .. } => "PatchConfig_output",
            Command::JobAdd { .. } => "Job_output",
        }
    }

    fn xml_root(&self) -> &'static str {
        match self {
            Command::Unmanage { .. } => unmanage::XML_ROOT,
            _ => "root",
        }
    }
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            subdomain: self.subdomain.clone(),
            tenant_id: self.tenant_id.clone(),
            client_key: self.client_key.clone(),
            client_secret: self.client_secret.clone(),
            format: self.format,
            output: self.output.clone(),
        }
    }
}

fn init_logging(level: Option<&str>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if std::env::var_os("RUST_LOG").is_none() {
        if let Some(level) = level {
            builder.parse_filters(level);
        }
    }
    builder.init();
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref())?.overlay(cli.overrides());
    let conn = settings.credentials()?;
    let rows = read_rows(cli.command.input(), settings.input_columns())?;
    if rows.is_empty() {
        log::warn!("No server names found in the input sheet. Nothing to do.");
        return Ok(());
    }

    let auth = TokenProvider::new(&conn.subdomain, conn.credentials);
    let client = OpsRampClient::new(&conn.subdomain, auth, settings.client_options())?;
    client.authenticate().await?;
    let tenant = conn.tenant_id.as_str();

    let records = match &cli.command {
        Command::Lookup { .. } => lookup::run(&client, tenant, &rows).await,
        Command::Unmanage { .. } => unmanage::run(&client, tenant, &rows).await,
        Command::Tag {
            tag,
            value,
            clear_first,
            ..
        } => {
            let request = tagging::TagRequest {
                tag: tag.clone(),
                value: value.clone(),
                policy: if *clear_first {
                    ClearPolicy::Always
                } else {
                    ClearPolicy::OnConflict
                },
            };
            tagging::run(&client, tenant, &rows, &request).await
        }
        Command::PatchAdd {
            config_id,
            target_tenant,
            ..
        } => {
            let target = match config_id {
                Some(config_id) => membership::Target::PatchConfig {
                    tenant: target_tenant.clone().unwrap_or_else(|| tenant.to_string()),
                    config_id: config_id.clone(),
                },
                None => membership::Target::PatchConvention,
            };
            membership::run(&client, tenant, &rows, &target).await
        }
        Command::JobAdd {
            job_id,
            job_type,
            target_tenant,
            ..
        } => {
            let target = membership::Target::Job {
                tenant: target_tenant.clone().unwrap_or_else(|| tenant.to_string()),
                job_id: job_id.clone(),
                job_type: job_type.clone(),
            };
            membership::run(&client, tenant, &rows, &target).await
        }
    };

    let failed = records
        .iter()
        .filter(|r| {
            r.get("status")
                .or_else(|| r.get(lookup::LOOKUP_STATUS))
                .and_then(|s| s.as_str())
                .is_some_and(|s| s.starts_with("Error") || s == batch::NO_RESOURCE)
        })
        .count();

    let path = settings.output_path(cli.command.report_stem());
    write_records(&records, settings.output.format, &path, cli.command.xml_root())?;
    println!(
        "{} rows processed ({failed} failed); report written to {}",
        records.len(),
        path.display()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
