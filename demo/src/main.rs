//! Raxol Audit Engine demo CLI
//!
//! Drives the logger, storage engine and exporter against a local store.
//!
//! Usage:
//!   cargo run -p demo -- seed --rounds 3
//!   cargo run -p demo -- query --user alice
//!   cargo run -p demo -- export --format cef --output out/audit.cef
//!   cargo run -p demo -- report --framework hipaa --format pdf --output out/hipaa.html
//!   cargo run -p demo -- stats
//!   cargo run -p demo -- verify --hours 24
//!   cargo run -p demo -- purge

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use raxol_audit::{AuditLogger, EventContext, InMemoryEventStore};
use raxol_contracts::{
    AuditConfig, AuditEvent, AuditResult, KeySource, Outcome, QueryFilters, QueryOptions, Severity,
    TimeRange,
};
use raxol_core::KeyMaterial;
use raxol_export::{ExportFormat, ExportOptions, ExportService, Exporter, Framework, PdfTemplate};
use raxol_storage::StorageService;

const HOUR_MS: i64 = 3_600_000;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Raxol audit and compliance engine demo.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "Raxol audit engine demo",
    long_about = "Seeds, queries, exports and verifies a local Raxol audit store.\n\
                  Set RUST_LOG=debug to watch the pipeline."
)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override `storage_path` from the configuration.
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log a representative mix of events.
    Seed {
        /// How many times to repeat the scenario set.
        #[arg(long, default_value_t = 1)]
        rounds: usize,
    },
    /// Print matching events as JSON lines.
    Query {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        severity: Option<Severity>,
        #[arg(long)]
        event_type: Option<String>,
        /// Full-text search over descriptions, commands and error messages.
        #[arg(long)]
        text: Option<String>,
        /// Only events from the last N hours.
        #[arg(long)]
        hours: Option<i64>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = QueryOptions::DEFAULT_LIMIT)]
        limit: usize,
    },
    /// Export events to a file.
    Export {
        #[arg(long, default_value = "json")]
        format: ExportFormat,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        hours: Option<i64>,
        #[arg(long, default_value = "default")]
        template: PdfTemplate,
        #[arg(long)]
        compress: bool,
        /// Encrypt under a one-off key, printed after the export.
        #[arg(long)]
        encrypt: bool,
        #[arg(long)]
        sign: bool,
    },
    /// Generate a compliance report.
    Report {
        #[arg(long)]
        framework: Framework,
        #[arg(long, default_value = "json")]
        format: ExportFormat,
        #[arg(long, default_value_t = 24)]
        hours: i64,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print storage statistics.
    Stats,
    /// Re-verify every signature in a recent window.
    Verify {
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
    /// Delete events older than the retention period.
    Purge,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Demo error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> AuditResult<()> {
    let config = load_config(&cli)?;
    let keys = KeyMaterial::from_source(&config.keys)?;
    let storage = StorageService::start(&config)?;

    let result = match cli.command {
        Command::Seed { rounds } => seed(&config, &keys, &storage, rounds),
        Command::Query {
            user,
            severity,
            event_type,
            text,
            hours,
            offset,
            limit,
        } => {
            let mut filters = QueryFilters::new();
            filters.user_id = user;
            filters.severity = severity;
            filters.event_type = event_type;
            filters.text_search = text;
            if let Some(hours) = hours {
                filters = filters.since(window(hours).start);
            }
            query(&storage, filters, QueryOptions::page(offset, limit))
        }
        Command::Export {
            format,
            output,
            hours,
            template,
            compress,
            encrypt,
            sign,
        } => {
            let mut opts = ExportOptions::default().template(template);
            if compress {
                opts = opts.compressed();
            }
            if encrypt {
                opts = opts.encrypted(None);
            }
            if sign {
                opts = opts.signed();
            }
            let filters = hours.map(|h| window(h).to_filters()).unwrap_or_default();
            export(&keys, &storage, format, filters, opts, output)
        }
        Command::Report {
            framework,
            format,
            hours,
            output,
        } => report(&keys, &storage, framework, format, window(hours), output),
        Command::Stats => stats(&storage),
        Command::Verify { hours } => verify(&config, &keys, &storage, window(hours)),
        Command::Purge => purge(&config, &keys, &storage),
    };

    storage.shutdown()?;
    result
}

/// Read the configuration, then keep demo keys on disk next to the store so
/// signatures still verify on the next run.
fn load_config(cli: &Cli) -> AuditResult<AuditConfig> {
    let mut config = match &cli.config {
        Some(path) => AuditConfig::from_file(path)?,
        None => AuditConfig::default(),
    };
    if let Some(storage) = &cli.storage {
        config.storage_path = storage.clone();
    }
    if config.keys == KeySource::Ephemeral {
        config.keys = KeySource::File {
            path: config.storage_path.join("demo.key"),
        };
    }
    config.validate()?;
    Ok(config)
}

fn window(hours: i64) -> TimeRange {
    TimeRange::last(hours.max(0) * HOUR_MS)
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn start_logger(config: &AuditConfig, keys: &KeyMaterial, storage: &StorageService) -> AuditResult<AuditLogger> {
    AuditLogger::builder(config.clone(), storage.handle())
        .keys(keys.clone())
        .event_store(Arc::new(InMemoryEventStore::new()))
        .alert_handler(Arc::new(|event: &AuditEvent| -> AuditResult<()> {
            println!(
                "  ALERT [{}] {} ({})",
                event.severity,
                event.event_type(),
                event.body.description.as_deref().unwrap_or("no description")
            );
            Ok(())
        }))
        .start()
}

fn seed(config: &AuditConfig, keys: &KeyMaterial, storage: &StorageService, rounds: usize) -> AuditResult<()> {
    let logger = start_logger(config, keys, storage)?;
    let office = || EventContext::new().ip("10.0.0.5").session("sess-42");

    for round in 0..rounds {
        logger.log_authentication("alice", "password", Outcome::Failure, office())?;
        logger.log_authentication("alice", "password", Outcome::Success, office())?;
        logger.log_authorization(
            "bob",
            "file",
            "/etc/shadow",
            "read",
            Outcome::Denied,
            Some("missing role: admin"),
            EventContext::new().ip("10.0.0.7"),
        )?;
        logger.log_data_access("carol", "read", "patient_record", "p-1001", Some("phi"), office())?;
        logger.log_data_access("carol", "export", "card_vault", "v-7", Some("cardholder"), office())?;
        logger.log_configuration_change("root", "session_timeout", json!(900), json!(3600), office())?;
        logger.log_terminal_command("bob", "sudo systemctl restart sshd", Outcome::Success, Some(Severity::High), office())?;
        logger.log_privacy_event("subject-17", "erasure", Some(Outcome::Success), EventContext::new().user("dpo"))?;
        logger.log_compliance_event("access_review", "quarterly access review completed", EventContext::new().user("auditor"))?;
        if round == 0 {
            logger.log_security_event(
                "brute_force_detected",
                Severity::Critical,
                "20 failed logins for alice within 60s",
                EventContext::new().ip("203.0.113.9"),
            )?;
        }
    }

    let flushed = logger.flush()?;
    let status = logger.status()?;
    logger.shutdown();
    info!(rounds, flushed, "seed complete");
    println!(
        "Seeded {} events ({} flushed, {} alerts). Signing key {}.",
        status.logged, status.flushed, status.alerts_dispatched, status.key_fingerprint
    );
    Ok(())
}

fn query(storage: &StorageService, filters: QueryFilters, options: QueryOptions) -> AuditResult<()> {
    let records = storage.handle().query(filters, options)?;
    for record in &records {
        println!("{}", serde_json::to_string(record)?);
    }
    eprintln!("{} record(s)", records.len());
    Ok(())
}

fn export_service(keys: &KeyMaterial, storage: &StorageService) -> AuditResult<ExportService> {
    ExportService::start(Exporter::new(storage.handle()).with_keys(keys.clone()))
}

fn export(
    keys: &KeyMaterial,
    storage: &StorageService,
    format: ExportFormat,
    filters: QueryFilters,
    opts: ExportOptions,
    output: PathBuf,
) -> AuditResult<()> {
    let service = export_service(keys, storage)?;
    let artifact = service.handle().export_to_file(format, filters, opts, &output)?;
    service.shutdown();

    println!(
        "Exported {} event(s) as {} to {} ({} bytes).",
        artifact.event_count,
        artifact.format,
        output.display(),
        artifact.payload.len()
    );
    if let Some(key) = &artifact.key_custody {
        println!("Encryption key (store it separately): {}", key);
    }
    if let Some(signature) = &artifact.signature {
        println!("Signature: {}", signature);
    }
    Ok(())
}

fn report(
    keys: &KeyMaterial,
    storage: &StorageService,
    framework: Framework,
    format: ExportFormat,
    range: TimeRange,
    output: Option<PathBuf>,
) -> AuditResult<()> {
    let service = export_service(keys, storage)?;
    let rendered = service.handle().generate_compliance_report(framework, range, format)?;
    service.shutdown();

    let summary = &rendered.report.summary;
    println!(
        "{} report: {} events, {}/{} controls satisfied, {} need review.",
        framework.title(),
        summary.total_events,
        summary.controls_satisfied,
        summary.controls_evaluated,
        summary.controls_needing_review
    );
    for finding in &rendered.report.findings {
        println!(
            "  {:<24} {:?} (evidence {}, exceptions {})",
            finding.control_id, finding.status, finding.evidence_count, finding.exception_count
        );
    }
    if let Some(path) = output {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &rendered.document)?;
        println!("Report written to {}.", path.display());
    }
    Ok(())
}

fn stats(storage: &StorageService) -> AuditResult<()> {
    let stats = storage.handle().statistics()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn verify(config: &AuditConfig, keys: &KeyMaterial, storage: &StorageService, range: TimeRange) -> AuditResult<()> {
    let logger = start_logger(config, keys, storage)?;
    let report = logger.verify_integrity(range)?;
    logger.shutdown();

    println!(
        "Checked {}: {} valid, {} unsigned, {} unverifiable, {} tampered.",
        report.checked,
        report.valid,
        report.unsigned,
        report.unverifiable,
        report.tampered.len()
    );
    for id in &report.tampered {
        println!("  tampered: {}", id);
    }
    Ok(())
}

fn purge(config: &AuditConfig, keys: &KeyMaterial, storage: &StorageService) -> AuditResult<()> {
    let logger = start_logger(config, keys, storage)?;
    let removed = logger.run_retention()?;
    logger.shutdown();
    println!(
        "Removed {} event(s) older than {} days.",
        removed, config.retention_days
    );
    Ok(())
}
