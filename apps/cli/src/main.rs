use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};

use wipeforge_certificate::{VerificationOutcome, VerificationService};
use wipeforge_core::{
    advisor, policy_catalog, DeviceFacts, DeviceType, PolicyName, Role,
};
use wipeforge_notify::TracingNotifier;
use wipeforge_orchestrator::driver::{
    DriverConfig, FixedProbe, ProgressDriver, ProgressPolicy, SeededProbe, VerificationProbe,
};
use wipeforge_orchestrator::{JobRequest, Orchestrator, StaticRoleOracle};
use wipeforge_registry::{discover, Registry};
use wipeforge_safety::{confirm_wipe, confirmation_phrase, SafetyContext, SafetyDecision};
use wipeforge_store::stats::WipeStats;
use wipeforge_store::{AuditStore, CertificateStore, JobStore, MemoryStore};

#[derive(Parser)]
#[command(name = "wipeforge")]
#[command(about = "Secure data erasure orchestration")]
struct Cli {
    /// Snapshot file backing the store
    #[arg(long, default_value = "wipeforge.json", global = true)]
    data_file: PathBuf,

    /// Caller identity used for role checks and audit entries
    #[arg(long = "as", default_value = "operator@local", global = true)]
    identity: String,

    /// Role granted to the caller identity
    #[arg(long, default_value = "operator", global = true)]
    role: Role,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered devices
    Devices,
    /// Register a device manually
    Register {
        #[arg(long)]
        path: String,
        #[arg(long = "type")]
        device_type: DeviceType,
        #[arg(long)]
        model: String,
        #[arg(long)]
        serial: String,
        #[arg(long)]
        size_bytes: u64,
    },
    /// Import block devices discovered on this host
    Discover {
        /// Register everything found instead of just printing it
        #[arg(long)]
        register: bool,
    },
    /// Mark a device protected (never a wipe target)
    Protect { device_id: String },
    /// Clear a device's protected flag (elevated operation)
    Unprotect { device_id: String },
    /// List the wipe policy catalog
    Policies,
    /// Suggest a policy for a device type and security requirement
    Suggest {
        #[arg(long = "type")]
        device_type: DeviceType,
        #[arg(long, default_value = "routine decommission")]
        requirement: String,
    },
    /// Queue a wipe job against a registered device
    Wipe {
        device_id: String,
        #[arg(long, default_value = "standard")]
        policy: PolicyName,
        /// Confirmation phrase, exactly "WIPE <device path>"
        #[arg(long)]
        confirm: Option<String>,
        #[arg(long = "notify")]
        notify: Vec<String>,
    },
    /// Queue a file-wipe job
    WipeFile {
        file_name: String,
        #[arg(long)]
        size_bytes: u64,
        #[arg(long, default_value = "application/octet-stream")]
        file_type: String,
        #[arg(long, default_value = "quick")]
        policy: PolicyName,
        #[arg(long = "notify")]
        notify: Vec<String>,
    },
    /// List jobs, newest first
    Jobs,
    /// Show one job with its full log
    Job { job_id: String },
    /// Start a queued job
    Start { job_id: String },
    /// Cancel a queued or in-flight job
    Cancel { job_id: String },
    /// Requeue a failed job
    Retry { job_id: String },
    /// Run the progress driver until all jobs are terminal
    Drive {
        #[arg(long, default_value_t = 500)]
        tick_ms: u64,
        #[arg(long, default_value_t = 10.0)]
        percent: f64,
        /// Verification pass rate for the seeded demo probe; omit for a
        /// probe that always passes
        #[arg(long)]
        pass_rate: Option<f64>,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// List issued certificates
    Certs,
    /// Publicly verify a certificate by its public id
    Verify { certificate_id: String },
    /// Fleet statistics over all jobs
    Stats,
    /// Show the audit trail
    Audit,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .init();
    }

    let store = Arc::new(MemoryStore::open(&cli.data_file)?);
    let oracle = Arc::new(StaticRoleOracle::new(Role::None).with_role(cli.identity.as_str(), cli.role));
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        oracle,
        Arc::new(TracingNotifier),
    ));
    let registry = Registry::new(store.clone());
    let identity = cli.identity.as_str();

    match cli.command {
        Commands::Devices => {
            println!("{}", serde_json::to_string_pretty(&registry.devices()?)?);
        }
        Commands::Register {
            path,
            device_type,
            model,
            serial,
            size_bytes,
        } => {
            let device = registry.register(
                DeviceFacts {
                    path,
                    device_type,
                    model,
                    serial,
                    size_bytes,
                },
                identity,
            )?;
            println!("{}", serde_json::to_string_pretty(&device)?);
        }
        Commands::Discover { register } => {
            let facts = discover::linux_block_devices()?;
            if !register {
                println!("{}", serde_json::to_string_pretty(&facts)?);
            } else {
                for entry in facts {
                    match registry.register(entry, identity) {
                        Ok(device) => println!("registered {} ({})", device.path, device.serial),
                        Err(err) => eprintln!("skipped: {}", err),
                    }
                }
            }
        }
        Commands::Protect { device_id } => {
            let device = registry.mark_protected(&device_id, identity)?;
            println!("{} is now {}", device.path, device.status);
        }
        Commands::Unprotect { device_id } => {
            if cli.role != Role::Admin {
                return Err(anyhow!("clearing protection requires --role admin"));
            }
            let device = registry.clear_protected(&device_id, identity)?;
            println!("{} is now {}", device.path, device.status);
        }
        Commands::Policies => {
            println!("{}", serde_json::to_string_pretty(&policy_catalog())?);
        }
        Commands::Suggest {
            device_type,
            requirement,
        } => {
            let suggestion = advisor::suggest(device_type, &requirement);
            println!("{}", serde_json::to_string_pretty(&suggestion)?);
        }
        Commands::Wipe {
            device_id,
            policy,
            confirm,
            notify,
        } => {
            let device = registry.device(&device_id)?;
            let ctx = SafetyContext {
                confirmation: confirm,
            };
            if let SafetyDecision::Deny(reason) = confirm_wipe(&ctx, &device) {
                eprintln!("{}", reason);
                eprintln!("hint: pass --confirm \"{}\"", confirmation_phrase(&device));
                return Err(anyhow!("wipe not confirmed"));
            }
            let job = orchestrator.create_job(
                JobRequest::Device {
                    device_id: device.id,
                },
                policy,
                identity,
                &notify,
            )?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Commands::WipeFile {
            file_name,
            size_bytes,
            file_type,
            policy,
            notify,
        } => {
            let job = orchestrator.create_job(
                JobRequest::File {
                    file_name,
                    file_size: size_bytes,
                    file_type,
                },
                policy,
                identity,
                &notify,
            )?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Commands::Jobs => {
            for job in orchestrator.jobs(identity)? {
                println!(
                    "{}  {:<10} {:>5.1}%  {}",
                    job.job_id,
                    job.status.to_string(),
                    job.progress,
                    job.target.describe()
                );
            }
        }
        Commands::Job { job_id } => {
            let job = orchestrator.job(&job_id, identity)?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Commands::Start { job_id } => {
            let job = orchestrator.start(&job_id, identity)?;
            println!("{} is now {}", job.job_id, job.status);
        }
        Commands::Cancel { job_id } => {
            let job = orchestrator.cancel(&job_id, identity)?;
            println!("{} is now {}", job.job_id, job.status);
        }
        Commands::Retry { job_id } => {
            let job = orchestrator.retry(&job_id, identity)?;
            println!("{} is now {} (attempt {})", job.job_id, job.status, job.attempt);
        }
        Commands::Drive {
            tick_ms,
            percent,
            pass_rate,
            seed,
        } => {
            let probe: Box<dyn VerificationProbe> = match pass_rate {
                Some(rate) => Box::new(SeededProbe::new(seed, rate)),
                None => Box::new(FixedProbe::passing()),
            };
            let driver = ProgressDriver::new(
                orchestrator.clone(),
                DriverConfig {
                    tick: Duration::from_millis(tick_ms),
                    policy: ProgressPolicy::FixedPercent(percent),
                    auto_start: true,
                },
                probe,
            );
            let ticks = driver.run_until_idle(None)?;
            println!("drove all jobs to a terminal state in {} ticks", ticks);
            for job in store.jobs()? {
                println!("{}  {}", job.job_id, job.status);
            }
        }
        Commands::Certs => {
            println!("{}", serde_json::to_string_pretty(&store.certificates()?)?);
        }
        Commands::Verify { certificate_id } => {
            let service = VerificationService::new(store.clone());
            match service.lookup(&certificate_id) {
                VerificationOutcome::Verified(certificate) => {
                    println!("Verified");
                    println!("{}", serde_json::to_string_pretty(&certificate)?);
                }
                VerificationOutcome::Invalid { certificate_id } => {
                    println!("Invalid certificate: {}", certificate_id);
                }
            }
        }
        Commands::Stats => {
            let stats = WipeStats::from_jobs(&store.jobs()?);
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Audit => {
            for event in store.events()? {
                println!(
                    "{}  {:<24} {:<10} {}",
                    event.at,
                    event.action,
                    event.job_id.as_deref().unwrap_or("-"),
                    event.actor
                );
            }
        }
    }

    Ok(())
}
