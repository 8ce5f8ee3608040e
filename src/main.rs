use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use expiration_jobs::config::AppConfig;
use expiration_jobs::job::discovery::Discovery;
use expiration_jobs::job::executor::{CancelExecutor, StartExecutor};
use expiration_jobs::job::{ExpirationJob, JobScheduler};
use expiration_jobs::params::{
    check_parameter_set_change, ParameterProvider, ParameterSetChange, ParameterSetRecord,
    StaticParameterProvider, VaultParameterProvider,
};
use expiration_jobs::platform::vault::VaultHttpClient;
use expiration_jobs::platform::VaultApiClient;
use expiration_jobs::shutdown::wait_for_shutdown;

#[derive(Parser)]
#[command(
    name = "expiration-jobs",
    about = "Starts and cancels expiration pending workflows on vault documents"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one complete job: discovery, task execution and completion report
    Run,
    /// Run discovery only and print the work items as JSON
    Discover,
    /// Check a parameter set change against the edit rules
    CheckParams {
        /// Current record as JSON (`name__v`, `parameters__c`)
        #[arg(long)]
        current: PathBuf,
        /// Proposed record as JSON
        #[arg(long, required_unless_present = "delete", conflicts_with = "delete")]
        proposed: Option<PathBuf>,
        /// Check a deletion instead of an update
        #[arg(long)]
        delete: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    match cli.command {
        Command::Run => {
            let config = AppConfig::load(cli.config.as_deref())?;
            tracing::info!(
                vault = %config.vault.base_url,
                task_size = config.job.task_size,
                max_concurrent_tasks = config.job.max_concurrent_tasks,
                "Starting expiration job"
            );

            let scheduler = JobScheduler::from_config(&config.job);
            let job = Arc::new(build_job(&config)?);
            let outcome = scheduler.run(job, wait_for_shutdown()).await?;

            if !outcome.succeeded() {
                anyhow::bail!(
                    "{} tasks failed out of {}",
                    outcome.failed_tasks,
                    outcome.total_tasks
                );
            }
        }
        Command::Discover => {
            let config = AppConfig::load(cli.config.as_deref())?;
            let items = build_job(&config)?.init().await?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        Command::CheckParams {
            current,
            proposed,
            delete,
        } => {
            let current = read_record(&current)?;
            let result = match proposed {
                Some(path) if !delete => {
                    let changes = [(current, read_record(&path)?)];
                    check_parameter_set_change(&ParameterSetChange::Update(&changes))
                }
                _ => check_parameter_set_change(&ParameterSetChange::Delete),
            };

            match result {
                Ok(()) => println!("Change allowed"),
                Err(e) => anyhow::bail!("Change denied: {e}"),
            }
        }
    }

    Ok(())
}

fn build_job(config: &AppConfig) -> anyhow::Result<ExpirationJob> {
    let transport = Arc::new(VaultHttpClient::new(&config.vault)?);
    let api = VaultApiClient::new(transport, &config.vault.api_version);
    let job_config = Arc::new(config.job.clone());

    let parameters: Arc<dyn ParameterProvider> = match config.parameters {
        Some(params) => Arc::new(StaticParameterProvider(params)),
        None => Arc::new(VaultParameterProvider::new(
            Arc::new(api.clone()),
            &job_config.parameter_set,
        )),
    };

    let today = chrono::Local::now().date_naive();
    tracing::debug!(today = %today, "Resolved run date");

    Ok(ExpirationJob::new(
        parameters,
        Discovery::new(Arc::new(api.clone()), api.clone(), Arc::clone(&job_config)),
        StartExecutor::new(Arc::new(api.clone()), api.clone(), job_config, today),
        CancelExecutor::new(api),
        today,
    ))
}

fn read_record(path: &Path) -> anyhow::Result<ParameterSetRecord> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
