//! Entry point: load a sync plan, log into every registry, expand it into
//! tasks, build the dependency DAG, and execute it (spec §4.6, §6.2).

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use registry_client::{CraneRegistryClient, RegistryOps};
use structopt::StructOpt;
use sync_core::{config, executor, expand, plan};

/// Copy container images between OCI registries according to a declarative
/// sync plan.
#[derive(Debug, StructOpt)]
#[structopt(name = "reposync")]
struct CliOptions {
    /// Path to the YAML configuration document
    #[structopt(parse(from_os_str))]
    config_file: PathBuf,

    /// Validate the configuration and exit without syncing anything
    #[structopt(long = "verify-only")]
    verify_only: bool,

    /// Upper bound on concurrently in-flight sync tasks
    #[structopt(long = "parallel-sync-tasks", default_value = "10")]
    parallel_sync_tasks: usize,

    /// An empty tags list means "nothing to sync" rather than "every
    /// discovered tag"
    #[structopt(long = "use-explicit-tags")]
    use_explicit_tags: bool,

    /// Emit debug-level logs, including subprocess command lines
    #[structopt(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let options = CliOptions::from_args();
    commons::logging::init(options.debug);

    if let Err(e) = run(options).await {
        log::error!("{:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(options: CliOptions) -> Result<()> {
    let started = Instant::now();

    let configuration = config::load(&options.config_file)
        .with_context(|| format!("loading {}", options.config_file.display()))?;
    log::debug!(
        "loaded configuration: {} registries, {} stages",
        configuration.registries.len(),
        configuration.stages.len()
    );

    if options.verify_only {
        log::info!("configuration is valid");
        return Ok(());
    }

    let registry = CraneRegistryClient::new();

    for (key, entry) in &configuration.registries {
        log::info!("logging into registry '{}' ({})", key, entry.url);
        registry
            .login(&entry.url, &entry.user, &entry.password)
            .await
            .with_context(|| format!("logging into registry '{}'", key))?;
    }

    let tasks = expand::expand(&configuration, &registry, options.use_explicit_tags)
        .await
        .context("expanding sync tasks")?;
    log::info!("expanded {} sync tasks", tasks.len());

    let execution_plan = plan::build(tasks, &configuration.stages).context("building plan")?;

    executor::execute(
        &configuration,
        &execution_plan,
        &registry,
        options.parallel_sync_tasks,
    )
    .await
    .context("executing sync plan")?;

    log::info!("finished in {:?}", started.elapsed());
    Ok(())
}
