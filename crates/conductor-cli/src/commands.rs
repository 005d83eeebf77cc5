use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::CommandFactory;

use conductor_cache::Cache;
use conductor_engine::{Config, Engine};
use conductor_query::{get_project_metrics, SessionFilter};
use conductor_store::{SqliteStore, Store};

use crate::args::{Cli, Commands};

const DEFAULT_CACHE_SIZE: usize = 256;
const STATS_DB_FILE: &str = "conductor.db";
const CONFIG_FILE: &str = "config.toml";

pub fn run(cli: Cli) -> Result<()> {
    let data_dir = conductor_discovery::expand_tilde(&cli.data_dir);

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Run {
            root,
            pattern,
            batch_size,
            batch_timeout_ms,
        } => handle_run(&data_dir, &root, &pattern, batch_size, batch_timeout_ms),
        Commands::Project {
            name,
            root,
            since,
            until,
            search,
            errors_only,
            json,
        } => handle_project(&name, &root, since, until, search, errors_only, json),
        Commands::Init { root, force } => handle_init(&data_dir, &root, force),
    }
}

fn handle_run(
    data_dir: &Path,
    root: &str,
    pattern: &str,
    batch_size: Option<usize>,
    batch_timeout_ms: Option<u64>,
) -> Result<()> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    let db_path = data_dir.join(STATS_DB_FILE);
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&db_path)?);

    let mut config = Config::new(conductor_discovery::expand_tilde(root));
    config.pattern = pattern.to_string();
    if let Some(size) = batch_size {
        config.batch_size = size;
    }
    if let Some(timeout) = batch_timeout_ms {
        config.batch_timeout_ms = timeout;
    }
    let config = config.normalized();

    let mut engine = Engine::new(config, store);
    engine.start().context("starting ingestion engine")?;
    println!("conductor: watching {} (ctrl-c to stop)", root);

    signal::install_sigint_handler();
    while !signal::should_stop() {
        std::thread::sleep(std::time::Duration::from_millis(500));
    }

    println!("conductor: shutting down");
    engine.stop().context("stopping ingestion engine")?;
    Ok(())
}

fn handle_project(
    name: &str,
    root: &str,
    since: Option<String>,
    until: Option<String>,
    search: String,
    errors_only: bool,
    json: bool,
) -> Result<()> {
    let mut filter = SessionFilter::new().search(search).errors_only(errors_only);
    if let Some(since) = since {
        filter = filter.since(&since)?;
    }
    if let Some(until) = until {
        filter = filter.until(&until)?;
    }

    let cache = Cache::new(DEFAULT_CACHE_SIZE);
    let base_dir = conductor_discovery::expand_tilde(root);
    let metrics = get_project_metrics(name, &base_dir, &filter, &cache)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        println!("project: {name}");
        println!("  sessions:     {}", metrics.total_sessions);
        println!("  success rate: {:.1}%", metrics.success_rate * 100.0);
        println!("  errors:       {}", metrics.total_errors);
        println!("  total cost:   ${:.4}", metrics.total_cost);
        println!("  avg duration: {:.0}ms", metrics.average_duration);
    }
    Ok(())
}

fn handle_init(data_dir: &Path, root: &str, force: bool) -> Result<()> {
    let path: PathBuf = data_dir.join(CONFIG_FILE);
    if path.exists() && !force {
        anyhow::bail!("{} already exists; pass --force to overwrite", path.display());
    }
    let config = Config::new(conductor_discovery::expand_tilde(root));
    config.save_to(&path)?;
    println!("wrote {}", path.display());
    Ok(())
}

mod signal {
    use std::sync::atomic::{AtomicBool, Ordering};

    static SHOULD_STOP: AtomicBool = AtomicBool::new(false);

    pub fn should_stop() -> bool {
        SHOULD_STOP.load(Ordering::SeqCst)
    }

    /// Installs a SIGINT handler that flips `SHOULD_STOP` so `Run` can
    /// drive `Engine::stop` itself rather than exiting mid-flush. Reuses
    /// the same raw `libc::signal` mechanism already used for the SIGPIPE
    /// reset in `main`, rather than pulling in a signal-handling crate.
    #[cfg(unix)]
    pub fn install_sigint_handler() {
        unsafe {
            libc::signal(libc::SIGINT, handle_sigint as libc::sighandler_t);
        }
    }

    #[cfg(not(unix))]
    pub fn install_sigint_handler() {}

    #[cfg(unix)]
    extern "C" fn handle_sigint(_: i32) {
        SHOULD_STOP.store(true, Ordering::SeqCst);
    }
}
