use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use config::{AppConfig, ConfigStore};
use core_orchestrator::JournalCore;
use i18n::I18n;
use remote_gateway::HttpJournalGateway;
use secrets::{SecretStore, SessionTokenStore, default_secret_dir_from};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod shell;

use shell::{Flow, Shell};

#[derive(Parser)]
#[command(name = "journal", about = "Personal journal client", long_about = None)]
struct Cli {
    /// Directory holding config, the session token and logs
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Journal service base url for this run only
    #[arg(long)]
    base_url: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    if let Err(err) = fs::create_dir_all(&data_dir) {
        eprintln!("failed to prepare data dir: {err}");
    }
    let _log_guard = init_local_logger(&data_dir.join("logs"));

    let config_store = ConfigStore::from_dir(data_dir.join("config"));
    let mut config = match config_store.load_or_init() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to load config: {err}");
            AppConfig::default()
        }
    }
    .with_env_overrides();
    if let Some(base_url) = cli.base_url {
        config.api.base_url = base_url;
    }

    let gateway = match HttpJournalGateway::with_timeout(
        &config.api.base_url,
        config.api.request_timeout_secs.map(Duration::from_secs),
    ) {
        Ok(gateway) => gateway,
        Err(err) => {
            error!("failed to build journal gateway: {err:#}");
            eprintln!("{err:#}");
            return;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to create tokio runtime: {err}");
            return;
        }
    };

    let tokens = SessionTokenStore::new(
        SecretStore::new(default_secret_dir_from(&data_dir)),
        config.session.token_key.clone(),
    );
    let core = JournalCore::launch(Arc::new(gateway), tokens);
    info!(mode = %core.mode(), base_url = %config.api.base_url, "journal started");

    let i18n = I18n::new(config.language);
    if let Err(err) = run_shell(&runtime, &core, &i18n) {
        error!("shell terminated: {err}");
        eprintln!("{err}");
    }
}

fn run_shell(
    runtime: &tokio::runtime::Runtime,
    core: &JournalCore,
    i18n: &I18n,
) -> io::Result<()> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = io::stdout();
    let mut shell = Shell::new(core, i18n);

    writeln!(out, "{}", i18n.t("app.title"))?;
    loop {
        write!(out, "{}", shell.prompt())?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let flow = runtime.block_on(shell.handle_line(&line, &mut input, &mut out))?;
        if flow == Flow::Quit {
            return Ok(());
        }
    }
}

fn default_data_dir() -> PathBuf {
    let mut data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    data_dir.push("journal");
    data_dir
}

fn init_local_logger(log_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    if let Err(err) = fs::create_dir_all(log_dir) {
        eprintln!("failed to create log dir `{}`: {err}", log_dir.display());
    }
    let file_appender = tracing_appender::rolling::daily(log_dir, "journal.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,app_cli=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_writer(writer)
        .init();

    guard
}
