use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tfunc::arm::{Credentials, Site, SiteContext};
use tfunc::cache::{HttpResourceCache, HttpTransport, ResourceCache};
use tfunc::config::Config;
use tfunc::functions::{FileRef, FunctionAppService, FunctionInfo, ServiceSettings};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Console for serverless function apps
#[derive(Parser, Debug)]
#[command(name = "tfunc", version, about, long_about = None)]
struct Args {
    /// Site resource id (/subscriptions/.../sites/<name>); defaults to the last used site
    #[arg(short, long, global = true)]
    site: Option<String>,

    /// Access token for the management plane and the SCM site
    #[arg(long, global = true, env = "TFUNC_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Host master key sent as x-functions-key to the runtime host
    #[arg(long, global = true)]
    functions_key: Option<String>,

    /// Management-plane endpoint
    #[arg(long, global = true)]
    arm_endpoint: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the functions of the site
    Functions,
    /// Show the resolved edit mode
    EditMode,
    /// Show easy-auth and client-certificate settings
    Auth,
    /// Show the runtime host status
    Status,
    /// List host keys
    HostKeys,
    /// List the keys of one function
    FunctionKeys {
        function: String,
    },
    /// Print a file from the SCM virtual file system
    File {
        /// Full VFS href of the file
        href: String,
    },
    /// Run a function through the admin API
    Run {
        function: String,
        /// Input passed to the function
        #[arg(long, default_value = "")]
        input: String,
    },
    /// Tail the newest log file of a function
    Logs {
        function: String,
        /// Bytes to read from the end of the file
        #[arg(long, default_value_t = 10_000)]
        range: u64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(tracing_level.as_str())),
        )
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("tfunc {} started with log level: {:?}", tfunc::VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("tfunc").join("tfunc.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".tfunc").join("tfunc.log");
    }
    PathBuf::from("tfunc.log")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Fetch the site description and build the operation context
async fn load_site(
    cache: &dyn ResourceCache,
    site_id: &str,
    functions_key: Option<String>,
) -> Result<SiteContext> {
    let value: serde_json::Value = cache
        .get_arm(site_id, None, false)
        .await
        .with_context(|| format!("Failed to load site {}", site_id))?
        .json()?;

    let site = Site::from(&value);
    tracing::info!("Using site: {} ({})", site.name, site.kind);

    let context = SiteContext::new(site);
    Ok(match functions_key {
        Some(key) => context.with_master_key(key),
        None => context,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    let mut config = Config::load();
    let site_id = args
        .site
        .clone()
        .or_else(|| config.last_site_id.clone())
        .context("No site configured. Pass --site with the site resource id")?;

    let credentials = match &args.token {
        Some(token) => Credentials::from_static(token.clone()),
        None => Credentials::from_env(),
    };
    let arm_endpoint = args
        .arm_endpoint
        .clone()
        .unwrap_or_else(|| config.effective_arm_endpoint());

    let cache: Arc<dyn ResourceCache> = Arc::new(
        HttpResourceCache::new(HttpTransport::new()?, credentials.clone(), arm_endpoint)
            .with_ttl(config.effective_cache_ttl())
            .with_api_version(config.effective_website_api_version()),
    );

    let context = load_site(cache.as_ref(), &site_id, args.functions_key.clone()).await?;
    if let Err(e) = config.set_last_site(&site_id) {
        tracing::warn!("Failed to save config: {:#}", e);
    }

    let service = FunctionAppService::new(cache, credentials).with_settings(ServiceSettings {
        service_host: config.effective_service_host(),
        website_api_version: config.effective_website_api_version(),
        ..Default::default()
    });

    let function = |name: &str| FunctionInfo {
        name: name.to_string(),
        ..Default::default()
    };

    match &args.command {
        Command::Functions => print_json(&service.get_functions(&context).await),
        Command::EditMode => {
            let mode = service.get_function_app_edit_mode(&context).await.map(|mode| {
                serde_json::json!({ "mode": mode, "readOnly": mode.is_read_only() })
            });
            print_json(&mode)
        }
        Command::Auth => print_json(&service.get_auth_settings(&context).await),
        Command::Status => print_json(&service.get_host_status(&context).await),
        Command::HostKeys => print_json(&service.get_host_keys(&context).await),
        Command::FunctionKeys { function } => {
            print_json(&service.get_function_keys(&context, function).await)
        }
        Command::File { href } => {
            let file = FileRef::from(href.as_str());
            print_json(&service.get_file_content(&context, &file).await)
        }
        Command::Run { function: name, input } => {
            print_json(&service.run_function(&context, &function(name), input).await)
        }
        Command::Logs { function, range } => {
            print_json(&service.get_old_logs(&context, function, *range).await)
        }
    }
}
