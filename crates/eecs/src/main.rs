use std::env;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use config::{Config, Environment, File, FileFormat};
use log::{LevelFilter, debug, info};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use eecs::api::{AppState, create_router};
use eecs::auth::AuthConfig;
use eecs::db::Database;
use eecs::user::{CreateUserRequest, UserRepository, UserService, hash_password};

const APP_NAME: &str = "eecs";

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging();
    debug!("resolved paths: {:#?}", ctx.paths);

    match cli.command {
        Command::Serve(cmd) => async_serve(ctx, cmd),
        Command::CreateUser(cmd) => async_create_user(ctx, cmd),
        Command::HashPassword { password, cost } => {
            let cost = cost.unwrap_or(ctx.config.auth.bcrypt_cost);
            println!("{}", hash_password(&password, cost)?);
            Ok(())
        }
        Command::GenSecret => {
            println!("{}", AuthConfig::generate_jwt_secret());
            Ok(())
        }
        Command::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), APP_NAME, &mut io::stdout());
            Ok(())
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "EECS program administration backend.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true)]
    no_color: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve(ServeCommand),
    /// Provision a user in the user store
    CreateUser(CreateUserCommand),
    /// Print a bcrypt hash for a password
    HashPassword {
        password: String,
        /// bcrypt cost (defaults to auth.bcrypt_cost)
        #[arg(long)]
        cost: Option<u32>,
    },
    /// Print a random value suitable for auth.jwt_secret
    GenSecret,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
struct ServeCommand {
    /// Address to bind (overrides server.host)
    #[arg(long)]
    host: Option<String>,
    /// Port to bind (overrides server.port)
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Debug, Args)]
struct CreateUserCommand {
    username: String,
    #[arg(long, env = "EECS_NEW_USER_PASSWORD", hide_env_values = true)]
    password: String,
    /// Role to assign (repeatable)
    #[arg(long = "role")]
    roles: Vec<String>,
    /// Allow admin-panel access
    #[arg(long)]
    staff: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct AppConfig {
    server: ServerConfig,
    database: DatabaseConfig,
    auth: AuthConfig,
    logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct ServerConfig {
    host: String,
    port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct DatabaseConfig {
    /// SQLite file. Defaults to `<data dir>/eecs/eecs.db`.
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct LoggingConfig {
    level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct AppPaths {
    config_file: PathBuf,
    database: PathBuf,
}

impl AppPaths {
    fn discover(override_path: Option<PathBuf>) -> Result<Self> {
        let config_file = match override_path {
            Some(path) => expand_path(&path.display().to_string())?,
            None => dirs::config_dir()
                .ok_or_else(|| anyhow!("unable to determine config directory"))?
                .join(APP_NAME)
                .join("config.toml"),
        };
        let database = dirs::data_dir()
            .ok_or_else(|| anyhow!("unable to determine data directory"))?
            .join(APP_NAME)
            .join("eecs.db");

        Ok(Self {
            config_file,
            database,
        })
    }

    fn apply_overrides(mut self, config: &AppConfig) -> Result<Self> {
        if let Some(ref path) = config.database.path {
            self.database = expand_path(path)?;
        }
        Ok(self)
    }
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    paths: AppPaths,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let paths = AppPaths::discover(common.config.clone())?;
        let config = load_or_init_config(&paths)?;
        let paths = paths.apply_overrides(&config)?;
        Ok(Self {
            common,
            paths,
            config,
        })
    }

    fn init_logging(&self) {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return;
        }

        let level = self.effective_log_level();
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("eecs={level},tower_http={level}"))
        });

        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .ok();
        } else {
            let disable_color = self.common.no_color
                || env::var_os("NO_COLOR").is_some()
                || !io::stderr().is_terminal();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_ansi(!disable_color))
                .try_init()
                .ok();
        }

        // Also init env_logger for compatibility with log crate users
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        builder.filter_level(level);
        builder.try_init().ok();
    }

    fn effective_log_level(&self) -> LevelFilter {
        match self.common.verbose {
            0 => self
                .config
                .logging
                .level
                .parse()
                .unwrap_or(LevelFilter::Info),
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    async fn user_service(&self) -> Result<UserService> {
        let db = Database::new(&self.paths.database)
            .await
            .with_context(|| format!("opening database {}", self.paths.database.display()))?;
        Ok(UserService::new(
            UserRepository::new(db.pool().clone()),
            self.config.auth.bcrypt_cost,
        ))
    }
}

#[tokio::main]
async fn async_serve(ctx: RuntimeContext, cmd: ServeCommand) -> Result<()> {
    ctx.config.auth.validate().context("invalid auth configuration")?;
    let session = ctx.config.auth.session_config()?;

    let users = ctx.user_service().await?;
    let state = AppState::new(session, users, ctx.config.auth.allowed_origins.clone());
    let app = create_router(state);

    let host = cmd.host.unwrap_or_else(|| ctx.config.server.host.clone());
    let port = cmd.port.unwrap_or(ctx.config.server.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        "listening on http://{addr} (login at {})",
        ctx.config.auth.token_url
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

#[tokio::main]
async fn async_create_user(ctx: RuntimeContext, cmd: CreateUserCommand) -> Result<()> {
    let users = ctx.user_service().await?;
    let user = users
        .create_user(CreateUserRequest {
            username: cmd.username,
            password: cmd.password,
            is_staff: cmd.staff,
            roles: cmd.roles,
        })
        .await?;
    println!("created user {}", user.username);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

fn load_or_init_config(paths: &AppPaths) -> Result<AppConfig> {
    if !paths.config_file.exists() {
        write_default_config(&paths.config_file)?;
    }

    let built = Config::builder()
        .add_source(
            File::from(paths.config_file.as_path())
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(Environment::with_prefix("EECS").separator("__"))
        .build()?;

    let config: AppConfig = built.try_deserialize()?;
    Ok(config)
}

fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = String::new();
    body.push_str("# Configuration for ");
    body.push_str(APP_NAME);
    body.push('\n');
    body.push_str("# Set auth.jwt_secret (see `eecs gen-secret`) before running `eecs serve`.\n");
    body.push_str(
        "# auth.allowed_origins is empty: cross-origin requests are denied. List the admin\n\
         # frontend's origin there (e.g. [\"http://localhost:9528\"]) if it is served elsewhere.\n\n",
    );
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded =
        shellexpand::full(raw).with_context(|| format!("expanding path {raw}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}
