use anyhow::{anyhow, Context, Result};
use chrono::TimeZone;
use clap::{Args, Parser, Subcommand};
use pomodorify as lib;
use lib::api::spotify::SpotifyClient;
use lib::builder::{BuilderSettings, PlaylistBuilder};
use lib::config::Config;
use lib::models::{PlaylistDraft, TrackSource};
use lib::token::{TokenManager, TokenState};
use lib::util::format_duration;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::subscriber as tracing_subscriber_global;
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "pomodorify", version, about = "Pomodoro-sized Spotify playlists")]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Name under which credentials are stored
    #[arg(long, default_value = "default")]
    account: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Login helpers
    Auth {
        #[command(subcommand)]
        sub: AuthCommands,
    },
    /// List your playlists
    Playlists,
    /// Draft a playlist that fills the given duration (and optionally save it)
    Generate(GenerateArgs),
    /// Run the HTTP server (server-mediated login with in-memory sessions)
    Serve,
    /// Validate config file and exit
    ConfigValidate,
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Authorize in the browser and store tokens (interactive)
    Login,
    /// Forget stored tokens
    Logout,
    /// Show login state and token expiry
    Status,
}

#[derive(Args)]
struct GenerateArgs {
    /// Target duration in minutes (defaults to the configured value)
    #[arg(long)]
    minutes: Option<i64>,

    /// Draw tracks from this playlist id
    #[arg(long, conflicts_with_all = ["search", "recommended"])]
    playlist: Option<String>,

    /// Draw tracks from a keyword search
    #[arg(long, conflicts_with = "recommended")]
    search: Option<String>,

    /// Draw tracks from the recommendation playlist
    #[arg(long)]
    recommended: bool,

    /// Playlist name to use instead of the generated one
    #[arg(long)]
    name: Option<String>,

    /// Create the playlist on Spotify after printing the preview
    #[arg(long)]
    save: bool,
}

impl GenerateArgs {
    fn source(&self) -> Result<TrackSource> {
        if let Some(id) = &self.playlist {
            return Ok(TrackSource::Playlist { id: id.clone(), name: None });
        }
        if let Some(keywords) = &self.search {
            return Ok(TrackSource::Search { keywords: keywords.clone() });
        }
        if self.recommended {
            return Ok(TrackSource::Recommended);
        }
        Err(anyhow!("choose a source: --playlist ID, --search KEYWORDS or --recommended"))
    }
}

fn resolve_config_path(explicit: &Option<PathBuf>) -> PathBuf {
    // explicit --config wins; then the per-user config; then the repo example
    if let Some(p) = explicit {
        return p.clone();
    }
    if let Some(user) = dirs::config_dir().map(|d| d.join("pomodorify").join("config.toml")) {
        if user.exists() {
            return user;
        }
    }
    PathBuf::from("config/example-config.toml")
}

fn init_logging(log_dir: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let _ = LogTracer::init();
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log dir {}", log_dir.display()))?;
    let file_appender: RollingFileAppender = tracing_appender::rolling::daily(log_dir, "pomodorify.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer);

    tracing_subscriber_global::set_global_default(subscriber)
        .map_err(|e| anyhow!("failed to set global tracing subscriber: {}", e))?;
    Ok(guard)
}

fn builder_for(cfg: &Config, tokens: Arc<TokenManager>) -> PlaylistBuilder {
    let api = Arc::new(SpotifyClient::from_config(cfg, tokens));
    PlaylistBuilder::new(api, BuilderSettings::from_config(cfg))
}

/// The authorization code from a pasted redirect URL.
fn code_from_redirect(input: &str) -> Result<String> {
    let parsed = url::Url::parse(input.trim()).map_err(|e| anyhow!("invalid url pasted: {}", e))?;
    if let Some((_, err)) = parsed.query_pairs().find(|(k, _)| k == "error") {
        return Err(anyhow!("authorization denied: {}", err));
    }
    let code = parsed
        .query_pairs()
        .find(|(k, _)| k == "code")
        .ok_or_else(|| anyhow!("no code in redirect URL"))?
        .1
        .into_owned();
    Ok(code)
}

fn read_line() -> Result<String> {
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn print_draft(draft: &PlaylistDraft) {
    println!("{}", draft.name);
    println!("  {}", draft.source_description);
    println!(
        "  {} tracks, {}",
        draft.tracks.len(),
        format_duration(draft.total_duration_ms())
    );
    for (i, t) in draft.tracks.iter().enumerate() {
        println!(
            "  {:>2}. {} - {} [{}]",
            i + 1,
            t.artist,
            t.name,
            format_duration(t.duration_ms)
        );
    }
}

async fn ensure_logged_in(tokens: &TokenManager) -> Result<()> {
    if !tokens.ensure_valid_token().await? {
        return Err(anyhow!("not logged in (or the session expired); run `pomodorify auth login`"));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(&cli.config);

    let cfg = Config::from_path(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    if let Commands::ConfigValidate = cli.command {
        match cfg.validate() {
            Ok(()) => println!("OK"),
            Err(e) => {
                eprintln!("Config validation failed: {}", e);
                std::process::exit(2);
            }
        }
        return Ok(());
    }
    cfg.validate()
        .with_context(|| format!("validating {}", config_path.display()))?;

    let _guard = init_logging(&cfg.log_dir)?;
    let tokens = Arc::new(TokenManager::from_config(&cfg, &cli.account));

    match cli.command {
        Commands::Auth { sub } => match sub {
            AuthCommands::Login => {
                let url = tokens.begin_login().await?;
                println!("Open this URL in your browser and authorize the application:\n\n{}\n", url);
                println!("After authorizing you'll be redirected to {}.", cfg.redirect_uri);
                println!("Copy the full redirect URL from the address bar and paste it here:");
                let code = code_from_redirect(&read_line()?)?;
                tokens.complete_login(&code).await?;
                let builder = builder_for(&cfg, Arc::clone(&tokens));
                let user = builder.api().current_user().await?;
                println!(
                    "Logged in as {}.",
                    user.display_name.as_deref().unwrap_or(&user.id)
                );
            }
            AuthCommands::Logout => {
                tokens.logout().await?;
                println!("Logged out.");
            }
            AuthCommands::Status => {
                let state = tokens.state().await?;
                match tokens.credentials().await? {
                    Some(c) => {
                        let expires = chrono::Local
                            .timestamp_millis_opt(c.expires_at_ms)
                            .single()
                            .map(|t| t.to_rfc2822())
                            .unwrap_or_else(|| c.expires_at_ms.to_string());
                        println!("{:?}: token expires {}", state, expires);
                        if c.refresh_token.is_none() {
                            println!("No refresh token stored; you will need to log in again after expiry.");
                        }
                    }
                    None => println!("{:?}", TokenState::LoggedOut),
                }
            }
        },
        Commands::Playlists => {
            ensure_logged_in(&tokens).await?;
            let builder = builder_for(&cfg, Arc::clone(&tokens));
            for p in builder.list_playlists().await? {
                println!("{}  {} ({} tracks, owner {})", p.id, p.name, p.track_count, p.owner_id);
            }
        }
        Commands::Generate(args) => {
            ensure_logged_in(&tokens).await?;
            let source = args.source()?;
            let minutes = args.minutes.unwrap_or(cfg.default_duration_minutes);
            let builder = builder_for(&cfg, Arc::clone(&tokens));
            let mut draft = builder.draft(&source, minutes).await?;
            if let Some(name) = &args.name {
                draft.rename(name);
            }
            print_draft(&draft);
            if args.save {
                let created = builder.save(&draft).await?;
                println!("\nSaved: {}", created.url);
            } else {
                println!("\nRun again with --save to create this playlist.");
            }
        }
        Commands::Serve => {
            lib::server::serve(&cfg).await.context("running server")?;
        }
        Commands::ConfigValidate => {}
    }

    Ok(())
}
