// PromptCut Main Entry Point
// Copyright (c) 2026 Xing_The_Creator | PromptCut

use promptcut_core::agent;
use promptcut_core::agent::core::{AgentCore, SourceVideo};
use promptcut_core::agent::health::check_dependencies;
use promptcut_core::auth::UserStore;
use promptcut_core::config::Config;
use promptcut_core::server;
use promptcut_core::state::KernelState;
use promptcut_core::views::Views;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "promptcut")]
#[command(about = "PromptCut chat-driven video editor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web dashboard
    Serve {
        /// Port to bind (overrides PROMPTCUT_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Apply one chat command to a local video
    Chat {
        /// Input video path
        #[arg(short, long)]
        input: PathBuf,

        /// Command text (e.g. "trim from 5 to 10 seconds")
        #[arg(short, long)]
        prompt: String,

        /// Where previews are written (overrides PROMPTCUT_DATA_DIR)
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Trim a video to [start, end] seconds
    Trim {
        /// Input video path
        #[arg(short, long)]
        input: PathBuf,

        /// Start time in seconds
        #[arg(short, long)]
        start: f64,

        /// End time in seconds
        #[arg(short, long)]
        end: f64,

        /// Output path (optional)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Synthesize a voice-over MP3
    Voice {
        /// Text to speak
        #[arg(short, long)]
        text: String,

        /// Output path (default: voiceover.mp3)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Create a dashboard account
    Register {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        password: String,
    },

    /// Report which external tools are available
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Keep request and pool chatter quiet unless explicitly asked for.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=warn,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        eprintln!("[PROMPTCUT PANIC] at {}: {}", location, message);
    }));

    let args = Cli::parse();
    let mut config = Config::from_env();

    match args.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            info!("--- PROMPTCUT v{} ---", env!("CARGO_PKG_VERSION"));

            let toolchain = check_dependencies(&config.tts_command).await;
            let missing = toolchain.missing(&config.tts_command);
            if !missing.is_empty() {
                warn!("[PROD] Missing tools: {:?}. Some commands will fail.", missing);
            }

            std::fs::create_dir_all(config.uploads_dir())?;
            std::fs::create_dir_all(config.previews_dir())?;

            let users = UserStore::connect(&config.database_url)
                .await
                .with_context(|| format!("opening user store at {}", config.database_url))?;
            let views = Views::new().context("loading templates")?;

            let state = Arc::new(KernelState::new(config, users, views));

            state.health.start(Arc::downgrade(&state));
            info!("[HEALTH] Monitor started");

            let result = server::start_server(state.clone()).await;
            state.health.stop();
            info!("{}", state.health.status_report());
            result?;
        }
        Commands::Chat {
            input,
            prompt,
            out_dir,
        } => {
            if let Some(dir) = out_dir {
                config.data_dir = dir;
            }
            let core = AgentCore::new(&config);
            let source = SourceVideo::from_path(&input)
                .await
                .with_context(|| format!("reading {:?}", input))?;

            let reply = core.handle_prompt_with_fallback("cli", &prompt, Some(&source)).await;
            println!("{}", reply.response);
            for path in &reply.outputs {
                println!("  -> {}", path.display());
            }
        }
        Commands::Trim {
            input,
            start,
            end,
            output,
        } => {
            let out_path = output.unwrap_or_else(|| {
                let stem = input
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "video".to_string());
                input.with_file_name(format!("{}_trimmed.mp4", stem))
            });
            let res = agent::production_tools::trim_video(&input, start, end, &out_path).await?;
            println!("Trim saved: {:?} ({:.2} MB)", out_path, res.size_mb);
        }
        Commands::Voice { text, output } => {
            let out_path = output.unwrap_or_else(|| PathBuf::from("voiceover.mp3"));
            let core = AgentCore::new(&config);
            let path = core.tts.speak(&text, &out_path).await?;
            println!("Voice-over saved: {:?}", path);
        }
        Commands::Register { username, password } => {
            let users = UserStore::connect(&config.database_url).await?;
            let user = users.create_user(&username, &password).await?;
            println!("Registered '{}' (id {})", user.username, user.id);
        }
        Commands::Check => {
            let toolchain = check_dependencies(&config.tts_command).await;
            println!("ffmpeg:  {}", mark(toolchain.ffmpeg));
            println!("ffprobe: {}", mark(toolchain.ffprobe));
            println!("{}: {}", config.tts_command, mark(toolchain.tts));
            let missing = toolchain.missing(&config.tts_command);
            if !missing.is_empty() {
                anyhow::bail!("missing tools: {}", missing.join(", "));
            }
        }
    }

    Ok(())
}

fn mark(found: bool) -> &'static str {
    if found {
        "found"
    } else {
        "MISSING"
    }
}
