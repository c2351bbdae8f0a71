//! chatrelay - Round-robin gateway for OpenAI-compatible chat endpoints
//!
//! Spreads questions across several upstream chat endpoints, aggregates
//! their streamed answers, and can race all of them for comparison.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatrelay::config::Config;
use chatrelay::proxy::{build_dispatcher, run_server};
use chatrelay::storage;

#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(about = "Round-robin gateway for OpenAI-compatible chat endpoints")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Path to configuration file (TOML, or JSON with a .json extension)
        #[arg(short, long, default_value = "config.toml")]
        config: String,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration file
    Check {
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },

    /// Show configured endpoints
    Endpoints {
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },

    /// Ask one endpoint (round-robin unless --endpoint is given)
    Ask {
        #[arg(short, long, default_value = "config.toml")]
        config: String,

        /// Endpoint index to ask
        #[arg(short, long)]
        endpoint: Option<usize>,

        question: String,
    },

    /// Ask every endpoint at once and rank them by response time
    TestAll {
        #[arg(short, long, default_value = "config.toml")]
        config: String,

        #[arg(default_value = "你好")]
        question: String,
    },
}

impl Commands {
    fn config_path(&self) -> &str {
        match self {
            Commands::Serve { config, .. }
            | Commands::Check { config }
            | Commands::Endpoints { config }
            | Commands::Ask { config, .. }
            | Commands::TestAll { config, .. } => config,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Config is read before tracing starts so its log level can seed the filter
    let loaded = Config::load(cli.command.config_path());
    let default_filter = match &loaded {
        Ok((config, _)) => format!("chatrelay={},tower_http=info", config.logging.level),
        Err(_) => "chatrelay=info,tower_http=info".to_string(),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let (config, key_sources) = loaded?;

    match cli.command {
        Commands::Serve { listen, .. } => {
            let mut config = config;
            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                config.server.listen = addr;
            }

            let db = match &config.database {
                Some(db_config) => {
                    tracing::info!(path = %db_config.path, "Opening outcome database");
                    Some(storage::init_pool(&db_config.path).await?)
                }
                None => None,
            };

            run_server(config, db).await
        }

        Commands::Check { config: path } => {
            println!("Configuration OK: {}", path);
            println!("  listen: {}", config.server.listen);
            println!("  endpoints: {}", config.endpoints.len());
            for (index, (endpoint, source)) in
                config.endpoints.iter().zip(key_sources.iter()).enumerate()
            {
                println!("  [{}] {} ({}) key: {}", index, endpoint.url, endpoint.model, source);
            }
            Ok(())
        }

        Commands::Endpoints { .. } => {
            for (index, endpoint) in config.endpoints.iter().enumerate() {
                println!("{}\t{}\t{}", index, endpoint.model, endpoint.url);
            }
            Ok(())
        }

        Commands::Ask {
            endpoint, question, ..
        } => {
            let dispatcher = build_dispatcher(&config, None)?;
            let dispatch = dispatcher.single_dispatch(&question, endpoint).await?;
            println!("{}", serde_json::to_string_pretty(&dispatch)?);
            Ok(())
        }

        Commands::TestAll { question, .. } => {
            let dispatcher = build_dispatcher(&config, None)?;
            let report = dispatcher.broadcast_dispatch(&question).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}
