//! globstate demo binary

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use globstate_core::{BackendKind, StateConfig};
use globstate_demo::{
    demo_config, run_counter, run_profile, run_search, show, CounterPolicy, DemoContext,
    ProfileEdit, Theme,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "globstate-demo")]
#[command(about = "Shared state stores with rate-limited persistence")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory (overrides the config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Keep everything in memory
    #[arg(long)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bump a persisted counter and report the physical writes
    Counter {
        /// Number of increments
        #[arg(long, default_value = "10")]
        steps: u32,

        /// Pause between increments
        #[arg(long, default_value = "100")]
        interval_ms: u64,

        /// Rate limit policy (default: the configured async counter)
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,

        /// Rate limit window
        #[arg(long, default_value = "500")]
        delay_ms: u64,
    },

    /// Edit the throttled user profile
    Profile {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long, value_enum)]
        theme: Option<ThemeArg>,

        /// Flip the notifications preference
        #[arg(long)]
        toggle_notifications: bool,
    },

    /// Add queries to the throttled search history
    Search {
        /// Queries, recorded in order
        #[arg(required = true)]
        queries: Vec<String>,
    },

    /// Print the stored value of a key
    Show {
        /// State key, e.g. @app/search-history
        key: String,

        /// Read from the async storage namespace
        #[arg(long = "async")]
        async_storage: bool,
    },

    /// Write a default configuration file
    InitConfig {
        /// Output file path
        #[arg(short, long, default_value = "globstate.json")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Debounce,
    Throttle,
    None,
}

impl From<PolicyArg> for CounterPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Debounce => CounterPolicy::Debounce,
            PolicyArg::Throttle => CounterPolicy::Throttle,
            PolicyArg::None => CounterPolicy::Direct,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ThemeArg {
    Light,
    Dark,
}

impl From<ThemeArg> for Theme {
    fn from(arg: ThemeArg) -> Self {
        match arg {
            ThemeArg::Light => Theme::Light,
            ThemeArg::Dark => Theme::Dark,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { output } = &cli.command {
        let json = demo_config().to_json()?;
        std::fs::write(output, &json)
            .with_context(|| format!("writing {}", output.display()))?;
        println!("Configuration saved to: {}", output.display());
        return Ok(());
    }

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if cli.memory {
        config.backend = BackendKind::Memory;
    }

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_new(&config.log_level)?)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let ctx = DemoContext::open(config)?;

    match cli.command {
        Commands::Counter {
            steps,
            interval_ms,
            policy,
            delay_ms,
        } => {
            let policy = policy.map(|p| (CounterPolicy::from(p), delay_ms));
            let report =
                run_counter(&ctx, steps, Duration::from_millis(interval_ms), policy).await?;

            println!("{}", "Counter".bold());
            println!("Value:    {}", report.value.to_string().green());
            println!("Updates:  {}", report.updates);
            println!("Writes:   {}", report.writes.to_string().yellow());
            println!("Elapsed:  {}ms", report.elapsed_ms);
        }

        Commands::Profile {
            name,
            email,
            theme,
            toggle_notifications,
        } => {
            let edit = ProfileEdit {
                name,
                email,
                theme: theme.map(Theme::from),
                toggle_notifications,
            };
            let profile = run_profile(&ctx, edit).await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }

        Commands::Search { queries } => {
            let history = run_search(&ctx, &queries).await?;

            println!("Total searches: {}", history.search_count.to_string().green());
            println!("Last search:    {}", history.last_search);
            for query in &history.queries {
                println!("  - {}", query);
            }
        }

        Commands::Show { key, async_storage } => match show(&ctx, &key, async_storage).await? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => println!("{} nothing stored for {}", "!".yellow(), key),
        },

        Commands::InitConfig { .. } => {}
    }

    Ok(())
}

/// Read the config file, or fall back to the demo defaults
fn load_config(path: Option<&Path>) -> anyhow::Result<StateConfig> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config = StateConfig::from_json(&content)?;
            Ok(config)
        }
        None => {
            let mut config = demo_config();
            if let Some(dir) = dirs::data_local_dir() {
                config.data_dir = dir.join("globstate");
            }
            Ok(config)
        }
    }
}
