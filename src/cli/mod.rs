use clap::{Parser, Subcommand};

pub mod config;
pub mod init;
pub mod run;
pub mod status;
pub mod version;

#[derive(Parser)]
#[command(name = "warden")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Community integrity protection and disaster recovery engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter configuration file
    Init {
        /// Principal id of the community owner
        #[arg(long)]
        owner: u64,

        /// Path to config file (default: ~/.local/share/warden/config.toml)
        #[arg(long)]
        config: Option<String>,
    },

    /// Run the protection engine
    Run {
        /// Path to config file (default: ~/.local/share/warden/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Override the data directory from the config
        #[arg(long)]
        data_dir: Option<String>,
    },

    /// Show persisted engine state (trust registry, manifests)
    Status {
        /// Path to config file (default: ~/.local/share/warden/config.toml)
        #[arg(long)]
        config: Option<String>,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Init { owner, config } => init::execute(owner, config),
        Commands::Run { config, data_dir } => run::execute(config, data_dir).await,
        Commands::Status { config } => status::execute(config).await,
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}
