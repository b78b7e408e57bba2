//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口，用于检查配置和手动收发失效消息。

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "replicache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "validate", about = "Load and validate a configuration file")]
    Validate(ValidateArgs),

    #[command(name = "publish", about = "Broadcast an invalidation to every node of a service")]
    Publish(PublishArgs),

    #[command(name = "listen", about = "Print invalidations received on a service channel")]
    Listen(ListenArgs),
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    #[arg(short, long, help = "Path to the TOML configuration")]
    pub config: PathBuf,
}

#[derive(Parser, Debug)]
pub struct PublishArgs {
    #[arg(short, long, help = "Path to the TOML configuration")]
    pub config: PathBuf,

    #[arg(short, long, help = "Service whose bus receives the message")]
    pub service: String,

    #[arg(value_enum, help = "Invalidation to broadcast")]
    pub op: OpArg,

    #[arg(help = "Key or prefix (ignored for clear-all)")]
    pub target: Option<String>,
}

#[derive(Parser, Debug)]
pub struct ListenArgs {
    #[arg(short, long, help = "Path to the TOML configuration")]
    pub config: PathBuf,

    #[arg(short, long, help = "Service whose channel to listen on")]
    pub service: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpArg {
    RemoveKey,
    RemovePrefix,
    ClearAll,
}

mod listen;
mod publish;
mod validate;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    crate::utils::setup_logging();

    match &cli.command {
        Commands::Validate(args) => validate::execute(args).await,
        Commands::Publish(args) => publish::execute(args).await,
        Commands::Listen(args) => listen::execute(args).await,
    }
}

/// 加载并验证配置，返回指定服务的配置
fn load_service(
    path: &std::path::Path,
    service: &str,
) -> Result<(crate::Config, crate::config::ServiceConfig)> {
    use anyhow::{anyhow, Context};

    let config = crate::Config::from_file(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    config.validate().map_err(|e| anyhow!(e))?;
    let service_cfg = config
        .services
        .get(service)
        .cloned()
        .with_context(|| format!("Service '{}' not found in {}", service, path.display()))?;
    Ok((config, service_cfg))
}
