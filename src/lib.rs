pub mod cli;
pub mod config;
pub mod context;
pub mod database;
pub mod models;
pub mod realtime;
pub mod services;
pub mod store;

use clap::Parser;

use crate::cli::Cli;
use crate::config::AppConfig;
use crate::context::AppContext;

pub fn run() -> Result<(), String> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start async runtime: {}", e))?;

    runtime.block_on(async move {
        let config = AppConfig::from_env()?;
        let ctx = AppContext::init(config).await?;
        let result = cli.command.execute(&ctx).await;
        ctx.db.0.close().await;
        result
    })
}
