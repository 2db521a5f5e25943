use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

mod app;
mod cache;
mod chat;
mod cli;
mod config;
mod portfolio;
mod semantic;
#[cfg(test)]
mod tests;
mod web;

use app::AppFactory;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = cli::Args::parse();
    let config = AppFactory::create_config(args.config.as_deref())?;

    match args.command {
        cli::Command::Serve { listen, no_warmup } => {
            let service = AppFactory::create_chat_service(&config)?;
            let listen = listen.unwrap_or_else(|| config.server.listen.clone());
            let warm_up = config.cache.warm_up && !no_warmup;

            web::start_daemon(service, listen, config.server.include_debug, warm_up)
        }

        cli::Command::Ask { message } => {
            let service = AppFactory::create_chat_service(&config)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;

            let reply = runtime.block_on(service.respond(&message, &[]))?;
            println!("{}", serde_json::to_string_pretty(&reply)?);
            Ok(())
        }

        cli::Command::Chunks {} => {
            let fetcher = AppFactory::create_fetcher(&config)?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;

            let content = runtime.block_on(fetcher.fetch_content());
            let chunks = config.chunking.chunk(&content);

            let output = json!({
                "origin": content.origin,
                "total": chunks.len(),
                "chunks": chunks,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&output).context("failed to serialize chunks")?
            );
            Ok(())
        }
    }
}
