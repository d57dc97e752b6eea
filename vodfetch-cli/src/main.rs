mod cli;
mod error;
mod utils;

use std::fmt::Display;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing::{Level, debug, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};
use vodfetch_engine::{DownloadOptions, DownloadOutcome, EngineConfig, VodDownloader, catalog};

use crate::{
    cli::{Args, Commands},
    error::{AppError, Result},
    utils::{format_bytes, parse_headers, progress::ProgressManager},
};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!("Application error: {}", e);
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` when a download ran but produced no artifact.
async fn run() -> Result<bool> {
    let args = Args::parse();
    let progress = match args.command {
        Commands::Download { show_progress, .. } if show_progress && !args.quiet => {
            ProgressManager::new()
        }
        _ => ProgressManager::new_disabled(),
    };
    init_logging(args.verbose, args.quiet, progress.clone())?;

    let config = engine_config(&args);
    debug!(workspace = %config.workspace_dir.display(), "Engine configuration ready");

    match args.command {
        Commands::Analyze { ref url } => {
            let downloader = VodDownloader::new(config).await?;
            let report = downloader.analyze(url).await?;
            print_result(args.json, &report)?;
        }

        Commands::Download {
            ref url,
            ref output,
            concurrency,
            max_retries,
            required_space_mb,
            ..
        } => {
            let mut config = config;
            config.required_space_mb = required_space_mb;
            return download(
                config,
                url,
                output,
                DownloadOptions {
                    concurrency: concurrency.max(1),
                    max_retry_passes: max_retries,
                },
                progress,
                args.json,
            )
            .await;
        }

        Commands::Status => {
            let downloader = VodDownloader::new(config).await?;
            let status = downloader.status().await?;
            print_result(args.json, &status)?;
        }

        Commands::Clean => {
            let downloader = VodDownloader::new(config).await?;
            let report = downloader.clean().await?;
            print_result(args.json, &report)?;
        }

        Commands::Prompts {
            ref id,
            ref url,
            ref output,
        } => match id {
            None if args.json => println!("{}", serde_json::to_string_pretty(catalog::prompts())?),
            None => {
                for prompt in catalog::prompts() {
                    println!("{:<16} {}", prompt.id, prompt.description);
                }
            }
            Some(id) => {
                let prompt = catalog::find_prompt(id)
                    .ok_or_else(|| AppError::NotFound(format!("prompt '{id}'")))?;
                match url {
                    Some(url) => println!("{}", prompt.render(url, output)),
                    None if args.json => println!("{}", serde_json::to_string_pretty(prompt)?),
                    None => println!("{}", prompt.content),
                }
            }
        },

        Commands::Resources { ref uri } => match uri {
            None if args.json => {
                println!("{}", serde_json::to_string_pretty(catalog::resources())?)
            }
            None => {
                for resource in catalog::resources() {
                    println!("{}", resource.uri);
                }
            }
            Some(uri) => {
                let resource = catalog::find_resource(uri)
                    .ok_or_else(|| AppError::NotFound(format!("resource '{uri}'")))?;
                if args.json {
                    println!("{}", serde_json::to_string_pretty(resource)?);
                } else {
                    println!("{}", resource.content);
                }
            }
        },
    }

    Ok(true)
}

async fn download(
    config: EngineConfig,
    url: &str,
    output: &Path,
    options: DownloadOptions,
    progress: ProgressManager,
    json: bool,
) -> Result<bool> {
    let handler = progress.clone();
    let downloader = VodDownloader::new(config)
        .await?
        .with_event_handler(Arc::new(move |event| handler.handle_event(event)));

    info!(url, output = %output.display(), "Starting download");
    let outcome = downloader.download(url, output, options).await;
    progress.abandon();
    let outcome = outcome?;

    if let DownloadOutcome::Completed(report) = &outcome {
        info!(size = %format_bytes(report.size_bytes), "Video saved");
    }
    print_result(json, &outcome)?;
    Ok(matches!(outcome, DownloadOutcome::Completed(_)))
}

fn engine_config(args: &Args) -> EngineConfig {
    let mut builder = EngineConfig::builder()
        .with_workspace_dir(&args.workspace_dir)
        .with_request_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout))
        .with_request_retries(args.retries)
        .with_headers(parse_headers(&args.headers));
    if let Some(user_agent) = &args.user_agent {
        builder = builder.with_user_agent(user_agent);
    }
    builder.build()
}

fn print_result<T: Display + Serialize>(json: bool, value: &T) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{value}");
    }
    Ok(())
}

/// Log lines are written through `progress` so they never tear the bar.
fn init_logging(verbose: bool, quiet: bool, progress: ProgressManager) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(verbose)
                .with_writer(progress),
        )
        .with(filter)
        .try_init()
        .map_err(|e| AppError::Initialization(e.to_string()))
}
