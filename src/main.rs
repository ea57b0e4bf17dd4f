use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use imagestack::config::Config;
use imagestack::warmup::{JobStatus, WarmupDispatcher, WarmupJob, WarmupQueue};
use imagestack::ImageFormat;

/// Imagestack - named image transformation stacks with a derivative cache
#[derive(Parser, Debug)]
#[command(name = "imagestack")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the URL of a derivative, computing it first when needed
    Url {
        source: String,
        stack: String,
        format: ImageFormat,
    },

    /// Pre-compute derivatives of one or more sources
    Warmup {
        #[arg(required = true)]
        sources: Vec<String>,
        /// Stack to run; repeat for several
        #[arg(short, long = "stack")]
        stacks: Vec<String>,
        /// Output format; repeat for several (default: each stack's own)
        #[arg(short, long = "format")]
        formats: Vec<ImageFormat>,
    },

    /// Delete cached derivatives of a source
    Invalidate {
        source: String,
        /// Only these stacks; all stacks when omitted
        #[arg(short, long = "stack")]
        stacks: Vec<String>,
    },

    /// Load and validate the configuration, then list the stacks
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load configuration {}", args.config.display()))?;

    imagestack::logging::init_subscriber(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    config.validate().context("Configuration is invalid")?;

    tracing::info!(
        config_file = %args.config.display(),
        loaders = config.loaders.len(),
        stacks = config.filter_sets.len(),
        "Configuration loaded successfully"
    );

    let transformer = config.build_transformer()?;

    match args.command {
        Command::Url {
            source,
            stack,
            format,
        } => {
            let url = transformer.transform_to_url(&source, &stack, format).await?;
            println!("{}", url);
        }
        Command::Warmup {
            sources,
            stacks,
            formats,
        } => {
            let (queue, _worker) = WarmupQueue::start(
                transformer,
                config.warmup.queue_capacity,
                // Every job must stay visible until it is reported below
                config.warmup.history_limit.max(sources.len()),
            );
            let mut ids = Vec::with_capacity(sources.len());
            for source in sources {
                let job = WarmupJob::new(source, stacks.clone(), formats.clone());
                ids.push(queue.dispatch(job)?);
            }

            let mut failed = 0;
            for id in ids {
                let record = loop {
                    match queue.get_job(&id) {
                        Some(record)
                            if matches!(
                                record.status,
                                JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
                            ) =>
                        {
                            break record;
                        }
                        Some(_) => tokio::time::sleep(Duration::from_millis(50)).await,
                        None => bail!("Warmup job {} disappeared", id),
                    }
                };
                match record.status {
                    JobStatus::Completed => println!(
                        "{}: {} derivatives",
                        record.job.source_id, record.derivatives
                    ),
                    _ => {
                        failed += 1;
                        eprintln!(
                            "{}: {}",
                            record.job.source_id,
                            record.error_message.unwrap_or_else(|| "cancelled".to_string())
                        );
                    }
                }
            }
            if failed > 0 {
                bail!("{} warmup job(s) failed", failed);
            }
        }
        Command::Invalidate { source, stacks } => {
            let removed = transformer.invalidate_cache(&source, &stacks).await?;
            println!("removed {} derivatives", removed);
        }
        Command::Check => {
            for name in transformer.executor().resolver().names() {
                println!("{}", name);
            }
        }
    }

    Ok(())
}
