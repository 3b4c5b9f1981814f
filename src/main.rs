use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use proseforge::config::Config;
use proseforge::job::JobStatus;
use proseforge::limiter::{LimiterConfig, RateLimiter};
use proseforge::llm::{AnthropicClient, AnthropicConfig, GenerateClient, TokenEstimates};
use proseforge::notify::{LogNotifier, NotificationDispatcher};
use proseforge::pipeline::{Pipeline, PipelineRequest, volume_bounds};
use proseforge::queue::JobQueue;

fn setup_logging(default_filter: &str) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("proseforge")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("proseforge.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn build_client(config: &Config) -> Result<Arc<dyn GenerateClient>> {
    let client = AnthropicClient::new(AnthropicConfig::from(&config.provider))
        .context("Failed to create Anthropic client")?;
    Ok(Arc::new(client))
}

async fn run_generate(
    cli: &Cli,
    config: &Config,
    source: &Path,
    volume: &str,
    outline_instructions: &str,
    prose_instructions: &str,
    sample: Option<&PathBuf>,
    output: Option<&PathBuf>,
) -> Result<()> {
    let source_text = read_source(source)?;
    let sample_outline = sample.map(|p| read_source(p)).transpose()?;

    let client = build_client(config)?;
    let limiter = Arc::new(RateLimiter::new(LimiterConfig::from(&config.rate_limit)));
    let queue = Arc::new(JobQueue::new(
        client.clone(),
        limiter,
        config.queue.clone(),
        TokenEstimates::from(&config.rate_limit),
        config.retry.max_attempts,
    ));
    let pipeline = Pipeline::new(client, queue.clone());

    let queue_task = tokio::spawn(queue.clone().run());
    let dispatcher = Arc::new(NotificationDispatcher::new(
        queue.clone(),
        Arc::new(LogNotifier),
        Duration::from_secs(config.notify.poll_interval_secs),
    ));
    let dispatcher_task = tokio::spawn(dispatcher.clone().run());

    let (min_length, max_length) = volume_bounds(volume);
    println!(
        "{} {} ({}-{} chars)",
        "Target volume:".cyan(),
        volume,
        min_length,
        max_length
    );
    println!("{}", "Generating outline...".cyan());

    let result = pipeline
        .run(PipelineRequest {
            owner_id: 0,
            source_text,
            outline_instructions: outline_instructions.to_string(),
            sample_outline,
            prose_instructions: prose_instructions.to_string(),
            target_volume: volume.to_string(),
        })
        .await;

    let outcome = match result {
        Ok(run) => {
            println!("{}", "Outline generated, prose job queued".green());
            if cli.is_verbose() {
                println!("{}\n{}", "Outline:".cyan(), run.outline);
            }
            wait_for_job(&queue, &run.job_id, output).await
        }
        Err(e) => Err(eyre::eyre!(e)).context("Pipeline failed"),
    };

    dispatcher.shutdown();
    queue.shutdown();
    dispatcher_task.abort();
    queue_task.abort();

    outcome
}

/// Poll the queue until the job goes terminal, then print or write the
/// final prose.
async fn wait_for_job(queue: &Arc<JobQueue>, job_id: &str, output: Option<&PathBuf>) -> Result<()> {
    let mut last_attempt = 0;
    loop {
        let Some(job) = queue.get(job_id) else {
            eyre::bail!("Job {} disappeared from the queue", job_id);
        };

        if job.attempt_count > last_attempt {
            last_attempt = job.attempt_count;
            println!(
                "{} attempt {} (valid {}, invalid {})",
                "Progress:".yellow(),
                job.attempt_count,
                job.valid_responses,
                job.invalid_responses
            );
        }

        match job.status {
            JobStatus::Completed => {
                let result = job
                    .final_result()
                    .ok_or_else(|| eyre::eyre!("Completed job has no result"))?;
                println!(
                    "{} {} chars in {} attempts",
                    "Done:".green(),
                    result.char_count,
                    job.attempt_count
                );
                match output {
                    Some(path) => {
                        fs::write(path, &result.content)
                            .with_context(|| format!("Failed to write {}", path.display()))?;
                        println!("{} {}", "Wrote:".green(), path.display());
                    }
                    None => println!("{}", result.content),
                }
                return Ok(());
            }
            JobStatus::Failed => {
                let reason = job.error_message.as_deref().unwrap_or("unknown failure");
                eprintln!("{} {}", "Failed:".red(), reason);
                eyre::bail!("Generation failed: {}", reason);
            }
            _ => tokio::time::sleep(Duration::from_secs(1)).await,
        }
    }
}

async fn run_outline(
    config: &Config,
    source: &Path,
    instructions: &str,
    sample: Option<&PathBuf>,
) -> Result<()> {
    let source_text = read_source(source)?;
    let sample_outline = sample.map(|p| read_source(p)).transpose()?;

    let client = build_client(config)?;
    println!("{}", "Generating outline...".cyan());
    let outline = client
        .generate_outline(&source_text, instructions, sample_outline.as_deref())
        .await
        .context("Outline generation failed")?;

    println!("{}", outline);
    Ok(())
}

fn print_volumes() {
    println!("{}", "Target volume presets:".cyan());
    for tag in ["15k", "30k", "40k", "60k"] {
        let (min, max) = volume_bounds(tag);
        println!("  {:>4}  {:>6} - {:>6} chars", tag, min, max);
    }
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Generate {
            source,
            volume,
            outline_instructions,
            prose_instructions,
            sample,
            output,
        } => {
            run_generate(
                cli,
                config,
                source,
                volume,
                outline_instructions,
                prose_instructions,
                sample.as_ref(),
                output.as_ref(),
            )
            .await
        }
        Commands::Outline {
            source,
            instructions,
            sample,
        } => run_outline(config, source, instructions, sample.as_ref()).await,
        Commands::Volumes => {
            print_volumes();
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging with the configured default level
    setup_logging(config.log_level.as_deref().unwrap_or("info")).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
