//! `studydesk-watch` -- follow the progress of an ingestion job.
//!
//! Subscribes to the progress publisher for one job id and prints every
//! update until the job completes or fails. When the stream drops while the
//! job is still running, a fresh subscription is opened with exponential
//! backoff.
//!
//! # Environment variables
//!
//! | Variable                        | Default                 |
//! |---------------------------------|-------------------------|
//! | `PROGRESS_BASE_URL`             | `http://localhost:8000` |
//! | `PROGRESS_CONNECT_TIMEOUT_SECS` | `10`                    |
//! | `PROGRESS_COMPLETED_GRACE_MS`   | `1000`                  |
//! | `PROGRESS_FAILED_GRACE_MS`      | `5000`                  |
//! | `PROGRESS_CONNECTING_LABEL`     | `Connecting...`         |

use std::process::ExitCode;

use clap::Parser;
use studydesk_core::{JobId, JobPhase};
use studydesk_progress::api::ProgressApi;
use studydesk_progress::{Lifecycle, ProgressClient, ProgressConfig, SubscriptionView};
use studydesk_watch::backoff::{Backoff, BackoffConfig};
use studydesk_watch::render;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "studydesk-watch", about = "Follow the progress of an ingestion job")]
struct Args {
    /// Job (document) id returned by the upload endpoint
    job_id: String,

    /// Publisher base URL, overrides PROGRESS_BASE_URL
    #[arg(long)]
    base_url: Option<String>,

    /// Print one JSON object per update instead of a status line
    #[arg(long)]
    json: bool,

    /// Re-subscriptions allowed after the stream drops mid-job
    #[arg(long, default_value_t = 5)]
    retries: u32,

    /// Query the current status once and exit
    #[arg(long)]
    status: bool,
}

/// How one subscription ended.
enum Outcome {
    Finished(Option<JobPhase>),
    Dropped,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studydesk_watch=info,studydesk_progress=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let Some(job_id) = JobId::parse(&args.job_id) else {
        anyhow::bail!("job id must not be empty");
    };

    let mut config = ProgressConfig::from_env();
    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.trim_end_matches('/').to_string();
    }

    tracing::info!(job_id = %job_id, base_url = %config.base_url, "Starting studydesk-watch");

    if args.status {
        return print_status(config, &job_id, args.json).await;
    }

    let client = ProgressClient::from_config(config)?;
    let mut backoff = Backoff::new(BackoffConfig {
        max_attempts: args.retries,
        ..Default::default()
    });

    loop {
        match follow(&client, &job_id, args.json, &mut backoff).await? {
            Outcome::Finished(Some(JobPhase::Completed)) => return Ok(ExitCode::SUCCESS),
            Outcome::Finished(_) => return Ok(ExitCode::FAILURE),
            Outcome::Dropped => {
                let Some(delay) = backoff.next_attempt() else {
                    tracing::error!(job_id = %job_id, "Progress stream lost, giving up");
                    return Ok(ExitCode::FAILURE);
                };
                tracing::warn!(
                    job_id = %job_id,
                    attempt = backoff.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    "Progress stream lost, re-subscribing",
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Follow one subscription until it settles.
async fn follow(
    client: &ProgressClient,
    job_id: &JobId,
    json: bool,
    backoff: &mut Backoff,
) -> anyhow::Result<Outcome> {
    let mut sub = client.subscribe(job_id.as_str());

    sub.on_completed(|summary| println!("{}", render::completion_message(summary.as_ref())));
    sub.on_failed(|reason| eprintln!("Failed: {reason}"));

    let mut rx = sub.watch();
    let mut saw_progress = false;
    let outcome = loop {
        let view = rx.borrow_and_update().clone();
        print_view(&view, json)?;

        if view.phase().is_some_and(|p| p != JobPhase::Pending) && !saw_progress {
            saw_progress = true;
            backoff.reset();
        }
        if view.is_settled() {
            break if view.lifecycle == Lifecycle::Closed {
                Outcome::Finished(view.phase())
            } else {
                Outcome::Dropped
            };
        }
        if rx.changed().await.is_err() {
            break Outcome::Dropped;
        }
    };

    sub.shutdown().await;
    Ok(outcome)
}

async fn print_status(
    config: ProgressConfig,
    job_id: &JobId,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let api = ProgressApi::new(config);
    match api.fetch_status(job_id).await? {
        Some(snapshot) if json => println!("{}", serde_json::to_string(&snapshot)?),
        Some(snapshot) => println!(
            "[{:>3}%] {} {}",
            snapshot.percent_complete, snapshot.phase, snapshot.step_description
        ),
        None => {
            println!("No progress recorded for {job_id}");
            return Ok(ExitCode::FAILURE);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_view(view: &SubscriptionView, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", render::render_json(view)?);
    } else {
        println!("{}", render::render_text(view));
    }
    Ok(())
}
