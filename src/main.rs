//! upload-queue - simulated upload queue runner
//!
//! Submits a batch of generated payloads to a queue backed by the simulated
//! transport and reports progress until every job has finished.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use upload_queue::queue::QueueEvent;
use upload_queue::{Payload, QueueManager, QueueSettings, SimulatedTransport, UploadHooks};

#[derive(Parser)]
struct Args {
    /// Number of uploads to submit
    #[arg(long, default_value_t = 6)]
    jobs: usize,

    /// Size of each generated payload in bytes
    #[arg(long, default_value_t = 512 * 1024)]
    size: usize,

    /// Maximum concurrent uploads (overrides the settings file)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Probability that a simulated transfer attempt fails
    #[arg(long)]
    failure_rate: Option<f64>,

    /// JSON settings file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_batch(args))
}

async fn run_batch(args: Args) -> Result<()> {
    let mut settings = match &args.config {
        Some(path) => QueueSettings::from_json_file(path)?,
        None => QueueSettings::default(),
    };
    if let Some(concurrency) = args.concurrency {
        settings.max_concurrent = concurrency;
    }
    if let Some(rate) = args.failure_rate {
        settings.simulation.failure_rate = rate.clamp(0.0, 1.0);
    }

    let transport = Arc::new(SimulatedTransport::new(settings.simulation.clone()));
    let queue = QueueManager::new(settings, transport);
    let mut events = queue.subscribe();

    info!(
        "Submitting {} uploads, {} at a time",
        args.jobs,
        queue.settings().max_concurrent
    );

    for i in 0..args.jobs {
        let payload = Payload::new(
            format!("upload-{}.bin", i),
            "application/octet-stream",
            vec![(i % 256) as u8; args.size],
        );
        let hooks = UploadHooks::new()
            .on_complete(move |result| {
                println!("[{}] stored at {} ({} bytes)", i, result.location, result.size);
            })
            .on_error(move |error| {
                eprintln!("[{}] gave up: {}", i, error);
            });
        queue.submit(payload, (i % 3) as i32, hooks).await;
    }

    loop {
        let snapshot = queue.snapshot().await;
        if snapshot.waiting == 0 && snapshot.uploading == 0 {
            println!(
                "Done: {} completed, {} failed",
                snapshot.completed, snapshot.error
            );
            break;
        }

        match tokio::time::timeout(Duration::from_millis(500), events.recv()).await {
            Ok(Ok(QueueEvent::JobProgress { token, progress, .. })) => {
                if let Some(view) = queue.get(&token).await {
                    println!(
                        "{}: {}%, {:.1} KB/s, ETA {:?}",
                        view.name,
                        progress,
                        view.speed / 1024.0,
                        view.eta
                    );
                }
            }
            Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) | Err(_) => {}
            Ok(Err(RecvError::Closed)) => break,
        }
    }

    Ok(())
}
