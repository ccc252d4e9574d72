use async_trait::async_trait;
use chatflow_core::TimerId;
use chatflow_flow::Flow;
use chatflow_runner::{Host, InboundMessage, Outbound, RunnerConfig, RunnerError};
use chatflow_scheduler::{
    DelayScheduler, DeliveryError, FireOutcome, Resumption, ResumptionSink, TimerDriver,
};
use chrono::{DateTime, Utc};
use rootcause::Report;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Forwards fired timers to the main loop.
struct ChannelSink(mpsc::Sender<Resumption>);

#[async_trait]
impl ResumptionSink for ChannelSink {
    async fn deliver(&self, resumption: Resumption) -> Result<(), DeliveryError> {
        self.0
            .send(resumption)
            .await
            .map_err(|_| DeliveryError::new("runner loop has stopped"))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match RunnerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            tracing::error!("{report}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: RunnerConfig) -> Result<(), Report<RunnerError>> {
    let json = std::fs::read_to_string(&config.flow_path).map_err(|e| RunnerError::FlowFile {
        path: config.flow_path.clone(),
        details: e.to_string(),
    })?;
    let flow = Flow::from_json(&json).map_err(RunnerError::from)?;
    tracing::info!(
        flow = %flow.name(),
        nodes = flow.node_count(),
        edges = flow.edge_count(),
        "Loaded flow"
    );

    let scheduler = Arc::new(DelayScheduler::new());
    let mut host = Host::new(flow, Arc::clone(&scheduler))?;

    let (resume_tx, mut resume_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let driver = TimerDriver::new(
        Arc::clone(&scheduler),
        ChannelSink(resume_tx.clone()),
        &config.scheduler,
    );
    let driver_task = tokio::spawn(driver.run(shutdown_rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line.map_err(RunnerError::from)? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => match serde_json::from_str::<InboundMessage>(&line) {
                        Ok(message) => {
                            let out = host.on_message(message, Utc::now());
                            emit(&mut stdout, &out, &scheduler, &resume_tx).await?;
                        }
                        Err(e) => tracing::warn!(error = %e, "Skipping malformed input line"),
                    },
                    None => {
                        tracing::info!(pending_timers = scheduler.active_count(), "Input closed");
                        stdin_open = false;
                    }
                }
            }
            Some(resumption) = resume_rx.recv() => {
                let out = host.on_resumption(resumption, Utc::now());
                emit(&mut stdout, &out, &scheduler, &resume_tx).await?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }

        if !stdin_open && scheduler.active_count() == 0 {
            break;
        }
    }

    // The driver may already be gone; nothing to stop then.
    let _ = shutdown_tx.send(true);
    if let Err(e) = driver_task.await {
        tracing::warn!(error = %e, "Timer driver task failed");
    }
    Ok(())
}

/// Writes decisions to stdout and schedules wake-ups for blocking delays.
async fn emit(
    stdout: &mut Stdout,
    out: &[Outbound],
    scheduler: &Arc<DelayScheduler>,
    resume_tx: &mpsc::Sender<Resumption>,
) -> Result<(), RunnerError> {
    for decision in out {
        if let Outbound::Suspended {
            handle, resume_at, ..
        } = decision
        {
            wake_at(Arc::clone(scheduler), *handle, *resume_at, resume_tx.clone());
        }
        let mut line = serde_json::to_string(decision).map_err(|e| RunnerError::Io {
            details: e.to_string(),
        })?;
        line.push('\n');
        stdout.write_all(line.as_bytes()).await?;
    }
    stdout.flush().await?;
    Ok(())
}

/// Fires a blocking delay at `resume_at`.
fn wake_at(
    scheduler: Arc<DelayScheduler>,
    handle: TimerId,
    resume_at: DateTime<Utc>,
    resume_tx: mpsc::Sender<Resumption>,
) {
    tokio::spawn(async move {
        let wait = (resume_at - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        match scheduler.on_timer_fire(handle, Utc::now().max(resume_at)) {
            FireOutcome::Fired(resumption) => {
                if resume_tx.send(resumption).await.is_err() {
                    tracing::warn!(%handle, "Runner loop stopped before resume");
                }
            }
            FireOutcome::Ignored(reason) => {
                tracing::debug!(%handle, ?reason, "Blocking delay not resumed");
            }
        }
    });
}
