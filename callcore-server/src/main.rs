//! Process entrypoint: loads configuration, wires the call
//! orchestration core, starts the background queue-processor ticker,
//! and serves the HTTP surface described in spec §6.

mod error;
mod routes;
mod state;

use std::net::SocketAddr;
use std::time::Duration;

use callcore::{CallCore, CallCoreConfig};
use tracing::{error, info};

use state::AppState;

const PROCESSOR_TICK_INTERVAL: Duration = Duration::from_secs(15);
const TRIGGER_RESUME_TICK_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .json()
        .init();

    let config = CallCoreConfig::load(Some("callcore.toml"))?;
    let bind_address = std::env::var("CALLCORE_BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    info!("starting call orchestration core");
    let core = CallCore::new(config).await?;

    spawn_processor_ticker(core.clone());
    spawn_trigger_resume_ticker(core.clone());

    let state = AppState { core };
    let app = routes::build_router(state);

    let addr: SocketAddr = bind_address.parse()?;
    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// spec.md §6.2: "`POST /queue/process` — idempotent trigger; honored
/// by scheduler cron." This is that cron, running in-process rather
/// than as an external scheduled job so the binary is self-contained;
/// nothing stops an operator from also hitting the HTTP route directly
/// (e.g. right after a direct enqueue) since the processor's own
/// advisory lock makes concurrent passes safe.
fn spawn_processor_ticker(core: std::sync::Arc<CallCore>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PROCESSOR_TICK_INTERVAL);
        loop {
            ticker.tick().await;
            match core.processor.process_smart().await {
                Ok(outcome) => {
                    if let callcore::processor::ProcessOutcome::Processed { dispatched } = outcome {
                        if dispatched > 0 {
                            info!(dispatched, "processor tick dispatched calls");
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "processor tick failed");
                }
            }
        }
    });

    info!(interval_secs = PROCESSOR_TICK_INTERVAL.as_secs(), "background processor ticker started");
}

/// spec.md §4.10: "wait actions schedule the next action via
/// `scheduledFor`" — this is what actually honors that schedule. A
/// flow paused mid-`Wait` sits in `trigger_continuations` until this
/// tick notices `resume_at` has elapsed and replays the remaining
/// actions.
fn spawn_trigger_resume_ticker(core: std::sync::Arc<CallCore>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TRIGGER_RESUME_TICK_INTERVAL);
        loop {
            ticker.tick().await;
            match core.triggers.resume_due(chrono::Utc::now()).await {
                Ok(resumed) => {
                    if resumed > 0 {
                        info!(resumed, "trigger continuations resumed");
                    }
                }
                Err(e) => {
                    error!(error = %e, "trigger continuation resume tick failed");
                }
            }
        }
    });

    info!(
        interval_secs = TRIGGER_RESUME_TICK_INTERVAL.as_secs(),
        "background trigger-continuation resume ticker started"
    );
}
