//! Daemon command: runs the scheduler in the foreground.
//!
//! - Scheduler (periodic sync through a single-flight gate)
//! - Today subscriptions (logged as they change)
//! - Ctrl-C for shutdown

use std::sync::Arc;
use std::time::Duration;

use hearth_server::{Scheduler, SyncGate};
use tracing::{info, warn};

use crate::app::App;
use crate::error::ClientResult;
use crate::render::{render_directives, render_today};

pub async fn run(app: &App) -> ClientResult<()> {
    let scheduler_config = app.config.sync.to_scheduler_config()?;
    let zone = app.engine.config().zone();

    info!(
        interval_secs = scheduler_config.sync_interval.as_secs(),
        zone = %zone,
        calendar = ?app.engine.selected_calendar_id(),
        "starting daemon"
    );

    let scheduler = Scheduler::new(scheduler_config);
    let handle = scheduler.handle();
    let gate = Arc::new(SyncGate::new(app.engine.clone()));
    let scheduler_task = tokio::spawn(scheduler.run_with_gate(gate));

    let projector = app.engine.today();
    let mut events = projector.observe_todays_events();
    let mut directives = projector.observe_todays_directives();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            snapshot = events.next() => {
                let Some(snapshot) = snapshot else { break };
                info!(count = snapshot.len(), "today:\n{}", render_today(&snapshot, chrono::Utc::now(), zone));
            }
            snapshot = directives.next() => {
                let Some(snapshot) = snapshot else { break };
                if !snapshot.is_empty() {
                    info!(count = snapshot.len(), "directives:\n{}", render_directives(&snapshot, zone));
                }
            }
        }
    }

    info!("shutting down");
    events.cancel();
    directives.cancel();
    if let Err(e) = handle.stop().await {
        warn!(error = %e, "failed to send stop command to scheduler");
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), scheduler_task).await;

    let state = handle.state().await;
    info!(
        last_success = ?state.last_success,
        consecutive_failures = state.consecutive_failures,
        "daemon stopped"
    );
    Ok(())
}
