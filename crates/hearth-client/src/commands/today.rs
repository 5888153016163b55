//! Today view from the local cache.
//!
//! Reads only the store; never contacts the calendar.

use chrono::Utc;
use hearth_core::DisplayEvent;
use tracing::debug;

use crate::app::App;
use crate::error::{ClientError, ClientResult};
use crate::render::render_today;

/// The current snapshot of today's events.
pub async fn current(app: &App) -> ClientResult<Vec<DisplayEvent>> {
    let mut today = app.engine.observe_todays_events();
    let snapshot = today
        .next()
        .await
        .ok_or_else(|| ClientError::Sync("today feed ended before its first snapshot".to_string()))?;
    today.cancel();
    Ok(snapshot)
}

pub async fn run(app: &App, watch: bool, json: bool) -> ClientResult<()> {
    if !watch {
        let events = current(app).await?;
        print(app, &events, json)?;
        return Ok(());
    }

    let mut today = app.engine.observe_todays_events();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                break;
            }
            snapshot = today.next() => {
                let Some(events) = snapshot else { break };
                print(app, &events, json)?;
                if !json {
                    println!();
                }
            }
        }
    }
    Ok(())
}

fn print(app: &App, events: &[DisplayEvent], json: bool) -> ClientResult<()> {
    if json {
        // One document per line so `--watch --json` can be piped.
        println!("{}", serde_json::to_string(events)?);
    } else {
        println!("{}", render_today(events, Utc::now(), app.engine.config().zone()));
    }
    Ok(())
}
