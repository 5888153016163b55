//! Status command.

use chrono::Utc;

use crate::app::App;
use crate::error::ClientResult;
use crate::render::{StatusReport, render_status};

pub fn report(app: &App) -> StatusReport {
    StatusReport {
        calendar_id: app.engine.selected_calendar_id(),
        status: app.engine.sync_status(),
        last_sync: app.engine.last_sync_time(),
    }
}

pub fn run(app: &App, json: bool) -> ClientResult<()> {
    let report = report(app);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render_status(&report, Utc::now(), app.engine.config().zone()));
    }
    Ok(())
}
