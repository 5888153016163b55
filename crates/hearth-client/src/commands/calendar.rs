//! Calendar selection commands.

use hearth_server::ServerError;

use crate::app::App;
use crate::error::{ClientError, ClientResult};
use crate::render::{calendar_entries, render_calendars};

pub fn select(app: &App, calendar_id: &str) -> ClientResult<()> {
    app.engine.select_calendar(calendar_id)?;
    println!("Selected {}. Run `hearth sync` to fetch today's events.", calendar_id.trim());
    Ok(())
}

pub fn deselect(app: &App) -> ClientResult<()> {
    app.engine.clear_calendar()?;
    println!("No calendar selected.");
    Ok(())
}

pub async fn list(app: &App, json: bool) -> ClientResult<()> {
    let calendars = match app.engine.list_calendars().await {
        Ok(calendars) => calendars,
        Err(ServerError::Provider(e)) if e.is_auth_failure() => {
            return Err(ClientError::AuthRequired(e.message().to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let selected = app.engine.selected_calendar_id();
    if json {
        let entries = calendar_entries(&calendars, selected.as_deref());
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        println!("{}", render_calendars(&calendars, selected.as_deref()));
    }
    Ok(())
}
