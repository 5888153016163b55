//! One-shot sync.

use hearth_server::SyncResult;

use crate::app::App;
use crate::error::{ClientError, ClientResult};

/// Runs one cycle and reports it. Failures become a non-zero exit.
pub async fn run(app: &App) -> ClientResult<()> {
    match app.engine.sync_events().await {
        SyncResult::Success(count) => {
            println!("{}", SyncResult::Success(count));
            Ok(())
        }
        SyncResult::NoCalendarSelected => {
            println!("No calendar selected. Pick one with `hearth calendars` and `hearth select <id>`.");
            Ok(())
        }
        SyncResult::NotAuthenticated => Err(ClientError::AuthRequired(
            "the calendar rejected the stored token; run `hearth auth token`".to_string(),
        )),
        SyncResult::Error(message) => Err(ClientError::Sync(message)),
    }
}
