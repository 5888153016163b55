//! Live projection of the current local day.
//!
//! A subscription runs as its own task: it follows the store's live query
//! for today's window, projects every snapshot, and re-targets the window at
//! local midnight. Dropping or cancelling the [`Subscription`] stops the task
//! and releases the store query.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use hearth_core::{CachedEvent, Clock, DeviceZone, DisplayEvent, ScheduledDirective};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::store::EventStore;

/// Shortest wait before re-checking the day boundary.
const MIN_ROLLOVER_WAIT: Duration = Duration::from_secs(1);

/// Snapshots buffered per subscriber before the task waits.
const SUBSCRIPTION_BUFFER: usize = 8;

/// A push-based, infinite sequence of snapshots.
///
/// Not replayable: each subscriber sees the current snapshot followed by
/// changes from the moment it subscribed.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> Subscription<T> {
    /// Waits for the next snapshot. Returns `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Stops the feed. Equivalent to dropping the subscription.
    pub fn cancel(mut self) {
        self.rx.close();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

/// Projects the store onto "today" in the device zone.
#[derive(Clone)]
pub struct TodayProjector {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    zone: DeviceZone,
}

impl std::fmt::Debug for TodayProjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TodayProjector")
            .field("zone", &self.zone)
            .finish_non_exhaustive()
    }
}

impl TodayProjector {
    pub fn new(store: Arc<dyn EventStore>, clock: Arc<dyn Clock>, zone: DeviceZone) -> Self {
        Self { store, clock, zone }
    }

    /// Today's display events. Config events never appear.
    ///
    /// Must be called within a tokio runtime.
    pub fn observe_todays_events(&self) -> Subscription<Vec<DisplayEvent>> {
        self.observe(CachedEvent::to_display)
    }

    /// Today's configuration directives, for scheduling display sleep and
    /// wake.
    pub fn observe_todays_directives(&self) -> Subscription<Vec<ScheduledDirective>> {
        self.observe(ScheduledDirective::from_cached)
    }

    fn observe<T, F>(&self, project: F) -> Subscription<Vec<T>>
    where
        T: Clone + PartialEq + Send + 'static,
        F: Fn(&CachedEvent) -> Option<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let store = self.store.clone();
        let clock = self.clock.clone();
        let zone = self.zone;

        tokio::spawn(async move {
            let mut last: Option<Vec<T>> = None;

            loop {
                let now = clock.now();
                let window = zone.day_window(now);
                let until_midnight = (window.end - now)
                    .to_std()
                    .unwrap_or_default()
                    .max(MIN_ROLLOVER_WAIT);
                debug!(window = %window, "following today's window");

                let mut rows = store.events_for_day(window);
                let rollover = tokio::time::sleep(until_midnight);
                tokio::pin!(rollover);

                loop {
                    tokio::select! {
                        _ = tx.closed() => {
                            debug!("today subscription cancelled");
                            return;
                        }
                        _ = &mut rollover => {
                            debug!("day boundary reached");
                            break;
                        }
                        snapshot = rows.next() => {
                            let Some(snapshot) = snapshot else {
                                debug!("store feed ended");
                                return;
                            };
                            let projected: Vec<T> = snapshot.iter().filter_map(&project).collect();
                            if last.as_ref() == Some(&projected) {
                                trace!("projection unchanged");
                                continue;
                            }
                            last = Some(projected.clone());
                            if tx.send(projected).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        Subscription { rx }
    }
}
