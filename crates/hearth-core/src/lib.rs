//! Core types: events, classification, directives, time windows, freshness

pub mod directive;
pub mod event;
pub mod freshness;
pub mod time;
pub mod tracing;

pub use directive::{ConfigDirective, ScheduledDirective};
pub use event::{CONFIG_TAG, CachedEvent, DisplayEvent, RemoteEvent, is_config_title};
pub use freshness::{OFFLINE_AFTER, STALE_AFTER, SyncStatus, sync_status};
pub use time::{Clock, DeviceZone, ManualClock, SystemClock, TimeError, TimeWindow};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
