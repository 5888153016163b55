//! Google Calendar client.
//!
//! The kiosk never runs the interactive consent flow itself. It expects a
//! token pair in the [`CredentialStore`](crate::CredentialStore), provisioned
//! with `hearth auth token`, and refreshes the access token with the
//! configured OAuth client when it expires.

mod client;
mod config;
mod oauth;

pub use client::GoogleCalendarClient;
pub use config::{GoogleConfig, OAuthCredentials};
pub use oauth::OAuthClient;
