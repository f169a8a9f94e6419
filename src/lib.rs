//! Zonewright
//!
//! A self-hosted DNS zone file editor.  The [`fmt`] module is the `dnsfmt`
//! canonicalizing reformatter; the [`zone`] module edits zone files on disk
//! in response to DDNS, ACME DNS-01 and generic record-replace requests; the
//! [`server`] module exposes those operations over HTTP.

pub mod api;
pub mod auth;
pub mod config;
pub mod fmt;
pub mod server;
pub mod util;
pub mod zone;
