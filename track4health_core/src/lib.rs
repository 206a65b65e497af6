#![forbid(unsafe_code)]

//! Core domain model and business logic for Track4Health.
//!
//! This crate provides:
//! - Domain types (users, awareness sessions, child screenings, photos)
//! - Classification rules (MUAC status, age/date-of-birth, duplicates)
//! - Form validation and submission
//! - Persistence (key/value snapshots, record store)
//! - Remote sync client with offline login fallback
//! - Location tracking and dashboard aggregates

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod classify;
pub mod storage;
pub mod store;
pub mod forms;
pub mod sync;
pub mod auth;
pub mod location;
pub mod dashboard;
pub mod app;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use classify::{classify_muac, to_title_case, AgeUnit, MuacThresholds};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use store::{RecordStore, SessionRecord};
pub use sync::{ApiClient, HttpTransport, StaticConnectivity};
pub use auth::AuthSession;
pub use dashboard::{DashboardStats, RecordFilter};
pub use app::AppState;
