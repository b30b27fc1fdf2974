//! admision-moodle: Moodle web-service integration.
//!
//! Implements the `GradingSource` trait over Moodle's REST endpoint, plus
//! the configuration file shared by the command-line tool and an in-memory
//! source for tests.

pub mod client;
pub mod config;
pub mod error;
pub mod mock;

pub use client::{MoodleClient, SiteInfo, REQUIRED_FUNCTIONS};
pub use config::{load_config, load_config_from, AdmisionConfig, MoodleSettings};
pub use error::MoodleError;
pub use mock::MockSource;
