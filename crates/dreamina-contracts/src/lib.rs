//! Shared data model for the dreamina client: job records and submission
//! types, asset/credential types, the model registry, tuning knobs, and the
//! error taxonomy. No I/O lives here.

pub mod assets;
pub mod config;
pub mod credit;
pub mod errors;
pub mod jobs;
pub mod models;
