// File: footfall-core/src/test_utils/mod.rs
pub mod helpers;

pub use helpers::{RecordingHttpClient, http_with_session, test_config};
