// src/lib.rs

pub mod backend;
pub mod beacon;
pub mod client;
pub mod config;
pub mod detector;
pub mod eventbus;
pub mod http;
pub mod identity;
pub mod pageview;
pub mod realtime;
pub mod session;
pub mod sink;
pub mod test_utils;

pub use client::AnalyticsClient;
pub use config::AnalyticsConfig;
pub use footfall_common::error::Error;
pub use http::{DefaultHttpClient, HttpClient};
