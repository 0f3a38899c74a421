// File: footfall-common/src/traits/mod.rs
pub mod identity_traits;
pub mod host_traits;
pub mod sink_traits;

pub use identity_traits::CookieJar;
pub use host_traits::ViewportSource;
pub use sink_traits::{MeasurementEvent, MeasurementSink};
