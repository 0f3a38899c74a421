// File: footfall-common/src/models/mod.rs
pub mod visitor;
pub mod session;
pub mod pageview;
pub mod alert;
pub mod viewport;

pub use visitor::{CookieRecord, SameSite, VisitorIdentity};
pub use session::{Session, SessionState};
pub use pageview::PageViewRecord;
pub use alert::DevToolsAlert;
pub use viewport::ViewportSample;
