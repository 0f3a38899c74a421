// File: footfall-common/src/traits/identity_traits.rs

use async_trait::async_trait;
use crate::error::Error;
use crate::models::visitor::CookieRecord;

/// Storage for durable cookie records, keyed by cookie name.
///
/// The embedding host decides where records live (a JSON file in a profile
/// directory, process memory for tests, a real browser jar in a wasm host).
/// Implementations must return `Ok(None)` for a missing entry rather than an
/// error; errors are reserved for the storage itself failing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CookieJar: Send + Sync {
    async fn load(&self, name: &str) -> Result<Option<CookieRecord>, Error>;
    async fn store(&self, record: &CookieRecord) -> Result<(), Error>;
    async fn remove(&self, name: &str) -> Result<(), Error>;
}
