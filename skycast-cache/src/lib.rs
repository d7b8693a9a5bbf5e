//! # skycast-cache
//!
//! Best-effort freshness cache keyed by [`Fingerprint`].
//!
//! [`ExpiringCache`] is the contract Data Sources depend on; [`FileCache`]
//! (one JSON document per entry, atomic replace on write) is the production
//! store and [`MemoryCache`] the in-process one.

pub mod age;
pub mod error;
pub mod file;
pub mod fingerprint;
pub mod memory;
pub mod store;

pub use error::CacheError;
pub use file::{EntryInfo, FileCache};
pub use fingerprint::Fingerprint;
pub use memory::MemoryCache;
pub use store::ExpiringCache;
