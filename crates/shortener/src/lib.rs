//! In-memory short code store.
//!
//! Maps generated alphanumeric codes to original URLs. Mappings live for the
//! lifetime of the process.

pub mod normalize;
pub mod store;

pub use normalize::normalize_url;
pub use store::{ShortenError, Shortened, UrlStore};
