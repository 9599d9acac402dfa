//! User profile aggregation.
//!
//! The [`engine::Aggregator`] builds one enriched profile per request by
//! fanning out to the upstream field fetchers behind the
//! [`directory::Directory`] trait. The profile group is essential; every
//! other field group degrades independently to a documented default with
//! the failure recorded in the result's `errors` list.

pub mod directory;
pub mod engine;
pub mod errors;
pub mod testutils;
pub mod types;

pub use directory::{Directory, HttpDirectory};
pub use engine::Aggregator;
pub use errors::{AggregateError, DirectoryError};
pub use types::{Profile, UserDetails};
