//! Shared utilities: duration parsing, address helpers, library merging and schema checks.

pub mod duration;
pub mod ip_utils;
pub mod options;
pub mod validation;

pub use duration::parse_duration_to_seconds;
pub use ip_utils::{parse_prefix, Prefix};
pub use options::merge_named;
pub use validation::{check_document, Field, Kind};
