//! Utility functions shared across the crate.
//!
//! - **URL validation**: feed source URLs must be absolute http(s) URLs

mod url_validator;

pub use url_validator::{validate_url, UrlValidationError};
