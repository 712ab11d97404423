pub mod url_validation;
pub use url_validation::{UrlValidationError, is_loopback, validate_endpoint_url};
