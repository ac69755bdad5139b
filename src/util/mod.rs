//! Helpers for user input and terminal output.
//!
//! - **URL validation**: feed URLs given to `addfeed` and `follow`
//! - **Text**: sanitising and truncating feed-supplied text for `browse`

mod text;
mod url_validator;

pub use text::{preview, strip_control_chars, truncate_to_width};
pub use url_validator::{feed_name_from_url, validate_url, UrlValidationError};
