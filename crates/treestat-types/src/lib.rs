pub mod result;
pub mod status;
pub mod status_code;

// Re-export commonly used items at the crate root.
pub use result::{make_error, make_error_msg, Result};
pub use status::Status;
pub use status_code::*;
