//! Client constants
//!
//! Defaults shared by the configuration types and the retry machinery.

// Configuration defaults
pub const DEFAULT_RETRY_LIMIT: u32 = 5;
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RETRY_DIR_NAME: &str = "mailwire-retry";

// Read paging
pub const FIRST_PAGE: u32 = 1;

// Retry store file format
pub const RETRY_FILE_EXTENSION: &str = "json";
pub const RETRY_FORMAT_VERSION: u32 = 1;

/// Code reported for result items missing from a short batch response.
pub const MISSING_RESULT_CODE: i64 = -1;
