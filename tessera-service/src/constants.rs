//! Constants for the tessera service

// ============================================================================
// LOGGING
// ============================================================================

/// Filter used when neither `TESSERA_LOG` nor `RUST_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = "tessera=debug,info";

// ============================================================================
// SHUTDOWN
// ============================================================================

/// How long `main` waits for all refresh tasks after ctrl-c (10 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 10_000;

/// How long an in-flight refresh may run past shutdown (5 seconds).
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

// ============================================================================
// RECORD FIELDS
// ============================================================================

/// Payload fields tried, in order, when resolving a record's id.
pub const ID_FIELDS: &[&str] = &["id", "name"];

/// Payload field carrying the record's modification instant.
pub const LAST_MODIFIED_FIELD: &str = "lastModified";
