use std::time::Duration;

/// Protocol version this engine speaks on the wire.
pub const X402_VERSION: u32 = 2;

/// Scheme name for single-use, fixed-destination transfers.
pub const SCHEME_EXACT: &str = "exact";

/// Interval between finality status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Upper bound on how long a settlement waits for a terminal state.
pub const DEFAULT_FINALITY_TIMEOUT: Duration = Duration::from_secs(120);

/// Base delay between retries of a transient dry-run failure.
pub const DRY_RUN_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Domain tag folded into every binding hash. Bump the suffix when the
/// canonical encoding changes.
pub const BINDING_DOMAIN: &[u8] = b"x402:binding:v1";
