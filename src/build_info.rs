//! Static information that is determined at build time.

/// Default client ID that is used when the user does not specify one.
///
/// Technically a client id is optional, but some broker implementations fail
/// to parse requests without one.
pub const DEFAULT_CLIENT_ID: &str = env!("CARGO_PKG_NAME");
