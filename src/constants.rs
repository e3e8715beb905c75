use std::time::Duration;

// -
// Key namespaces
//
// Fixed deployment contract: the external controller writes assignment
// records under the same paths, so these must not change once deployed.

/// A node's liveness record lives at `<REGISTRATION_PREFIX>/<host>/<REGISTRATION_SUFFIX>`
pub(crate) const REGISTRATION_PREFIX: &str = "/nodebeat/agent";
pub(crate) const REGISTRATION_SUFFIX: &str = "register";

/// A node's assignment inbox lives at `<ASSIGNMENT_PREFIX>/<host>`
pub(crate) const ASSIGNMENT_PREFIX: &str = "/nodebeat/worker";

// -
// Lease timing

/// Applied when a caller registers with a zero TTL
pub(crate) const DEFAULT_REGISTRATION_TTL: Duration = Duration::from_secs(30);

/// The lease is renewed this many times per TTL window
pub(crate) const KEEPALIVE_TICKS_PER_TTL: u32 = 3;

// -
// Channel capacities

pub(crate) const WATCH_CHANNEL_CAPACITY: usize = 64;
pub(crate) const KEEPALIVE_CHANNEL_CAPACITY: usize = 4;
