//! Cooldown-aware proxy rotation
//!
//! Leases proxy identifiers from a shared pool, enforcing a minimum idle
//! interval (cooldown) before a proxy can be handed out again. Cooldowns are
//! tracked independently per namespace, so one caller context can reuse a
//! proxy every second while another waits a minute.
//!
//! Lease lifecycle:
//! 1. Caller sets the pool via `Rotator::set_pool` → every namespace tracks every proxy
//! 2. New proxies start eligible (stamped `now - cooldown - jitter`)
//! 3. `Rotator::lease` picks the least-recently-used eligible proxy and stamps it `now`
//! 4. The proxy is ineligible in that namespace until its cooldown elapses
//! 5. When nothing is eligible, `NoAvailableResource` reports how long to wait

pub mod error;
pub mod metrics;
pub mod namespace;
pub mod rotator;

pub use error::{Error, Result};
pub use namespace::NamespaceConfig;
pub use rotator::{DEFAULT_NAMESPACE, Rotator, RotatorSettings};
