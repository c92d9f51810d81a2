//! Chorus - coordination server for fleets of autonomous agents
//!
//! Chorus arbitrates who may work on what and when across a forest of
//! tasks under projects:
//! - Derived task state (effective points, readiness) recomputed on read
//! - Typed, time-bounded work leases with heartbeat and take-over
//! - Atomic work operations (size, breakdown, refine, complete) with
//!   idempotency-key replay
//! - Readiness-driven discovery views for agent pickup

pub mod adapters;
pub mod config;
pub mod domain;
pub mod services;
