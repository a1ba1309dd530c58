//! Shroud - a privacy focused DNS-over-HTTPS resolver.
//!
//! Translates plaintext DNS lookups into encrypted HTTPS queries against a
//! selectable DoH provider and exposes the resolution as a local
//! DNS-compatible service. The library surface is the resolver, the wire
//! codec, and the listeners, so hosts can embed the resolution layer or run
//! the bundled proxy binary.

pub mod cache;
pub mod dns;
pub mod error;
pub mod provider;
pub mod proxy;
pub mod resolver;
pub mod stats;
pub mod transport;
