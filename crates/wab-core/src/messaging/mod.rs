//! Transport abstractions: the outbound port, inbound envelopes, and a throttling decorator.

pub mod port;
pub mod throttled;
pub mod types;
