//! Adapters for the domain ports: in-memory registry storage and audit
//! sinks.

pub mod audit;
pub mod in_memory;
