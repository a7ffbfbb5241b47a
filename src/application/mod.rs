//! Application layer orchestrating franchise lifecycle transitions.
//!
//! `LifecycleCoordinator` is the only component that mutates the registry
//! collections. It owns the transition rules; the storage and audit ports
//! it drives are injected as boxed trait objects.

pub mod lifecycle;
