//! HTTP surface: gateway webhook intake and operator endpoints.

pub mod extractors;
pub mod hooks;
pub mod ops;
