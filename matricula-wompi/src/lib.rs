//! Client crate for the Wompi payments API.
//!
//! Wompi is the hosted checkout the school uses for enrollment fees.  This
//! crate covers the three surfaces the reconciliation services need:
//!
//! - [`client::WompiClient`] — authenticated REST calls (read a transaction,
//!   create a payment link).
//! - [`objects`] — the wire types those calls exchange.
//! - [`events`] — webhook event envelope and checksum verification.
//!
//! The crate never touches local state; every mutation of enrollment data
//! happens in `matricula-core` using what this crate fetched.

pub mod client;
pub mod events;
pub mod objects;

pub use client::{WompiClient, WompiError};
