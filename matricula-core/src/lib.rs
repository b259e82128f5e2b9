#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod entities;
pub mod events;
pub mod gateway;
pub mod identity;
pub mod notify;
pub mod processors;
pub mod store;
pub mod utils;

#[cfg(test)]
mod testutil;
