//! Domain-level building blocks shared by the API, storage and OAuth crates.
//!
//! Business rules for accounts, the diamond ledger, withdrawals and promocodes
//! live here behind storage traits, so the HTTP surface only translates
//! requests and the storage crate only has to honour the atomic contracts.

pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod services;
pub mod storage;

pub use error::{RewardsError, ValidationError};
pub use model::*;
pub use provider::{IdentityProvider, ProviderError};
pub use storage::*;
