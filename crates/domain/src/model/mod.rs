//! Data structures shared across the API, storage and OAuth crates.

mod account;
mod ledger;
mod promocode;
mod session;
mod withdrawal;

pub use account::*;
pub use ledger::*;
pub use promocode::*;
pub use session::*;
pub use withdrawal::*;
