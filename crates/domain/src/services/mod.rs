//! Account, ledger and session services plus telemetry wiring.

pub mod cache;
pub mod identity;
pub mod ledger;
pub mod promocode;
pub mod session;
pub mod telemetry;
pub mod withdrawal;

pub use cache::*;
pub use identity::*;
pub use ledger::Ledger;
pub use promocode::*;
pub use session::*;
pub use telemetry::*;
pub use withdrawal::*;
