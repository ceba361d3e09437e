//! OAuth identity providers. Each provider turns an authorization code into
//! an [`ExternalProfile`](rewards_domain::ExternalProfile) and nothing more;
//! account resolution stays in the domain crate.

pub mod discord;

pub use discord::{DiscordProvider, DiscordToken, DiscordUser};
