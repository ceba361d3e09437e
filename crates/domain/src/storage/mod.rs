//! Storage contracts the services rely on. Implementations must provide the
//! atomicity each method documents; the services never compose two calls into
//! one logical write.

mod traits;

pub use traits::*;
