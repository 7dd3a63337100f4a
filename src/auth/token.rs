//! Token values exchanged with the upstream token endpoint.

pub mod exchange;
pub mod secret;
