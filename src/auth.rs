//! Auth-domain identifiers, grant types, client credentials, and token models.

pub mod client;
pub mod grant;
pub mod id;
pub mod token;

pub use client::*;
pub use grant::*;
pub use id::*;
pub use token::{exchange::*, secret::*};
