//! Client for the LinkedIn agent service that resolves profile URLs into
//! structured profile data.

mod client;
mod types;

pub use client::LinkedinClient;
pub use types::*;
