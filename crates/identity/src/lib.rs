//! Delegated token acquisition for Teams single sign-on.
//!
//! [`SsoAssertion`] does the local structural checks on the identity token Teams hands the
//! bot; [`OnBehalfOfClient`] trades it for a user-scoped access token.

pub mod assertion;
pub mod client;

pub use assertion::SsoAssertion;
pub use client::{OnBehalfOfClient, OnBehalfOfSettings, TokenExchangeClient};
