//! Framework-free presenter: fetches graphs, adapts them, and publishes state
//!
//! The presenter talks to a [`GraphBackend`], either in-process
//! ([`LocalBackend`]) or over HTTP ([`HttpBackend`]), and pushes a full
//! [`PresenterState`] snapshot to every subscriber on each transition.

pub mod backend;
pub mod client;
pub mod state;
pub mod presenter;

#[cfg(test)]
pub mod tests;

pub use backend::{GraphBackend, LocalBackend};
pub use client::HttpBackend;
pub use state::{Phase, PresenterState};
pub use presenter::{GraphPresenter, PresenterError, PresenterOptions, Subscriber, SubscriptionId};
