//! Offorte quoting platform connector.

pub mod client;
pub mod models;

pub use client::OfforteClient;
