//! Client library for the NOIRLab Astro Data Archive REST API.

pub mod client;
pub mod compat;
pub mod config;
pub mod error;
pub mod ext;
pub mod types;

pub use client::Client;
pub use config::Config;
pub use error::{Error, Result};
pub use types::{Constraints, FindOptions, Found, VohduOptions};
