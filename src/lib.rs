#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

pub mod agent;
pub mod auth;
pub mod bridge;
pub mod config;
pub mod error;
pub mod gateway;
pub mod history;
pub mod llm;
pub mod rag;
pub mod resource;
pub mod tools;

pub use config::Config;
pub use error::HelmsmanError;
