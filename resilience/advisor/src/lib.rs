#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms,
    missing_docs
)]

//! Supply-chain indicator scoring with generated mitigation advice.

/// Typed failures and their exit codes.
pub mod error;

/// Sales and risk scoring of the four indicators.
pub mod scoring;

/// Analyst prompt construction and advice splitting.
pub mod prompt;

/// Generative-text collaborator and its hosted implementation.
pub mod client;

/// Scoring plus generation, rendered for the terminal.
pub mod report;

pub use client::{GeminiClient, GeminiSettings, Generation, TextGenerator};
pub use error::AdvisorError;
pub use report::{advise, AdvisorReport};
pub use scoring::{assess, Assessment, Indicators, RiskLevel};
