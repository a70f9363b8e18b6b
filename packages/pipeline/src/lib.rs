//! litscout pipeline - orchestrated discovery, retrieval and relevance
//! screening on top of [`litscout_harvester`].
//!
//! - [`config`]: TOML configuration and validation
//! - [`screening`]: Text excerpts, classifier clients, decisions, filing
//! - [`orchestrator`]: Bounded worker pool and the three pipeline stages
//! - [`cli`]: The `litscout` command line

pub mod cli;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod screening;

pub use config::{ClassifierConfig, HarvestConfig, PipelineConfig, Provider, ScreeningConfig};
pub use error::{PipelineError, Result};
pub use orchestrator::{Orchestrator, PoolSettings, RunSummary};
pub use screening::{Screener, ScreeningOutcome};
