//! Spawn detection, identification and notification engine.

pub mod background;
pub mod color;
pub mod commands;
pub mod config;
pub mod correction;
pub mod error;
pub mod fanout;
pub mod fetch;
pub mod gateway;
mod http;
pub mod identify;
pub mod isolate;
pub mod pipeline;
pub mod pokeapi;
pub mod vision;

#[cfg(test)]
mod test_support;

pub use config::EngineConfig;
pub use error::{PipelineError, PipelineResult};
pub use gateway::{ChatGateway, Presence};
pub use pipeline::{PipelineParts, PipelineRun, SpawnPipeline};
