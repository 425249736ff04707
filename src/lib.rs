pub mod artifact;
pub mod cli;
pub mod config;
pub mod enhancer;
pub mod face;
mod metrics;
pub mod miner;
pub mod record;
mod server;
pub mod trainer;
pub mod utils;

pub use config::Opts;
pub use enhancer::Enhancer;
pub use server::{AppState, create_app};
pub use trainer::Trainer;
