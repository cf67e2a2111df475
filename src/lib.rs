pub mod api_connection;
pub mod availability;
pub mod backend;
pub mod cellar;
pub mod cli;
pub mod config;
pub mod dinner;
pub mod error;
pub mod menu;

pub use error::{PipelineError, PipelineResult};
