pub mod config;
pub mod error;
pub mod ids;
pub mod message;
pub mod traits;

pub use config::Config;
pub use error::PromptPipeError;
