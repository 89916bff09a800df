pub mod config;
pub mod error;
pub mod event;
pub mod types;

pub use config::EditorConfig;
pub use error::{Result, VitalError};
pub use event::RunEventBus;
pub use types::*;
