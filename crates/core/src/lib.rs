pub mod config;
pub mod error;
pub mod event;
pub mod trigger;

pub use config::SenderSettings;
pub use error::*;
pub use event::*;
pub use trigger::*;
