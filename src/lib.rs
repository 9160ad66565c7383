// src/lib.rs
pub mod acquisition;
pub mod config;
pub mod engine;
pub mod types;
pub use acquisition::{ByteStream, Oscilloscope, ScopeSnapshot};
pub use config::{CalibrationRange, ScopeConfig, SourceConfig};
pub use engine::{spawn, ScopeHandle};
pub use types::{Mode, ScopeCommand, ScopeMessage};
