//! Type definitions for arx storage.

mod approvals;
mod folders;
mod ids;
mod imports;
mod projects;
mod secrets;

// Re-export all types from submodules
pub use approvals::*;
pub use folders::*;
pub use ids::*;
pub use imports::*;
pub use projects::*;
pub use secrets::*;
