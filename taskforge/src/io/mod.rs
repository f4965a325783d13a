//! I/O collaborators: config, command store, process execution, file
//! listing, prompts and the suggestion service.

pub mod config;
pub mod executor;
pub mod files;
pub mod process;
pub mod prompt;
pub mod spinner;
pub mod store;
pub mod suggester;
