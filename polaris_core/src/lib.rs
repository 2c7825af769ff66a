// polaris_core/src/lib.rs

// This file defines the public modules of your library.
pub mod config;
pub mod errors;
pub mod estimation;
pub mod prelude;
pub mod rotation;
pub mod types;
