pub mod cli;
pub mod config;
pub mod error;
pub mod generator;
pub mod labeler;
pub mod logging;
pub mod pipeline;
pub mod store;
