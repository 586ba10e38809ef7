pub mod artifacts;
pub mod assembler;
pub mod classify;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod fee;
pub mod http;
pub mod keys;
pub mod planner;
pub mod provider;
pub mod record;
pub mod report;
pub mod signer;
pub mod types;
