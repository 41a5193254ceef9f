pub mod config;
pub mod errors;
pub mod git;
pub mod guard;
pub mod health;
pub mod journal;
pub mod patterns;
pub mod simulator;

pub use errors::GitbossError;
