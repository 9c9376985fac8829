pub mod auth;
pub mod authz;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod resource;
pub mod responder;
pub mod server;
pub mod users;
pub mod utils;

#[cfg(test)]
mod tests;
