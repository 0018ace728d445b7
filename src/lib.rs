pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod interceptor;
pub mod middleware;
pub mod tenant;

#[cfg(test)]
pub mod testing;
