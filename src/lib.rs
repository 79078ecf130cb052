pub mod app;
pub mod cli;
pub mod config;
pub mod detector;
pub mod logging;
pub mod output;
pub mod plugin;
pub mod progress;
pub mod runner;
pub mod scheduler;
pub mod utils;

#[cfg(test)]
mod tests;
