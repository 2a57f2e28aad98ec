// Library exports for rolecheck
pub mod account;
pub mod cli;
pub mod config;
pub mod endpoints;
pub mod harness;
pub mod http;
pub mod logging;
pub mod output;
pub mod report;
