pub mod banner;
pub mod config;
pub mod consts;
pub mod grammar;
pub mod handler;
pub mod limiter;
pub mod server;
pub mod solver;
