//! Camsync Library
//!
//! Core modules for the camsync workspace agent.

pub mod app;
pub mod authn;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod sync;
pub mod utils;
pub mod workers;
pub mod workspace;
