//! Data models

pub mod app;
pub mod device;
pub mod flow;
pub mod model;
pub mod platform;
