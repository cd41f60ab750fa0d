pub mod actions;
pub mod service;
