pub mod api;
pub mod blob;
pub mod client;
pub mod cloud;
pub mod device;
pub mod flows;
