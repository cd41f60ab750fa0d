pub mod flow_watcher;
pub mod poll;
pub mod status;
pub mod update;
