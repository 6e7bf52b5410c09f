pub mod client;
pub mod config;
pub mod ipc;
pub mod supervisor;
