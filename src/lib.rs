pub mod agency;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod node;
pub mod shutdown;
pub mod supervision;
