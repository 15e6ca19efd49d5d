//! clerk core library: host bridge, customer resolution, store client and config,
//! shared by the CLI and any embedding host.

pub mod config;
pub mod host;
pub mod init;
pub mod resolve;
pub mod store;
