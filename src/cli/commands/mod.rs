//! One module per CLI subcommand.

pub mod add;
pub mod audit_cmd;
pub mod auth;
pub mod backup;
pub mod change_password;
pub mod completions;
pub mod delete;
pub mod get;
pub mod init;
pub mod list;
pub mod recover;
pub mod restore;
pub mod set;
