pub mod audit;
pub mod backup;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod keychain;
pub mod recovery;
pub mod usage;
pub mod vault;
