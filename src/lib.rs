pub mod auth;
pub mod backend;
pub mod config;
pub mod context;
pub mod directory;
pub mod error;
pub mod guard;
pub mod nav;
pub mod profile;
pub mod session;
pub mod shell;
pub mod types;
pub mod upload;
pub mod validation;
