pub mod auth;
pub mod catalog;
pub mod config;
pub mod dates;
pub mod download;
pub mod error;
pub mod manifest;
pub mod missions;
