//! HTTP request handlers.

pub mod auth;
pub mod authors;
pub mod chat;
pub mod health;
pub mod projects;
