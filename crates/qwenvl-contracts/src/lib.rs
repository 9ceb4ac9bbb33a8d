pub mod chat;
pub mod config;
pub mod conversation;
pub mod messages;
pub mod models;
pub mod nodes;
