pub mod alerts;
pub mod api;
pub mod config;
pub mod document;
pub mod document_store;
pub mod executor;
pub mod filter;
pub mod handlers;
pub mod identity;
pub mod patch;
pub mod patch_store;
pub mod prometheus;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod server;
pub mod time;
