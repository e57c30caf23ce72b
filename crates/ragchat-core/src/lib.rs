//! # ragchat core
//!
//! Shared logic for ragchat: data models, recursive text splitting, JSON
//! flattening, the embedding and vector store traits, the retriever, and the
//! answer composer with its hallucination guard.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or HTTP clients.
//! Concrete providers and the SQLite-backed store live in the `ragchat`
//! application crate.

pub mod chunk;
pub mod compose;
pub mod embedding;
pub mod flatten;
pub mod models;
pub mod retriever;
pub mod store;
