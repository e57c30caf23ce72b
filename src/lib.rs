//! # ragchat
//!
//! Retrieval-augmented chat backend. Documents dropped into a directory
//! (or uploaded over HTTP) are split, embedded, and stored in a vector
//! index; questions are answered by a hosted language model using only the
//! retrieved context, with a fixed fallback when nothing relevant is found.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────────┐
//! │  Loader  │──▶│ Split+Embed │──▶│ Vector index │
//! └──────────┘   └─────────────┘   └──────┬───────┘
//!                                         │ retrieve
//!                                         ▼
//! ┌──────────┐   ┌─────────────┐   ┌──────────────┐
//! │ CLI/HTTP │──▶│  ChatService│──▶│AnswerComposer│──▶ LLM
//! └──────────┘   └──────┬──────┘   └──────────────┘
//!                       ▼
//!                 ┌──────────┐
//!                 │ App DB   │
//!                 └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration |
//! | [`db`], [`migrate`] | SQLite pools and schema |
//! | [`loader`], [`extract`] | Reading documents from disk |
//! | [`embedding`], [`llm`], [`provider`] | Hosted model clients |
//! | [`vector_store`] | Persistent vector index |
//! | [`ingest`] | Batch indexing |
//! | [`chat`], [`conversations`] | Chat turns and their storage |
//! | [`auth`], [`users`], [`submissions`] | Accounts and questionnaire data |
//! | [`documents`] | Uploaded document records |
//! | [`server`], [`error`] | HTTP API |

pub mod auth;
pub mod chat;
pub mod config;
pub mod conversations;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod provider;
pub mod server;
pub mod submissions;
pub mod users;
pub mod vector_store;
