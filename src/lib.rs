//! # pdfchat
//!
//! A retrieval-augmented chat assistant for a single uploaded PDF.
//!
//! An upload is split into three channels (page text, tables, rendered page
//! images), embedded, and committed as the one global corpus. Each chat
//! turn retrieves the closest passages, composes a grounded prompt with the
//! session's recent history, and asks a generative model for the answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌────────────┐   ┌──────────┐
//! │  Upload  │──▶│ Extractor │──▶│  Indexer   │──▶│  SQLite  │
//! │  (PDF)   │   │ text/table│   │   embed    │   │  corpus  │
//! └──────────┘   │  /image   │   └────────────┘   └────┬─────┘
//!                └───────────┘                         │
//!  ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌────┴─────┐
//!  │ Response │◀──│Generation│◀──│  Prompt   │◀──│Retriever │
//!  └──────────┘   └──────────┘   └───────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pdfchat ingest manual.pdf
//! pdfchat ask "What torque does table 2 list for M8 bolts?"
//! pdfchat serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Core data types |
//! | [`error`] | Pipeline error taxonomy |
//! | [`extract`] | PDF text, table and image extraction |
//! | [`layout`] | Positioned page layout from glyph coordinates |
//! | [`table`] | Table detection in page layout |
//! | [`render`] | Page rasterization |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`store`] | Vector index backends |
//! | [`ingest`] | Corpus replacement |
//! | [`search`] | Semantic retrieval |
//! | [`session`] | Per-session history and upload gate |
//! | [`greeting`] | Small-talk detection and canned replies |
//! | [`prompt`] | Prompt composition |
//! | [`generation`] | Generative model providers |
//! | [`chat`] | Ingest and conversation orchestration |
//! | [`server`] | HTTP API |

pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod greeting;
pub mod ingest;
pub mod layout;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod render;
pub mod search;
pub mod server;
pub mod session;
pub mod store;
pub mod table;
