//! # askpdf
//!
//! Grounded question answering over uploaded documents.
//!
//! A document is split into overlapping chunks, each chunk is embedded, and
//! the vectors are persisted as one index per document. A question is
//! answered by embedding it with the same model, picking the most similar
//! chunks and asking a language model to answer from those chunks only.
//! Clients talk to the server over a WebSocket session that is rate limited
//! per client and capped in length.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────┐   ┌──────────────┐
//! │  Upload  │──▶│ Extract+Chunk+Embed   │──▶│ Vector index │
//! └──────────┘   └───────────────────────┘   └──────┬───────┘
//!                                                   │
//! ┌──────────┐   ┌──────────┐   ┌───────────┐       │
//! │ /ask (ws)│──▶│ Session  │──▶│  Answer   │◀──────┘
//! └──────────┘   │+ limiter │   │  engine   │──▶ Generator
//!                └──────────┘   └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Ingestion and query error types |
//! | [`extract`] | PDF, DOCX and plain-text extraction |
//! | [`chunk`] | Recursive overlapping text splitter |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`generation`] | Text generation backends |
//! | [`index`] | Per-document vector index storage |
//! | [`search`] | Top-k cosine similarity search |
//! | [`prompt`] | Grounded prompt template |
//! | [`ingest`] | Ingestion pipeline |
//! | [`answer`] | Retrieval and answer engine |
//! | [`rate_limit`] | Sliding-window connection rate limiter |
//! | [`session`] | Question/answer session protocol |
//! | [`metadata`] | Document and question history |
//! | [`server`] | HTTP and WebSocket server |
//! | [`commands`] | CLI commands |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod metadata;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod rate_limit;
pub mod search;
pub mod server;
pub mod session;
