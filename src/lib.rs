//! # AutoReport
//!
//! Turns a zipped software project into a structured architecture analysis
//! and then into a long-form, university-style project report.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌────────────┐  POST /analyze   ┌──────────┐   ┌──────────────┐
//! │ project │──▶│  extract   │─────────────────▶│ analysis │──▶│ Gemini       │
//! │  .zip   │   │ (bounded)  │                  └──────────┘   │ (single-shot)│
//! └─────────┘   └────────────┘                                 └──────────────┘
//!                      │ ProjectAnalysis
//!                      ▼
//!               ┌────────────┐  POST /generate-report  ┌────────┐   ┌──────────────┐
//!               │   client   │────────────────────────▶│ report │──▶│ OpenRouter   │
//!               │ (deltas)   │◀──── text/plain ────────└────────┘   │ (SSE stream) │
//!               └────────────┘                                      └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GEMINI_API_KEY=...
//! autoreport serve                          # start the HTTP server
//! autoreport extract ./shop.zip             # inspect the extracted context
//! autoreport analyze ./shop.zip             # architecture analysis as JSON
//! autoreport report ./shop.zip --format VTU # stream a report to stdout
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and credential resolution |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`extract`] | Zip archive → bounded extraction context |
//! | [`providers`] | Model table and provider routing |
//! | [`stream`] | Delta channel, UTF-8 and SSE decoding |
//! | [`llm`] | Single-shot and event-stream chat transports |
//! | [`analysis`] | Analysis prompt and JSON recovery |
//! | [`report`] | Report prompt and generation |
//! | [`server`] | HTTP server |
//! | [`client`] | HTTP client for the server |

pub mod analysis;
pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod llm;
pub mod models;
pub mod providers;
pub mod report;
pub mod server;
pub mod stream;
