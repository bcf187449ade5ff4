//! # ragops — operational toolkit for a LightRAG deployment
//!
//! Small, independently runnable tools that sit next to a LightRAG server.
//!
//! ## Architecture
//!
//! - **[`timing`]** — File-processing timing log: loader, aggregated report, live tail
//! - **[`embedder`]** — Sentence embedding via ONNX Runtime (plus a mock for tests)
//! - **[`service`]** — OpenAI-compatible embedding HTTP API (axum)
//! - **[`export`]** — Document-to-markdown conversion that persists its output
//! - **[`bench`]** — Demo and query-mode benchmark drivers against a LightRAG server
//! - **[`config`]** — Configuration loading, validation, and environment overrides

pub mod bench;
pub mod config;
pub mod embedder;
pub mod export;
pub mod service;
pub mod timing;
