//! # Historia Core
//!
//! Runtime-free logic for the Historia retrieval engine: corpus models,
//! content flattening, cosine ranking, historical-context aggregation,
//! TTL caches, and the document source trait.
//!
//! This crate contains no tokio, HTTP client, or filesystem I/O. The
//! `historia` crate supplies embedding providers and the engine that
//! ties these pieces together.

pub mod cache;
pub mod context;
pub mod embedding;
pub mod models;
pub mod search;
pub mod source;
pub mod text;
