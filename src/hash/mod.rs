// Block hashing and match finding.
//
// This module provides:
// - A polynomial rolling hash over fixed-size blocks
// - A block hash index with per-bucket chains
// - The greedy matcher that turns a target chunk into ADD/RUN/COPY

pub mod config;
pub mod matching;
pub mod rolling;
pub mod table;
