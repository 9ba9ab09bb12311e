//! Fexum: Feature Relevance and Redundancy Library
//!
//! A library for estimating how strongly feature subsets explain a target
//! and how much features overlap, using randomized slicing (HiCS contrast)
//! with results accumulated incrementally in a pluggable result store.

pub mod cli;
pub mod pipeline;
pub mod report;
pub mod utils;
