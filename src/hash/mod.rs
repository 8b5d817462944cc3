// Fingerprinting and matching for the delta encoder.
//
// This module provides:
// - The Rabin rolling hash over 16-byte windows
// - The bucketed source index with sampling and per-hash caps
// - The greedy match scan that turns a target into instructions

pub mod config;
pub mod index;
pub mod matching;
pub mod rolling;
