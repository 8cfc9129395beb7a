//! Threshold signatures over the BLS12-381 curve.
//!
//! Group public keys are G2 points and (partial) signatures are G1 points, so
//! every relay entry is a 48-byte compressed G1 element.
//!
//! # Features
//!
//! - `portable`: Enables `portable` feature on `blst` (<https://github.com/supranational/blst?tab=readme-ov-file#platform-and-language-compatibility>).

pub mod primitives;
