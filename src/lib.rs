//! GhostRider Miner Library
//!
//! Command-line facing layer over [`ghostrider_core`]: run configuration
//! and re-exports of the algorithm core.
//!
//! # Example
//!
//! ```rust
//! use ghostrider::algorithm::{derive_from_header, hash_header, meets_difficulty};
//!
//! let header = [0u8; 80];
//! println!("sequence: {}", derive_from_header(&header));
//!
//! let digest = hash_header(&header).unwrap();
//! if meets_difficulty(&digest, 16) {
//!     println!("Valid share found!");
//! }
//! ```

// Re-export the core algorithm
pub use ghostrider_core as algorithm;

pub mod config;

// Convenience re-exports
pub use algorithm::{KernelKind, TuneTable, derive_from_header, hash_header, meets_difficulty};
pub use config::{ConfigError, KernelChoice, MinerConfig};
