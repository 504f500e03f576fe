//! Persistent build cache for CI runners
//!
//! The cache root is an opaque directory the CI system saves and restores
//! between jobs. It holds one bundle generation: the rendered output and the
//! build engine's intermediate state from the last successful build.
//!
//! # Lifecycle
//!
//! | Step | Output tree | Intermediate tree |
//! |------|-------------|-------------------|
//! | restore | moved out of the bundle | moved out of the bundle |
//! | save | copied (stays as artifact) | moved into the bundle |
//!
//! A failed build never reaches `save`. With the default move restore the
//! bundle was already consumed; [`RestoreMode::Copy`] keeps it intact.

pub mod bundle;
pub mod digest;
pub mod fsops;

pub use bundle::{BundleState, CacheBundle, RestoreMode, INTERMEDIATE_DIR, OUTPUT_DIR};
pub use digest::tree_digest;
