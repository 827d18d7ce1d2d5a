//! Unit tests for dockhand configuration.
//!
//! - [`helpers`] - Shared fixtures and helper functions
//! - [`types_tests`] - Defaults, serialisation, and conversions
//! - [`layer_precedence_tests`] - `MergeComposer` layer precedence tests
//! - [`loader_tests`] - Environment and file loading through `load_config_with_env`

mod helpers;
mod types_tests;
