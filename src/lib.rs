//! Ephemeral container scenarios with readiness verification.
//!
//! `dockhand` starts throwaway containers for integration tests, waits until
//! each one is actually ready (not merely started), hands the network address
//! of one container to the containers that depend on it, and releases every
//! container it created in reverse creation order, whether the scenario
//! passed, failed, or was cancelled.
//!
//! # Modules
//!
//! - [`spec`]: Validated container requests built from ordered options
//! - [`wait`]: Readiness strategies and the polling loop that evaluates them
//! - [`engine`]: The container engine seam and its Docker/Podman adapter
//! - [`handle`]: Single-container lifecycle (create, start, terminate)
//! - [`scenario`]: Multi-container orchestration with guaranteed teardown
//! - [`api`]: Command entry points and the httpbin/k6 presets
//! - [`config`]: Configuration system with layered precedence (CLI > env > file > defaults)
//! - [`error`]: Semantic error types for the library

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod handle;
pub mod scenario;
pub mod spec;
pub mod wait;
