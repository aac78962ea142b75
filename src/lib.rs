//! Setup Downloader Core Library
//!
//! This library acquires racing-simulator setup files from remote providers
//! and places them into the folder layout the simulator expects, keyed by
//! car and track configuration. The same resolution and deduplication logic
//! also reorganizes files already on disk.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`catalog`] - Track/layout catalog and its loaders
//! - [`resolver`] - Free-text location name to catalog layout path
//! - [`dedup`] - Content hashing, hash cache, duplicate index
//! - [`state`] - Acquisition ledger and revision markers
//! - [`naming`] - Setup filename conventions
//! - [`provider`] - Provider capability and the GoFast, CDA and Track Titan providers
//! - [`download`] - Acquisition orchestrator: pacing, retry, staging, commit
//! - [`organize`] - Reorganization of existing files
//! - [`persist`] - Atomic JSON persistence helpers

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod dedup;
pub mod download;
pub mod naming;
pub mod organize;
pub mod persist;
pub mod provider;
pub mod resolver;
pub mod state;
mod user_agent;

// Re-export commonly used types
pub use catalog::{CatalogError, CatalogIndex, TrackCategory};
pub use dedup::{Deduplicator, HashCache, HashError};
pub use download::{
    AcquireError, AcquisitionOptions, AcquisitionResult, DEFAULT_CONCURRENCY,
    DEFAULT_MAX_RETRIES, FailureType, Orchestrator, RetryDecision, RetryPolicy, RunError,
    classify_error,
};
pub use organize::{OrganizeError, OrganizeOptions, OrganizeResult, Organizer};
pub use provider::{
    AcquirableItem, CdaConfig, CdaProvider, FetchHandle, FetchedAsset, GoFastConfig,
    GoFastProvider, Provider, ProviderError, TrackTitanConfig, TrackTitanProvider,
};
pub use resolver::{MatchTier, Resolution, ResolvedPath, Resolver};
pub use state::{DownloadState, RevisionMarker, StateError};
