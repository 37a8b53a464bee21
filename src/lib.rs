//! # batch-decompile
//!
//! Concurrent batch decompilation of the classes in a jar.
//!
//! ## Architecture
//!
//! - **matcher**: Name patterns (exact, package prefix, all, regex) over internal class names
//! - **catalog**: Jar listing and class-family extraction
//! - **backend**: The decompiler seam, cancellation tokens and backend selection
//! - **java**: Running the java launcher as a cancellable child process
//! - **cfr**: CFR decompiler integration (reentrant, shared)
//! - **fernflower**: Fernflower integration (scratch directory, one instance per task)
//! - **executor**: Worker pool, per-task timeouts and batch orchestration
//! - **state**: Write-once result collection shared by workers and the timeout thread
//! - **timer**: Deadline thread driving the per-task timeouts
//! - **progress**: Completion counts and ETA
//! - **source**: Placeholder stubs and post-processing of decompiled text
//! - **sink**: Writing results as a single source file or a zip archive

pub mod backend;
pub mod catalog;
pub mod cfr;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod fernflower;
pub mod java;
pub mod matcher;
pub mod progress;
pub mod sink;
pub mod source;
pub mod state;
pub mod timer;
