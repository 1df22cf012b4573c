//! hushh-core - Agent registry, response normalization and profile merging
//!
//! This crate provides:
//! - The agent data model and an immutable registry looked up by id
//! - `extract_text`, an ordered chain of strategies that pulls readable text out of
//!   loosely structured agent responses
//! - The profile merger that folds several agents' JSON into one resolved profile

pub mod extract;
pub mod profile;
pub mod registry;
pub mod types;

pub use extract::{extract_text, extract_text_or, try_path};
pub use profile::{
    MergePriority, ProfileSummary, ResolvedProfile, merge_outcomes, merge_profiles,
    strip_code_fences,
};
pub use registry::{AgentRegistry, RegistryError};
pub use types::{AgentDescriptor, AgentKind, AgentOutcome, DispatchResult};
