//! Core domain and pure transformations for the haggler negotiation assistant.
//!
//! This crate holds everything that is deterministic and I/O-free:
//! - `domain` - negotiation context, strategies, proposals, vendor replies,
//!   and the persisted outcome record
//! - `config` - immutable application configuration loaded once at startup
//! - `prompts` - prompt rendering for the generative engine
//! - `schema` - strict all-or-nothing validation of engine output
//! - `fallback` - deterministic synthetic output used when the engine
//!   fails to produce valid structured text
//!
//! The engine adapter and the retry/fallback orchestration live in
//! `haggler-agent`; persistence lives in `haggler-db`.

pub mod config;
pub mod domain;
pub mod fallback;
pub mod prompts;
pub mod schema;

pub use domain::negotiation::{NegotiationContext, Proposal, Strategy, VendorReply};
pub use domain::outcome::{NegotiationOutcome, ThreadId};
pub use schema::ValidationError;
