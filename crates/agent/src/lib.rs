//! Generative engine adapter and negotiation pipeline.
//!
//! This crate owns the two pieces of haggler with failure-handling logic:
//!
//! - `engine` - the capability-abstracted generate client, polymorphic over
//!   a hosted OpenAI-compatible API and a local Ollama server, with a
//!   bounded transport-level retry schedule
//! - `pipeline` - the orchestrator that turns a negotiation context into
//!   strategy-specific proposals (and a simulated vendor reply) through a
//!   validate, retry-once-strict, then-deterministic-fallback state machine
//!
//! The engine is treated as an unreliable collaborator: its output may be
//! malformed even when the transport succeeds. Transport failures are the
//! adapter's concern; validation failures are the pipeline's. Neither ever
//! escapes the generation entry points.

pub mod engine;
pub mod pipeline;
pub mod providers;

pub use engine::{build_client, EngineError, EngineInfo, GenerateClient};
pub use pipeline::{Generated, NegotiationPipeline, OutputSource};
