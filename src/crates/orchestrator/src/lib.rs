//! Multi-agent orchestration engine for natural-language financial
//! questions.
//!
//! A per-request state record travels through a graph of meta-nodes:
//! the analyzer classifies the query, the planner schedules worker agents
//! into stages, the parallel executor runs each stage with bounded
//! concurrency and per-agent deadlines, the combiner fuses the surviving
//! results, the confidence calculator grades the reply, and the responder
//! packs the final [`Response`]. Simple price questions short-circuit from
//! the data agent straight to the responder; failures divert through the
//! error handler.
//!
//! Every external collaborator — language model, market data, semantic
//! index, news graph, news feed, translator, chart renderer, tracing sink,
//! symbol table — is injected through [`Capabilities`]; the engine holds no
//! global state and performs no I/O of its own.
//!
//! # Example
//!
//! ```rust,no_run
//! use orchestrator::{Engine, OrchestratorConfig, Request};
//!
//! # async fn example(caps: orchestrator::Capabilities) {
//! let engine = Engine::new(caps, OrchestratorConfig::default()).unwrap();
//! let response = engine
//!     .orchestrate(Request::new("삼성전자 주가 알려줘", "session-1", "user-1"))
//!     .await;
//! println!("{} (grade {:?})", response.reply, response.grade);
//! # }
//! ```

pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod retry;
pub mod state;
pub mod testing;

mod agents;
mod analyzer;
mod combiner;
mod confidence;
mod context;
mod executor;
mod handler;
mod parse;
mod planner;
mod responder;

pub use capability::Capabilities;
pub use config::OrchestratorConfig;
pub use engine::Engine;
pub use error::{CapabilityError, ErrorKind, Fault, OrchestratorError, Result};
pub use state::{ActionType, AgentName, Grade, Intent, Request, Response};
