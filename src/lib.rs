//! # aparavi-dtc
//!
//! Client for the Aparavi DTC service's PII anonymization pipelines.
//!
//! ## Overview
//!
//! All detection and anonymization happens on the service. This crate
//! drives the lifecycle of one remote pipeline task: validate the pipeline
//! definition, launch it, wait until it reports Running, push text through
//! its webhook and tear it down again.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aparavi_dtc::{DtcConfig, PipelineSession, SendOutcome};
//!
//! # async fn example() -> aparavi_dtc::Result<()> {
//! let config = DtcConfig::new("my-api-key");
//! let session = PipelineSession::from_config(&config)?;
//!
//! session.start().await?;
//! match session.send("Call John Smith at 555-0100").await? {
//!     SendOutcome::Anonymized(text) => println!("{}", text),
//!     SendOutcome::Raw(body) => println!("unexpected response: {}", body),
//! }
//! session.tear_down().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Transports
//!
//! - **http** — the DTC REST API via `reqwest`
//! - **memory** — scripted in-process service for tests and offline runs
//!
//! ## Architecture
//!
//! - **PipelineTransport** trait — the five remote calls
//! - **PipelineSession** — Idle → Launching → Active state machine
//! - **shutdown** — signal hook and scoped guard that release the task
//! - **PipelineDefinition** — the pipeline graph, sent unmodified

pub mod config;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod shutdown;
pub mod transport;
pub mod types;

// Re-export core types
pub use config::DtcConfig;
pub use error::{ApiFailure, DtcError, Result};
pub use pipeline::{ComponentRef, PipelineDefinition};
pub use session::{PipelineSession, SessionOptions, SessionPhase};
pub use shutdown::{CleanupGuard, ShutdownHook, ShutdownSignal};
pub use transport::{ApiResult, PipelineTransport};
pub use types::{LaunchResponse, SendOutcome, SessionHandle, TaskState, TaskStatus};

// Re-export transports for convenience
pub use transport::http::{DtcClient, HttpTransport};
pub use transport::memory::{CallCounts, MemoryTransport};

// Callers of `start_with_cancel` need the token type
pub use tokio_util::sync::CancellationToken;
