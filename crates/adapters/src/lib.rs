// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete side-effecting implementations the engine is built against:
//! chat transport, child-process spawning, signal delivery, the job
//! wrapper script, and the two agent CLI backends.

pub mod agent;
pub mod console_transport;
#[cfg(any(test, feature = "test-support"))]
pub mod fake_transport;
pub mod job_wrapper;
pub mod process;
pub mod signals;
pub mod transport;

pub use agent::{AgentCliAdapter, AgentError, AgentRunOutcome, AgentSpawnConfig, ProgressNote, Provider};
pub use console_transport::ConsoleChatTransport;
#[cfg(any(test, feature = "test-support"))]
pub use agent::fake::FakeAgentCliAdapter;
#[cfg(any(test, feature = "test-support"))]
pub use fake_transport::FakeChatTransport;
pub use transport::{ChatTransport, FetchedMessage, OutboundMessage, TransportError};
