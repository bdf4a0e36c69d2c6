//! The Agent Loop (§4.7) and the Verification Loop that wraps it (§4.8).

pub mod loop_;
pub mod verify;

pub use loop_::{AgentLoop, MAX_ITERATIONS_MESSAGE};
pub use verify::{LlmVerifier, VerificationLoop, VerificationResult, Verifier};
