//! These models represent the objects passed around by the agent.
//!
//! There are several related formats we need to interact with:
//! - the JSON body of the assist endpoint, sent by clients
//! - Gemini messages/tools, sent from the agent to the LLM
//! - tool requests, sent from the agent to the systems providing capabilities
//! - rows of the externally persisted session history
//!
//! These overlap to varying degrees. We convert each of them to and from the
//! internal structs at the boundary, so the internal models are not an exact
//! match for any single wire format.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
