//! Core domain crate for the troupe voice-persona service: persona
//! definitions, per-session state records, typed MCP tool services, content
//! tables, and the chat-LLM client seam. The `services/api` crate wires these
//! into the HTTP/WebSocket runtime and the realtime voice providers.

pub mod content;
pub mod improv;
pub mod llm_client;
pub mod order;
pub mod persona;
pub mod tutor;
pub mod voice;
