pub mod core;
pub mod permissions;
pub mod session;
pub mod tools;

// Agent engine and the loops that drive it
pub mod agent;
pub mod llm;

// Multi-client WebSocket surface
pub mod server;

// Configuration and logging
pub mod config;
pub mod logging;
