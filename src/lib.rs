// HTTP API for bootstrap, page status, disconnect and OAuth connect
pub mod api;

// Request identity resolution
pub mod auth;

// Token cache with background refresh
pub mod cache;

// TOML configuration
pub mod config;

// Credential encryption and persistence
pub mod credentials;

// Messaging platform OAuth client
pub mod platform;

// Quota error classification
pub mod quota;

// Token bucket rate limiting
pub mod rate_limit;

// Disconnect and legacy cleanup
pub mod revocation;

// Hierarchical document store
pub mod store;

// Bulk cache warm-up
pub mod warmer;
