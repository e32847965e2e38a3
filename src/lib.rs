//! Multi-tenant job dispatch service: queue registry and broker client
//! (C1/C2/C3), cron and one-shot scheduling (C4), an in-process event bus
//! (C5), HMAC-signed webhook delivery (C6), code-embedding vector search
//! (C7), an append-only reasoning step store (C8), and session/checkpoint
//! bookkeeping (C9), composed behind a thin axum HTTP surface.

pub mod api;
pub mod broker;
pub mod common;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod kernel;
pub mod models;
pub mod persistence;
pub mod reasoning;
pub mod registry;
pub mod scheduler;
pub mod sessions;
pub mod telemetry;
pub mod vector;
pub mod webhooks;
