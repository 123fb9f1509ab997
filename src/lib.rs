#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_async)]

//! doorlink library: single-use signed links that switch cloud door relays on.
//!
//! - `token`: HMAC-SHA256 token signing and verification
//! - `replay`: single-use enforcement with expiring records
//! - `actuation`: cloud relay client with primary/fallback protocols
//! - `service`: issue/redeem orchestration and the failure taxonomy
//! - `targets`: static door registry
//! - `config`: configuration loading
//! - `routes`: HTTP handlers and router
//! - `auth`: operator key middleware
//! - `activity`: in-memory actuation journal

pub mod activity;
pub mod actuation;
pub mod auth;
pub mod clock;
pub mod config;
pub mod replay;
pub mod routes;
pub mod service;
pub mod state;
pub mod targets;
pub mod token;

// Re-export key types at crate root for convenience.
pub use actuation::{ActuationClient, ActuationResult, Actuator};
pub use config::Config;
pub use service::{CapabilityError, CapabilityService};
pub use state::AppState;
pub use targets::TargetRegistry;
pub use token::{Token, TokenCodec};
