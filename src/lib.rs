#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # Taillight 🚲
//!
//! A Rust client library for smart bicycle tail-lights.
//!
//! The tail-lights are managed through a cloud-function backend: the client
//! logs in, lists and binds devices, switches light modes and brightness,
//! arms the anti-theft alarm and records rides, each through one named
//! remote procedure. This crate provides the client side of that exchange:
//!
//! - **Gateway**: every call goes through [`Gateway`], which unwraps the
//!   `{success, message, ...}` envelope the backend answers with
//! - **State**: [`AppState`] holds the session, the bound devices, the
//!   selected device, its last status and the ride tracking state
//! - **Pages**: [`ControlPage`] polls the selected device while visible and
//!   applies light changes optimistically; [`IndexPage`] lists and binds devices
//! - **Host seams**: the transport, login codes and persistent storage are
//!   traits ([`RpcBridge`], [`LoginProvider`], [`KeyValueStore`])
//! - **Simulator**: [`SimulatedCloud`] answers every procedure in-process
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use taillight::{
//!     AppState, ClientConfig, ControlPage, FixedLoginCode, LightMode, LogNotifier,
//!     MemoryStore, SimulatedCloud,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let state = Arc::new(AppState::new(
//!         Arc::new(SimulatedCloud::new()),
//!         Arc::new(FixedLoginCode::new("login-code")),
//!         Arc::new(MemoryStore::new()),
//!         ClientConfig::default(),
//!     ));
//!     state.login().await?;
//!
//!     // Bind a tail-light and select it
//!     state.bind_device("bike_light_ab12cd", "通勤车").await?;
//!     state.select_device("bike_light_ab12cd").await?;
//!
//!     // Show the control page and switch to the breathing pattern
//!     let mut page = ControlPage::new(state.clone(), Arc::new(LogNotifier));
//!     page.on_show().await;
//!     page.select_mode(LightMode::Breath).await?;
//!     page.on_hide();
//!
//!     Ok(())
//! }
//! ```

/// Host platform seams
pub mod bridge;
/// Error types and handling
pub mod error;
/// Remote-call gateway
pub mod gateway;
/// Page controllers
pub mod pages;
/// Procedure names, request payloads and response parsing
pub mod protocol;
/// In-process cloud backend
pub mod simulator;
/// Application state container
pub mod state;
/// Type definitions and data structures
pub mod types;
/// Formatting, validation and rate limiting helpers
pub mod util;

#[cfg(test)]
mod test_support;

// Re-export the main types for convenient usage
pub use bridge::{FixedLoginCode, KeyValueStore, LoginProvider, MemoryStore, RpcBridge};
pub use error::{Result, TaillightError};
pub use gateway::Gateway;
pub use pages::{
    ControlPage, ControlPhase, ControlView, IndexPage, IndexView, LogNotifier, Notifier, Route,
    Toast, ToastIcon,
};
pub use protocol::{Envelope, Procedure, Request};
pub use simulator::SimulatedCloud;
pub use state::{AppState, DeviceListOutcome};
pub use types::{
    ClientConfig, ControlCommand, Device, DeviceStatus, LightMode, Session, TrackPoint,
    TrackSummary, TrackingState, UserProfile,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
