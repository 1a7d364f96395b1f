//! # firelens-core
//!
//! Core library for firelens - a wildfire hotspot map with a streaming
//! analysis assistant.
//!
//! This library provides:
//! - Viewport-driven hotspot synchronization with request cancellation
//! - A map capability interface and a headless in-memory map
//! - An incremental decoder for the chat event stream
//! - Conversation management with per-conversation cancellation
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! The two halves are independent:
//! - **Map:** [`map::MapController`] turns map events into debounced
//!   refreshes; [`map::ViewportSynchronizer`] fetches through a
//!   [`geo::FeatureSource`] and applies results to a [`map::MapHandle`]
//! - **Chat:** [`chat::ConversationManager`] opens a stream through a
//!   [`chat::ChatTransport`] and feeds it to a [`chat::StreamSession`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use firelens_core::geo::{Feature, FilterParams, HttpFeatureSource, Viewport};
//! use firelens_core::map::{InMemoryMap, MapHandle, ViewportSynchronizer};
//! use firelens_core::Config;
//! use std::sync::Arc;
//!
//! # async fn run() -> firelens_core::Result<()> {
//! let config = Config::load()?;
//! let viewport = Viewport::new(-38.0, -28.0, 140.0, 154.0)?;
//! let map = InMemoryMap::new(viewport, &config.map.base_style);
//! let source = HttpFeatureSource::new(&config.api)?;
//!
//! let on_click = Arc::new(|_: &Feature| {});
//! let sync = ViewportSynchronizer::new(map.clone(), source, &config.map, on_click);
//! let outcome = sync.refresh(map.viewport(), FilterParams::new()).await;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};

// Public modules
pub mod chart;
pub mod chat;
pub mod config;
pub mod error;
pub mod geo;
pub mod logging;
pub mod map;

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
