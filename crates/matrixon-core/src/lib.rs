//! Matrixon Core Library
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.11.0-alpha
//! Date: 2024-03-21
//!
//! Core types for the Matrixon timeline writer: the sync response shapes the
//! writer consumes and the configuration shared by its tooling.
//!
//! # Examples
//! ```rust
//! use matrixon_core::types::RoomSyncResponse;
//!
//! let response: RoomSyncResponse = serde_json::from_str(r#"{"timeline": {"limited": true}}"#).unwrap();
//! assert!(response.timeline.unwrap().limited);
//! ```

pub mod config;
pub mod types;

pub use config::{LogFormat, LoggingConfig, ReplayConfig, TimelineConfig};
pub use matrixon_common::{MatrixonError, Result};
pub use types::{RelatesTo, RoomEvent, RoomSyncResponse, StateSection, TimelineSection};
