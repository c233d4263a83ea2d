//! Matrixon Common Library
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.11.0-alpha
//! Date: 2024-03-21
//!
//! Error and result types shared across the Matrixon timeline crates.

pub mod error;

pub use error::{MatrixonError, Result};
