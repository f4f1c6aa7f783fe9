//! Core domain models
//!
//! This module defines steps, run outcomes, request planning and the
//! application configuration.

pub mod config;
pub mod spec;
pub mod state;
pub mod step;

pub use config::{AppConfig, ConfigError};
pub use spec::{Planner, SpecError, ValidationError};
pub use state::*;
pub use step::*;
