//! Testing utilities and mock implementations
//!
//! This module provides mock implementations for exercising the mesh without
//! external dependencies like message brokers or LLM providers.

pub mod mocks;

pub use mocks::*;
