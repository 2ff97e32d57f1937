//! Auto Justify: automatic justification of recurring compliance breaches.

pub mod config;
pub mod error;
pub mod gateway;
pub mod pipeline;
