//! Configuration loading and shared configuration types for alertflow services.

pub mod environment;
pub mod load;
pub mod shared;
