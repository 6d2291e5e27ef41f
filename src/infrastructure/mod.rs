//! Infrastructure layer - configuration, storage and platform adapters

pub mod adapters;
pub mod config;
pub mod storage;
