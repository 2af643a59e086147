//! Utility functions shared by the filter pipeline

pub mod string;
pub mod time;
