//! Data models shared by the pipeline stages

pub mod image;
pub mod parameters;
pub mod stack;
