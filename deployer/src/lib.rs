//! deployctl library
//!
//! Build, publish and provision pipeline for a containerized application.

pub mod commands;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;
