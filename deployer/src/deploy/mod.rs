//! Deployment pipeline stages

pub mod builder;
pub mod endpoint;
pub mod fsm;
pub mod pipeline;
pub mod poller;
pub mod provisioner;
pub mod publisher;
pub mod runner;
pub mod verify;
