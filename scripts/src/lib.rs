//! Scripts for deploying and initializing the upgradeable MIRA contracts.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod artifacts;
pub mod binder;
pub mod chain;
pub mod cli;
mod commands;
pub mod constants;
pub mod errors;
pub mod executor;
pub mod network;
pub mod plan;
#[allow(missing_docs, clippy::missing_docs_in_private_items)]
pub mod solidity;
pub mod units;
pub mod utils;
