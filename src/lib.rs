//! Cortex: natural-language desktop automation.
//!
//! A controller turns utterances into JSON action plans, a queue server
//! holds them, and a desktop agent polls for and executes them.

pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod llm;
pub mod memory;
pub mod plan;
pub mod planner;
pub mod queue;
