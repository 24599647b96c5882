//! jira2notion - mirror Jira projects into Notion databases
//!
//! This crate provides the core functionality for the `j2n` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (ProjectConfig, IssueRecord, Checkpoint, Notion schema)
//! - [`jira`] - Jira REST client behind the [`jira::JiraApi`] trait
//! - [`notion`] - Notion REST client behind the [`notion::NotionApi`] trait
//! - [`storage`] - SQLite checkpoint store
//! - [`sync`] - Field mapping, JQL, sync engine and orchestrator
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod jira;
pub mod model;
pub mod notion;
pub mod storage;
pub mod sync;
pub mod validate;

pub use error::{Error, Result};
