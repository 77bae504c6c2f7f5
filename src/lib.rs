//! Library to automate periodic database backups.
//!
//! All actual backup work is delegated to the vendor tools. This library
//! validates the configuration, builds their command lines, runs them and
//! does the bookkeeping around it:
//!
//! - [backup]: physical backups with xtrabackup, archived, shipped and pruned.
//! - [backends]: one-off logical dumps of MySQL, PostgreSQL and MongoDB.
//! - [notify]: reporting the outcome to a webhook.

#![forbid(unsafe_code)]

pub mod backends;
pub mod backup;
pub mod cli;
pub mod command;
pub mod config;
pub mod notify;
pub mod util;
