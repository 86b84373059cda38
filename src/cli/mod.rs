//! Command-line interface for salonbook.
//!
//! This module provides the CLI structure and command handlers for the
//! `salonbook` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    BackupCommand, ColorArg, ConfigCommand, CustomerCommand, CustomerSortArg, GalleryCommand,
    OutputFormat, SeasonArg, StatsCommand, TreatmentCommand, WatchCommand,
};

/// salonbook - Nail salon customer records with generational backups
///
/// Keeps customer, treatment, and design gallery records in a local store
/// and protects them with automatic bounded-retention snapshots.
#[derive(Debug, Parser)]
#[command(name = "salonbook")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage customer records
    #[command(subcommand)]
    Customer(CustomerCommand),

    /// Manage treatment records
    #[command(subcommand)]
    Treatment(TreatmentCommand),

    /// Browse the design gallery
    #[command(subcommand)]
    Gallery(GalleryCommand),

    /// Monthly business statistics
    Stats(StatsCommand),

    /// Manage backup snapshots
    #[command(subcommand)]
    Backup(BackupCommand),

    /// Run the automatic snapshot service in the foreground
    Watch(WatchCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
