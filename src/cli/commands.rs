//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::ledger::CustomerSort;
use crate::model::{DesignColor, Season};

/// Customer record commands.
#[derive(Debug, Subcommand)]
pub enum CustomerCommand {
    /// Add a customer
    Add {
        /// Customer name
        name: String,

        /// Phonetic reading of the name
        #[arg(long)]
        kana: Option<String>,

        /// Phone number
        #[arg(short, long)]
        phone: Option<String>,

        /// Email address
        #[arg(short, long)]
        email: Option<String>,

        /// Birthday (YYYY-MM-DD)
        #[arg(long)]
        birthday: Option<String>,

        /// Postal address
        #[arg(long)]
        address: Option<String>,

        /// Allergy and caution notes
        #[arg(long)]
        allergies: Option<String>,

        /// Free-text notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// List customers
    List {
        /// Filter by name, reading, or phone number
        #[arg(short, long)]
        search: Option<String>,

        /// Sort order
        #[arg(long, value_enum, default_value = "name")]
        sort: CustomerSortArg,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show one customer with their visit history
    Show {
        /// Customer id
        id: String,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Replace a customer record (a new id is assigned)
    Edit {
        /// Customer id
        id: String,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New phonetic reading
        #[arg(long)]
        kana: Option<String>,

        /// New phone number
        #[arg(short, long)]
        phone: Option<String>,

        /// New email address
        #[arg(short, long)]
        email: Option<String>,

        /// New birthday (YYYY-MM-DD)
        #[arg(long)]
        birthday: Option<String>,

        /// New postal address
        #[arg(long)]
        address: Option<String>,

        /// New allergy notes
        #[arg(long)]
        allergies: Option<String>,

        /// New free-text notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Delete a customer and their treatment records
    Delete {
        /// Customer id
        id: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Treatment record commands.
#[derive(Debug, Subcommand)]
pub enum TreatmentCommand {
    /// Record a treatment
    Add {
        /// Owning customer id
        customer: String,

        /// Date of the visit (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,

        /// Menu text
        #[arg(short, long)]
        menu: String,

        /// Price in whole yen
        #[arg(short, long)]
        price: i64,

        /// Color used
        #[arg(long)]
        color: Option<String>,

        /// Parts applied (stones, foil, ...)
        #[arg(long)]
        parts: Option<String>,

        /// Nail shape
        #[arg(long)]
        shape: Option<String>,

        /// Nail length
        #[arg(long)]
        length: Option<String>,

        /// Duration in minutes
        #[arg(long)]
        duration: Option<u32>,

        /// Staff member
        #[arg(long)]
        staff: Option<String>,

        /// Comma-separated design tags
        #[arg(short, long)]
        tags: Option<String>,

        /// Suggestion for the next visit
        #[arg(long)]
        next: Option<String>,

        /// Photo files to embed; each also enters the gallery
        #[arg(long, value_name = "FILE")]
        photo: Vec<PathBuf>,
    },

    /// List treatments, newest first
    List {
        /// Only treatments for this customer
        #[arg(long)]
        customer: Option<String>,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

/// Gallery commands.
#[derive(Debug, Subcommand)]
pub enum GalleryCommand {
    /// List gallery designs
    List {
        /// Filter by tag text
        #[arg(short, long)]
        tag: Option<String>,

        /// Filter by season classification
        #[arg(short, long, value_enum)]
        season: Option<SeasonArg>,

        /// Filter by color classification
        #[arg(long, value_enum)]
        color: Option<ColorArg>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

/// Stats command arguments.
#[derive(Debug, Args)]
pub struct StatsCommand {
    /// Month to report (YYYY-MM), defaults to the current month
    #[arg(short, long)]
    pub month: Option<String>,

    /// Include the storage usage report
    #[arg(long)]
    pub storage: bool,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Backup management commands.
#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    /// Take a snapshot now
    Create,

    /// List snapshot generations, oldest first
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Restore the stores from a snapshot
    Restore {
        /// Snapshot key, or "latest"
        key: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete one snapshot generation
    Delete {
        /// Snapshot key
        key: String,
    },

    /// Show backup status
    Status {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Watch command arguments.
#[derive(Debug, Args)]
pub struct WatchCommand {}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Customer sort order argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CustomerSortArg {
    /// By name, ascending
    Name,
    /// By most recent visit, newest first
    LastVisit,
    /// By visit count, descending
    Visits,
}

impl From<CustomerSortArg> for CustomerSort {
    fn from(arg: CustomerSortArg) -> Self {
        match arg {
            CustomerSortArg::Name => Self::Name,
            CustomerSortArg::LastVisit => Self::LastVisit,
            CustomerSortArg::Visits => Self::Visits,
        }
    }
}

/// Season filter argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SeasonArg {
    /// Spring designs
    Spring,
    /// Summer designs
    Summer,
    /// Autumn designs
    Autumn,
    /// Winter designs
    Winter,
}

impl From<SeasonArg> for Season {
    fn from(arg: SeasonArg) -> Self {
        match arg {
            SeasonArg::Spring => Self::Spring,
            SeasonArg::Summer => Self::Summer,
            SeasonArg::Autumn => Self::Autumn,
            SeasonArg::Winter => Self::Winter,
        }
    }
}

/// Color filter argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorArg {
    /// Pink and rose tones
    Pink,
    /// Red tones
    Red,
    /// Blue tones
    Blue,
    /// White tones
    White,
    /// Black tones
    Black,
    /// Beige and nude tones
    Beige,
}

impl From<ColorArg> for DesignColor {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Pink => Self::Pink,
            ColorArg::Red => Self::Red,
            ColorArg::Blue => Self::Blue,
            ColorArg::White => Self::White,
            ColorArg::Black => Self::Black,
            ColorArg::Beige => Self::Beige,
        }
    }
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}
