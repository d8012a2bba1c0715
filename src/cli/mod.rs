// SealedPrefs — CLI Module
//
// Command-line interface using clap derive macros.
// Subcommands: get, put, put-set, remove, contains, list, clear, raw, delete-key.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

pub use commands::execute;

/// SealedPrefs — encrypted key-value preferences.
#[derive(Parser, Debug)]
#[command(name = "sealed-prefs")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a JSON config file (defaults are used when omitted).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// How a value is written or read.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Int,
    Long,
    Float,
    Bool,
    Set,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read one preference.
    Get {
        /// Store name (also the key alias).
        store: String,

        key: String,

        #[arg(long, value_enum, default_value = "string")]
        kind: ValueKind,
    },

    /// Write one preference.
    Put {
        store: String,

        key: String,

        value: String,

        #[arg(long, value_enum, default_value = "string")]
        kind: ValueKind,

        /// Return before the write reaches disk.
        #[arg(long = "async")]
        apply: bool,
    },

    /// Write a string-set preference.
    PutSet {
        store: String,

        key: String,

        values: Vec<String>,
    },

    /// Remove one preference.
    Remove { store: String, key: String },

    /// Check whether a preference exists.
    Contains { store: String, key: String },

    /// List all decryptable preferences.
    List { store: String },

    /// Remove every preference in the store.
    Clear { store: String },

    /// Show the sealed keys and values as persisted.
    Raw { store: String },

    /// Delete the store's key. Everything in the store becomes unreadable.
    DeleteKey {
        store: String,

        /// Confirm the irreversible deletion.
        #[arg(long)]
        yes: bool,
    },
}
