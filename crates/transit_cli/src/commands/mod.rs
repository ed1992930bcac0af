pub mod check;
pub mod meta;
pub mod run;

use clap::ValueEnum;
use transit::migrate::{SourceMode, WriteMode};

/// Output format for summaries and reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

/// Write mode as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum WriteModeArg {
    /// Find by natural key, create only when absent
    Upsert,
    /// Always create (re-runs duplicate records)
    BlindCreate,
}

impl From<WriteModeArg> for WriteMode {
    fn from(arg: WriteModeArg) -> Self {
        match arg {
            WriteModeArg::Upsert => WriteMode::Upsert,
            WriteModeArg::BlindCreate => WriteMode::BlindCreate,
        }
    }
}

/// Source enumeration as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum SourceModeArg {
    /// Fetch ids 1..=count individually
    Numbered,
    /// Follow `next` page links
    Paginated,
}

impl From<SourceModeArg> for SourceMode {
    fn from(arg: SourceModeArg) -> Self {
        match arg {
            SourceModeArg::Numbered => SourceMode::Numbered,
            SourceModeArg::Paginated => SourceMode::Paginated,
        }
    }
}
