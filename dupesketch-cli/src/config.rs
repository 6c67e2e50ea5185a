//! CLI surface (§6): three verbs, `hash`, `query`, `report`, plus the flags
//! `--db`, `--db-size`, `-v`, and `-m file|func`. Modeled directly on the
//! teacher's own `search/src/main.rs` `Opt` (`structopt`, `byte_unit::Byte`
//! for `--db-size`, `parse(from_occurrences)` for `-v`).

use std::path::PathBuf;
use std::str::FromStr;

use byte_unit::Byte;
use structopt::StructOpt;

/// Granularity at which documents are keyed (§9 "Function-level
/// granularity"). `File` keys by `repo//path@blob`; `Function` additionally
/// suffixes `:name:line` and runs the same pipeline over sub-tree features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    File,
    Function,
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Granularity::File),
            "func" => Ok(Granularity::Function),
            other => Err(format!("unknown granularity {:?}, expected `file` or `func`", other)),
        }
    }
}

#[derive(Debug, StructOpt)]
/// Detect duplicate and near-duplicate source files across a corpus.
pub struct Opt {
    /// The LMDB directory the index lives in. Created on first `hash` if it
    /// doesn't already exist.
    #[structopt(long = "db", parse(from_os_str), default_value = "dupesketch.db")]
    pub database: PathBuf,

    /// The maximum size the database can take on disk.
    #[structopt(long = "db-size", default_value = "10 GiB")]
    pub database_size: Byte,

    /// Indexing/query granularity.
    #[structopt(short = "m", long = "mode", default_value = "file")]
    pub mode: Granularity,

    /// Verbose mode (-v, -vv, -vvv, etc.)
    #[structopt(short, long, parse(from_occurrences))]
    pub verbose: usize,

    #[structopt(subcommand)]
    pub command: Command,
}

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Index every file under `path` as one repository.
    Hash {
        #[structopt(parse(from_os_str))]
        path: PathBuf,

        /// Repository identifier rendered in results (defaults to the
        /// final path component).
        #[structopt(long)]
        repo: Option<String>,

        /// Commit hash attached to every indexed file.
        #[structopt(long, default_value = "working-tree")]
        commit: String,
    },

    /// Query a single file for its exact duplicates and near-duplicates.
    ///
    /// `path` may be suffixed `:name:line` to query one function instead
    /// of the whole file, when running under `-m func`.
    Query {
        path: String,

        /// Minimum estimated similarity to report a candidate as "similar".
        #[structopt(long, default_value = "0.5")]
        similarity_floor: f64,
    },

    /// Enumerate duplicate clusters and near-duplicate components across
    /// the whole index.
    Report {
        /// Minimum estimated similarity required to keep a similar
        /// component (post-filters band-collision false positives).
        #[structopt(long, default_value = "0.5")]
        similarity_floor: f64,
    },
}
