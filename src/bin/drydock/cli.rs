//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// Drydock - a dependency-aware module and build database manager
#[derive(Parser)]
#[command(name = "drydock")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding DEPS.DB and BUILDS.DB
    #[arg(long, global = true, env = "DRYDOCK_DBDIR")]
    pub dbdir: Option<PathBuf>,

    /// Seconds to wait for a database lock
    #[arg(long, global = true)]
    pub lock_timeout: Option<u32>,

    /// Show what would be written without writing
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,

    /// Read and write the databases without locking
    #[arg(long, global = true)]
    pub no_lock: bool,

    /// Load this configuration file instead of searching for one
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Repository synchronization of the database directory
    #[arg(long, global = true, value_parser = ["get", "pull", "push"])]
    pub repo_mode: Option<String>,

    /// Extra build database layered read-only on top of BUILDS.DB
    #[arg(long, global = true)]
    pub overlay: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Query and edit the dependency database
    Db(DbArgs),

    /// Query and edit the build database
    Build(BuildArgs),

    /// Work with module specs
    Spec(SpecArgs),

    /// Show the effective configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct DbArgs {
    #[command(subcommand)]
    pub command: DbCommands,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Check the database for missing dependencies
    Check,

    /// Print the database
    Show {
        /// Only show versions matching these specs
        specs: Vec<String>,
    },

    /// Merge another dependency database into this one
    Merge {
        file: PathBuf,
    },

    /// List module names
    Modules,

    /// List the versions of a module, newest first
    Versions {
        module: String,
    },

    /// Add a dependency to a module version
    AddDep {
        /// MODULE:VERSION
        module: String,
        dependency: String,
    },

    /// Remove a dependency from a module version
    RmDep {
        /// MODULE:VERSION
        module: String,
        dependency: String,
    },

    /// Show or set the weight of a module version
    Weight {
        /// MODULE:VERSION
        module: String,
        weight: Option<i64>,
    },

    /// Copy a module version under a new version name
    CloneVersion {
        /// MODULE:VERSION
        module: String,
        new_version: String,
        /// Remove the old version
        #[arg(long)]
        replace: bool,
    },

    /// Copy a module under a new name
    CloneModule {
        old: String,
        new: String,
        /// Versions to copy, all if none are given
        versions: Vec<String>,
    },

    /// Search module names and source URLs
    Search {
        regex: String,
    },

    /// Order module versions
    Sort(DbSortArgs),
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortKey {
    Weight,
    Dependency,
}

#[derive(Args)]
pub struct DbSortArgs {
    /// MODULE:VERSION specs
    #[arg(required = true)]
    pub specs: Vec<String>,

    #[arg(long, value_enum, default_value = "dependency")]
    pub by: SortKey,

    #[arg(long)]
    pub reverse: bool,
}

#[derive(Args)]
pub struct BuildArgs {
    #[command(subcommand)]
    pub command: BuildCommands,
}

#[derive(Subcommand)]
pub enum BuildCommands {
    /// List build tags
    List {
        /// Only builds in this state
        #[arg(long)]
        state: Option<String>,
    },

    /// Print one build
    Show {
        tag: String,
    },

    /// Show or change the state of a build
    State {
        tag: String,
        new_state: Option<String>,
    },

    /// Delete a build
    Delete {
        tag: String,
    },

    /// Find builds matching module specs
    Find(FindArgs),

    /// Order builds so that linked builds come first
    Sort {
        #[arg(long)]
        reverse: bool,
    },

    /// Show the builds a build takes modules from
    Linked {
        tag: String,
        /// Follow links transitively
        #[arg(long)]
        recursive: bool,
    },

    /// Register a new build from module specs
    New(NewBuildArgs),
}

#[derive(Args)]
pub struct FindArgs {
    /// Module specs, added to the `module` configuration list
    pub specs: Vec<String>,

    /// Include unstable and incomplete builds
    #[arg(long)]
    pub all_states: bool,

    /// Only builds that satisfy every spec
    #[arg(long)]
    pub full: bool,
}

#[derive(Args)]
pub struct NewBuildArgs {
    /// Stem of the generated build tag
    pub stem: String,

    /// Module specs, added to the `module` configuration list
    pub specs: Vec<String>,

    /// Use this tag instead of generating one
    #[arg(long)]
    pub tag: Option<String>,

    /// Do not link modules to existing builds
    #[arg(long)]
    pub no_reuse: bool,
}

#[derive(Args)]
pub struct SpecArgs {
    #[command(subcommand)]
    pub command: SpecCommands,
}

#[derive(Subcommand)]
pub enum SpecCommands {
    /// Resolve specs and add every missing dependency
    Complete {
        /// Module specs, added to the `module` configuration list
        specs: Vec<String>,
    },
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the merged configuration and where it came from
    Show,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
