//! Command implementations

pub mod build;
pub mod completions;
pub mod config;
pub mod db;
pub mod spec;

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use serde_json::Value;

use crate::cli::Cli;
use drydock::core::spec::VersionSpec;
use drydock::util::config::{ConfigFile, DRYDOCK_OPTIONS};
use drydock::util::context::GlobalContext;

/// Everything a command needs: the resolved context and the merged
/// configuration it was built from.
pub struct Session {
    pub ctx: GlobalContext,
    pub config: ConfigFile,
}

impl Session {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut ctx = GlobalContext::new()?;
        let mut config = ConfigFile::new(DRYDOCK_OPTIONS);
        match &cli.config {
            Some(path) => config.load_file(path, true)?,
            None => config.load(&ConfigFile::search_paths(ctx.cwd()))?,
        }
        config
            .merge_cli(cli_overrides(cli), true)
            .context("invalid command line option")?;

        ctx.apply_config(&config)?;
        ctx.set_use_lock(!cli.no_lock);
        Ok(Session { ctx, config })
    }

    /// Module specs from the configuration followed by `args`.
    pub fn specs(&self, args: &[String]) -> Result<Vec<String>> {
        let mut specs = self.config.get_list("module");
        specs.extend(args.iter().cloned());
        if specs.is_empty() {
            bail!("no module specs given");
        }
        Ok(specs)
    }
}

fn cli_overrides(cli: &Cli) -> BTreeMap<String, Value> {
    let mut values = BTreeMap::new();
    if let Some(dir) = &cli.dbdir {
        values.insert("dbdir".to_string(), Value::from(dir.to_string_lossy().into_owned()));
    }
    if let Some(timeout) = cli.lock_timeout {
        values.insert("lock-timeout".to_string(), Value::from(timeout.to_string()));
    }
    if let Some(mode) = &cli.repo_mode {
        values.insert("dbrepomode".to_string(), Value::from(mode.as_str()));
    }
    if !cli.overlay.is_empty() {
        let list: Vec<Value> = cli
            .overlay
            .iter()
            .map(|p| Value::from(p.to_string_lossy().into_owned()))
            .collect();
        values.insert("overlay".to_string(), Value::from(list));
    }
    if cli.dry_run {
        values.insert("dry-run".to_string(), Value::from(true));
    }
    if cli.verbose {
        values.insert("verbose".to_string(), Value::from(true));
    }
    values
}

/// Split `MODULE:VERSION`, which must name exactly one version.
pub fn module_version(text: &str) -> Result<(String, String)> {
    let spec = VersionSpec::parse(text)?;
    spec.assert_exact()?;
    let version = spec
        .version()
        .with_context(|| format!("'{}' names no version", text))?;
    Ok((spec.module().to_string(), version.to_string()))
}
