//! `drydock db` command

use anyhow::{bail, Context, Result};
use regex::Regex;

use super::{module_version, Session};
use crate::cli::{DbArgs, DbCommands, DbSortArgs, SortKey};
use drydock::core::spec_list::SpecList;
use drydock::db::deps::{DependencyDb, ModuleVersion};
use drydock::ops::edit::read_options;
use drydock::ops::{load_deps, module_versions, with_locked_db};

pub fn execute(session: &Session, args: DbArgs) -> Result<()> {
    let ctx = &session.ctx;
    match args.command {
        DbCommands::Check => {
            let problems = load_deps(ctx)?.check();
            for line in &problems {
                println!("{}", line);
            }
            if !problems.is_empty() {
                bail!("dependency database has {} problem(s)", problems.len());
            }
            Ok(())
        }
        DbCommands::Show { specs } => {
            let db = load_deps(ctx)?;
            let text = if specs.is_empty() {
                db.to_json_string()?
            } else {
                db.partial_copy_by_specs(&SpecList::parse_all(&specs)?)?
                    .to_json_string()?
            };
            print!("{}", text);
            Ok(())
        }
        DbCommands::Merge { file } => {
            let other = DependencyDb::load(&file, read_options(ctx))
                .with_context(|| format!("failed to load {}", file.display()))?;
            let message = format!("merged {}", file.display());
            with_locked_db(ctx, &message, |db: &mut DependencyDb| Ok(db.merge(&other)?))
        }
        DbCommands::Modules => {
            for module in module_versions(ctx)?.keys() {
                println!("{}", module);
            }
            Ok(())
        }
        DbCommands::Versions { module } => {
            for version in load_deps(ctx)?.sorted_versions(&module)? {
                println!("{}", version);
            }
            Ok(())
        }
        DbCommands::AddDep { module, dependency } => {
            let (m, v) = module_version(&module)?;
            let message = format!("{}:{}: added dependency {}", m, v, dependency);
            with_locked_db(ctx, &message, |db: &mut DependencyDb| {
                db.assert_module(&dependency, None)?;
                Ok(db.add_dependency(&m, &v, &dependency)?)
            })
        }
        DbCommands::RmDep { module, dependency } => {
            let (m, v) = module_version(&module)?;
            let message = format!("{}:{}: removed dependency {}", m, v, dependency);
            with_locked_db(ctx, &message, |db: &mut DependencyDb| {
                Ok(db.remove_dependency(&m, &v, &dependency)?)
            })
        }
        DbCommands::Weight { module, weight } => {
            let (m, v) = module_version(&module)?;
            match weight {
                None => {
                    println!("{}", load_deps(ctx)?.weight(&m, &v)?);
                    Ok(())
                }
                Some(weight) => {
                    let message = format!("{}:{}: weight {}", m, v, weight);
                    with_locked_db(ctx, &message, |db: &mut DependencyDb| {
                        Ok(db.set_weight(&m, &v, weight)?)
                    })
                }
            }
        }
        DbCommands::CloneVersion {
            module,
            new_version,
            replace,
        } => {
            let (m, v) = module_version(&module)?;
            let verb = if replace { "replaced" } else { "cloned" };
            let message = format!("{}:{}: {} as {}", m, v, verb, new_version);
            with_locked_db(ctx, &message, |db: &mut DependencyDb| {
                Ok(db.clone_version(&m, &v, &new_version, replace)?)
            })
        }
        DbCommands::CloneModule { old, new, versions } => {
            let message = format!("{}: cloned as {}", old, new);
            with_locked_db(ctx, &message, |db: &mut DependencyDb| {
                Ok(db.clone_module(&old, &new, &versions)?)
            })
        }
        DbCommands::Search { regex } => {
            let rx = Regex::new(&regex).with_context(|| format!("invalid regex '{}'", regex))?;
            for (m, v) in load_deps(ctx)?.search_modules(&rx) {
                println!("{}:{}", m, v);
            }
            Ok(())
        }
        DbCommands::Sort(sort) => sort_versions(session, sort),
    }
}

fn sort_versions(session: &Session, args: DbSortArgs) -> Result<()> {
    let db = load_deps(&session.ctx)?;
    let items: Vec<ModuleVersion> = args
        .specs
        .iter()
        .map(|s| module_version(s))
        .collect::<Result<_>>()?;
    for (m, v) in &items {
        db.assert_module(m, Some(v))?;
    }
    let order = match args.by {
        SortKey::Weight => db.sort_by_weight(&items, args.reverse)?,
        SortKey::Dependency => db.sort_by_dependency(&items, args.reverse)?.order,
    };
    for (m, v) in order {
        println!("{}:{}", m, v);
    }
    Ok(())
}
