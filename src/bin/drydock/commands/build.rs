//! `drydock build` command

use anyhow::Result;

use super::Session;
use crate::cli::{BuildArgs, BuildCommands, FindArgs, NewBuildArgs};
use drydock::db::builds::{BuildDb, BuildState};
use drydock::ops::{
    find_builds, load_builds, load_deps, parse_specs, register_build, with_locked_db, FindOptions,
    RegisterOptions,
};

pub fn execute(session: &Session, args: BuildArgs) -> Result<()> {
    let ctx = &session.ctx;
    match args.command {
        BuildCommands::List { state } => {
            let db = load_builds(ctx)?;
            let wanted = state.map(|s| s.parse::<BuildState>()).transpose()?;
            for tag in db.iter_builds() {
                if let Some(wanted) = wanted {
                    if db.state(tag)? != wanted {
                        continue;
                    }
                }
                println!("{}", tag);
            }
            Ok(())
        }
        BuildCommands::Show { tag } => {
            let db = load_builds(ctx)?;
            let build = db.build(&tag)?;
            println!("{} ({})", tag, build.state);
            for spec in db.module_specs(&tag)? {
                let (module, _) = spec.split_once(':').unwrap_or((spec.as_str(), ""));
                match db.module_link(&tag, module)? {
                    Some(owner) => println!("    {} (from {})", spec, owner),
                    None => println!("    {}", spec),
                }
            }
            Ok(())
        }
        BuildCommands::State { tag, new_state } => match new_state {
            None => {
                println!("{}", load_builds(ctx)?.state(&tag)?);
                Ok(())
            }
            Some(new_state) => {
                let state: BuildState = new_state.parse()?;
                let message = format!("{}: state {}", tag, state);
                with_locked_db(ctx, &message, |db: &mut BuildDb| {
                    Ok(db.change_state(&tag, state)?)
                })
            }
        },
        BuildCommands::Delete { tag } => {
            let message = format!("{}: deleted", tag);
            with_locked_db(ctx, &message, |db: &mut BuildDb| Ok(db.delete(&tag)?))
        }
        BuildCommands::Find(find) => find_command(session, find),
        BuildCommands::Sort { reverse } => {
            let db = load_builds(ctx)?;
            let tags: Vec<String> = db.iter_builds().map(String::from).collect();
            for tag in db.sort_by_linkage(&tags, reverse)?.order {
                println!("{}", tag);
            }
            Ok(())
        }
        BuildCommands::Linked { tag, recursive } => {
            let db = load_builds(ctx)?;
            let linked = if recursive {
                db.rec_linked_builds(&tag)?
            } else {
                db.linked_to(&tag)?
            };
            for other in linked {
                println!("{}", other);
            }
            Ok(())
        }
        BuildCommands::New(new) => new_command(session, new),
    }
}

fn find_command(session: &Session, args: FindArgs) -> Result<()> {
    let db = load_builds(&session.ctx)?;
    let specs = parse_specs(&session.specs(&args.specs)?, &db)?;
    let opts = FindOptions {
        all_states: args.all_states,
        full_only: args.full,
    };
    let found = find_builds(&db, &specs, &opts)?;
    if found.is_empty() {
        tracing::info!("no matching builds found");
    }
    for build in found {
        for line in build.lines() {
            println!("{}", line);
        }
    }
    Ok(())
}

fn new_command(session: &Session, args: NewBuildArgs) -> Result<()> {
    let ctx = &session.ctx;
    let deps = load_deps(ctx)?;
    let items = session.specs(&args.specs)?;
    let mut opts = RegisterOptions::new(args.stem.as_str());
    opts.tag = args.tag;
    opts.reuse = !args.no_reuse;

    let message = format!("new build from {}", items.join(" "));
    let done = with_locked_db(ctx, &message, |db: &mut BuildDb| {
        let specs = parse_specs(&items, db)?;
        register_build(&deps, db, &specs, &opts)
    })?;
    if done.created {
        println!("{}", done.tag);
        for (module, owner) in &done.linked {
            tracing::info!("{} linked from {}", module, owner);
        }
    } else {
        println!("{} (existing)", done.tag);
    }
    Ok(())
}
