//! `drydock spec` command

use anyhow::Result;

use super::Session;
use crate::cli::{SpecArgs, SpecCommands};
use drydock::ops::complete;

pub fn execute(session: &Session, args: SpecArgs) -> Result<()> {
    match args.command {
        SpecCommands::Complete { specs } => {
            let items = session.specs(&specs)?;
            let completion = complete(&session.ctx, &items)?;
            for (module, versions) in &completion.sets {
                let versions: Vec<&str> = versions.iter().map(String::as_str).collect();
                let marker = if completion.added.contains(module) { " (added)" } else { "" };
                println!("{}:{}{}", module, versions.join(","), marker);
            }
            let ambiguous = completion.ambiguous();
            if !ambiguous.is_empty() {
                tracing::warn!("more than one version possible for: {}", ambiguous.join(" "));
            }
            Ok(())
        }
    }
}
