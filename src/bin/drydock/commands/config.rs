//! `drydock config` command

use anyhow::Result;

use super::Session;
use crate::cli::{ConfigArgs, ConfigCommands};

pub fn execute(session: &Session, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => {
            for path in session.config.loaded_paths() {
                tracing::info!("loaded {}", path.display());
            }
            print!("{}", session.config.to_json_string()?);
            Ok(())
        }
    }
}
