//! Loading the databases and editing them under a lock.

use anyhow::{Context, Result};
use tracing::debug;

use crate::db::builds::BuildDb;
use crate::db::deps::DependencyDb;
use crate::db::document::LoadOptions;
use crate::sources::managed::ManagedRepository;
use crate::sources::registry::AdapterRegistry;
use crate::util::context::GlobalContext;
use crate::util::errors::DbResult;

/// Options for a plain read.
pub fn read_options(ctx: &GlobalContext) -> LoadOptions {
    if ctx.use_lock() {
        LoadOptions::read(ctx.lock_timeout())
    } else {
        LoadOptions::unlocked()
    }
}

/// Options for a read that is followed by a save.
pub fn edit_options(ctx: &GlobalContext) -> LoadOptions {
    if ctx.use_lock() {
        LoadOptions::edit(ctx.lock_timeout())
    } else {
        LoadOptions::unlocked()
    }
}

/// The database directory as a managed repository.
pub fn open_repository(ctx: &GlobalContext) -> Result<ManagedRepository> {
    let registry = AdapterRegistry::with_defaults();
    ManagedRepository::open(
        &registry,
        ctx.dbdir(),
        ctx.repo_mode(),
        None,
        ctx.lock_timeout(),
        ctx.is_dry_run(),
    )
    .with_context(|| format!("failed to open repository at {}", ctx.dbdir().display()))
}

/// A database file that can take part in an edit session.
pub trait EditableDb: Sized {
    /// Short name used in messages.
    const NAME: &'static str;

    /// Load the database named by `ctx`.
    fn open(ctx: &GlobalContext, opts: LoadOptions) -> Result<Self>;

    /// Write the database back to the file it was loaded from.
    fn store(&mut self, dry_run: bool) -> DbResult<()>;
}

impl EditableDb for DependencyDb {
    const NAME: &'static str = "dependency database";

    fn open(ctx: &GlobalContext, opts: LoadOptions) -> Result<Self> {
        let path = ctx.deps_file();
        DependencyDb::load(path, opts)
            .with_context(|| format!("failed to load {}", path.display()))
    }

    fn store(&mut self, dry_run: bool) -> DbResult<()> {
        self.save(None, dry_run)
    }
}

impl EditableDb for BuildDb {
    const NAME: &'static str = "build database";

    fn open(ctx: &GlobalContext, opts: LoadOptions) -> Result<Self> {
        let path = ctx.builds_file();
        let mut db = BuildDb::load_or_default(path, opts)
            .with_context(|| format!("failed to load {}", path.display()))?;
        for overlay in ctx.overlays() {
            db.overlay(overlay, read_options(ctx))
                .with_context(|| format!("failed to load overlay {}", overlay.display()))?;
        }
        Ok(db)
    }

    fn store(&mut self, dry_run: bool) -> DbResult<()> {
        self.save(None, dry_run)
    }
}

/// Load the dependency database for reading.
pub fn load_deps(ctx: &GlobalContext) -> Result<DependencyDb> {
    open_repository(ctx)?.prepare_read()?;
    DependencyDb::open(ctx, read_options(ctx))
}

/// Load the build database and its overlays for reading.
pub fn load_builds(ctx: &GlobalContext) -> Result<BuildDb> {
    open_repository(ctx)?.prepare_read()?;
    BuildDb::open(ctx, read_options(ctx))
}

/// Run `f` on a database while holding its lock, then save it.
///
/// The lock is taken when loading and released by the save, so no other
/// process can change the file in between. Nothing is written when `f`
/// fails. `message` describes the change for the repository commit.
pub fn with_locked_db<D, R, F>(ctx: &GlobalContext, message: &str, f: F) -> Result<R>
where
    D: EditableDb,
    F: FnOnce(&mut D) -> Result<R>,
{
    let mut repo = open_repository(ctx)?;
    repo.prepare_read()?;
    let mut db = D::open(ctx, edit_options(ctx))?;
    let out = f(&mut db)?;
    db.store(ctx.is_dry_run())
        .with_context(|| format!("failed to save the {}", D::NAME))?;
    debug!("saved the {}", D::NAME);
    repo.finish_write(message)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::builds::BuildState;
    use crate::test_support::{sample_dbdir, BUILDS_JSON, OVERLAY_BUILDS_JSON};
    use std::fs;
    use tempfile::TempDir;

    fn context(dir: &std::path::Path) -> GlobalContext {
        let mut ctx = GlobalContext::with_cwd(dir.to_path_buf());
        ctx.set_dbdir(dir.to_path_buf());
        ctx
    }

    #[test]
    fn test_edit_session_saves_and_unlocks() {
        let tmp = sample_dbdir();
        let ctx = context(tmp.path());

        with_locked_db(&ctx, "set weight", |db: &mut DependencyDb| {
            assert!(fs::symlink_metadata(tmp.path().join("DEPS.DB.lock")).is_ok());
            db.set_weight("MCAN", "R2-6", 5)?;
            Ok(())
        })
        .unwrap();

        assert!(fs::symlink_metadata(tmp.path().join("DEPS.DB.lock")).is_err());
        let db = load_deps(&ctx).unwrap();
        assert_eq!(db.weight("MCAN", "R2-6").unwrap(), 5);
        assert!(tmp.path().join("DEPS.DB.bak").exists());
    }

    #[test]
    fn test_failed_edit_writes_nothing() {
        let tmp = sample_dbdir();
        let ctx = context(tmp.path());
        let before = fs::read_to_string(ctx.builds_file()).unwrap();

        let result: Result<()> = with_locked_db(&ctx, "delete", |db: &mut BuildDb| {
            db.delete("MYAPP-001")?;
            anyhow::bail!("changed my mind")
        });
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(ctx.builds_file()).unwrap(), before);
        assert!(fs::symlink_metadata(tmp.path().join("BUILDS.DB.lock")).is_err());
    }

    #[test]
    fn test_dry_run_leaves_file_alone() {
        let tmp = sample_dbdir();
        let mut ctx = context(tmp.path());
        ctx.set_dry_run(true);

        with_locked_db(&ctx, "state", |db: &mut BuildDb| {
            db.change_state("MYAPP-001", BuildState::Stable)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(fs::read_to_string(ctx.builds_file()).unwrap(), BUILDS_JSON);
    }

    #[test]
    fn test_overlay_builds_are_not_saved() {
        let tmp = sample_dbdir();
        let overlay = tmp.path().join("SHARED.DB");
        fs::write(&overlay, OVERLAY_BUILDS_JSON).unwrap();
        let mut ctx = context(tmp.path());
        ctx.add_overlay(overlay);

        let db = load_builds(&ctx).unwrap();
        assert!(db.tag_is_overlayed("SHARED-001"));

        with_locked_db(&ctx, "new build", |db: &mut BuildDb| {
            db.add_module("MYAPP-003", "MYAPP-003", "ALARM", "R3-8")?;
            Ok(())
        })
        .unwrap();
        let text = fs::read_to_string(ctx.builds_file()).unwrap();
        assert!(text.contains("MYAPP-003"));
        assert!(!text.contains("SHARED-001"));
    }

    #[test]
    fn test_edit_of_new_build_db_is_locked() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(tmp.path());

        with_locked_db(&ctx, "new build", |db: &mut BuildDb| {
            let second = BuildDb::load_or_default(ctx.builds_file(), edit_options(&ctx));
            assert!(matches!(second, Err(crate::util::errors::DbError::Locked { .. })));
            db.add_module("MYAPP-001", "MYAPP-001", "ALARM", "R3-7")?;
            Ok(())
        })
        .unwrap();
        assert!(load_builds(&ctx).unwrap().has_build_tag("MYAPP-001"));
    }

    #[test]
    fn test_missing_build_db_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(tmp.path());
        let db = load_builds(&ctx).unwrap();
        assert!(db.is_empty());
        assert!(load_deps(&ctx).is_err());
    }
}
