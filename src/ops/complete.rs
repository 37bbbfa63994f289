//! Spec parsing against the build database, spec completion, and the
//! cached module list used for shell completion.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::debug;

use crate::core::spec_list::SpecList;
use crate::db::builds::BuildDb;
use crate::db::cache::BinaryCache;
use crate::ops::edit::{load_builds, load_deps};
use crate::resolver::closure::{complete_specs, Completion};
use crate::util::context::{GlobalContext, CACHE_MAX_AGE};
use crate::util::fs::mtime_nanos;
use crate::util::hash::CacheKey;

/// Parse spec strings, resolving `:build:TAG` through `builds`.
pub fn parse_specs<S: AsRef<str>>(items: &[S], builds: &BuildDb) -> Result<SpecList> {
    Ok(SpecList::from_strings(items, &mut |tag: &str| builds.module_specs(tag))?)
}

/// Parse `items` and close them over the dependency database.
pub fn complete(ctx: &GlobalContext, items: &[String]) -> Result<Completion> {
    let deps = load_deps(ctx)?;
    let builds = load_builds(ctx)?;
    let specs = parse_specs(items, &builds)?;
    Ok(complete_specs(&deps, &specs)?)
}

fn cache_key(ctx: &GlobalContext) -> Option<String> {
    let path = ctx.deps_file();
    let mtime = mtime_nanos(path)?;
    let mut key = CacheKey::new();
    key.part("module-versions")
        .part(&path.to_string_lossy())
        .part(&mtime.to_string());
    Some(key.finish())
}

/// Modules and their versions, served from the cache when it is fresh.
pub fn module_versions(ctx: &GlobalContext) -> Result<BTreeMap<String, Vec<String>>> {
    let cache = BinaryCache::new(ctx.cache_dir(), CACHE_MAX_AGE);
    let key = cache_key(ctx);
    if let Some(key) = &key {
        if let Some(map) = cache.fetch::<BTreeMap<String, Vec<String>>>(key) {
            debug!("module list served from cache");
            return Ok(map);
        }
    }
    let map = load_deps(ctx)?.module_versions_map();
    if let Some(key) = &key {
        if let Err(e) = cache.store(key, &map) {
            debug!("could not update cache: {}", e);
        }
    }
    Ok(map)
}
