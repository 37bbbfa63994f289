//! Finding builds that match a set of module specs.

use crate::core::spec_list::SpecList;
use crate::db::builds::{BuildDb, BuildState, MatchResult};
use crate::resolver::matching::rank;
use crate::util::errors::DbResult;

/// Options for [`find_builds`].
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Also report unstable and incomplete builds.
    pub all_states: bool,
    /// Only report builds that satisfy every spec.
    pub full_only: bool,
}

/// One build reported by [`find_builds`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundBuild {
    pub tag: String,
    pub state: BuildState,
    pub result: MatchResult,
}

impl FoundBuild {
    /// True if every spec is satisfied.
    pub fn is_full_match(&self) -> bool {
        self.result.wrong_version == 0 && self.result.missing == 0
    }

    /// Output lines: the tag, then one `FLAG MODULE[:VERSION]` line per spec.
    pub fn lines(&self) -> Vec<String> {
        let mut out = vec![format!("{} ({})", self.tag, self.state)];
        for module in self.result.modules.values() {
            out.push(format!("    {:<2} {}", module.flag.as_str(), module.rendered));
        }
        out
    }
}

/// Builds matching `specs`, best match first.
///
/// Disabled builds are never reported. Builds that are neither `stable`
/// nor `testing` are skipped unless `opts.all_states` is set.
pub fn find_builds(builds: &BuildDb, specs: &SpecList, opts: &FindOptions) -> DbResult<Vec<FoundBuild>> {
    let results = builds.check_by_module_specs(specs);
    let mut found = Vec::new();
    for ranked in rank(&results) {
        let state = builds.state(ranked.tag)?;
        if state == BuildState::Disabled {
            continue;
        }
        if !opts.all_states && !builds.is_testing_or_stable(ranked.tag)? {
            continue;
        }
        let build = FoundBuild {
            tag: ranked.tag.to_string(),
            state,
            result: ranked.result.clone(),
        };
        if opts.full_only && !build.is_full_match() {
            continue;
        }
        found.push(build);
    }
    Ok(found)
}
