//! The build database.
//!
//! Maps a build tag to the exact module versions that were built together,
//! the state of that build and, for modules taken over from another build
//! instead of being built locally, the tag of the build they come from.
//!
//! Additional build files can be layered on top as read-only overlays.
//! While overlay mode is on, overlaid builds are visible to every query but
//! cannot be changed and are left out when the primary file is saved.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::spec::VersionSpec;
use crate::core::spec_list::SpecList;
use crate::db::document::{Document, DocumentData, LoadOptions};
use crate::resolver::order::{settle_levels, CycleWarning};
use crate::util::errors::{DbError, DbResult};
use crate::util::json;

/// Prefix of build tags made up by the tool rather than the user.
pub const GENERATED_TAG_PREFIX: &str = "AUTO-";

/// Lifecycle state of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    Stable,
    Testing,
    Unstable,
    Incomplete,
    Disabled,
    Broken,
}

impl BuildState {
    pub const ALL: [BuildState; 6] = [
        BuildState::Stable,
        BuildState::Testing,
        BuildState::Unstable,
        BuildState::Incomplete,
        BuildState::Disabled,
        BuildState::Broken,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BuildState::Stable => "stable",
            BuildState::Testing => "testing",
            BuildState::Unstable => "unstable",
            BuildState::Incomplete => "incomplete",
            BuildState::Disabled => "disabled",
            BuildState::Broken => "broken",
        }
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildState {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BuildState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| DbError::spec(format!("unknown state: {:?}", s)))
    }
}

/// Reject states a build may not be put into.
pub fn check_state(state: BuildState, new_build: bool) -> DbResult<()> {
    if new_build && state == BuildState::Disabled {
        return Err(DbError::spec("state 'disabled' not allowed for a new build"));
    }
    Ok(())
}

/// One build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildRecord {
    pub state: BuildState,
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
    /// Module -> tag of the build it was taken from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked: Option<BTreeMap<String, String>>,
}

impl BuildRecord {
    pub fn new(state: BuildState) -> Self {
        BuildRecord {
            state,
            modules: BTreeMap::new(),
            linked: None,
        }
    }

    /// Tags of the builds this one takes modules from.
    pub fn linked_to(&self) -> BTreeSet<String> {
        self.linked.iter().flatten().map(|(_, tag)| tag.clone()).collect()
    }
}

#[derive(Debug, Clone, Default)]
struct OverlayState {
    files: Vec<PathBuf>,
    /// Overlaid tag -> index into `files`.
    owners: BTreeMap<String, usize>,
    /// Overlay mode switched off, for diagnostic dumps.
    suspended: bool,
}

/// The persisted content of a build database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildsData {
    builds: BTreeMap<String, BuildRecord>,
    #[serde(skip)]
    overlay: OverlayState,
}

impl DocumentData for BuildsData {
    const KIND: &'static str = "build";

    fn selfcheck(&self, origin: &str) -> DbResult<()> {
        for (tag, build) in &self.builds {
            let stray = build
                .linked
                .iter()
                .flatten()
                .find(|(module, _)| !build.modules.contains_key(*module));
            if let Some((module, _)) = stray {
                return Err(DbError::Invalid {
                    kind: Self::KIND,
                    message: format!("build {} links module {} it does not contain", tag, module),
                    origin: origin.to_string(),
                });
            }
        }
        Ok(())
    }

    fn persisted_text(&self) -> DbResult<String> {
        if self.overlay.suspended || self.overlay.owners.is_empty() {
            return json::to_string_sorted(&self.builds);
        }
        let own: BTreeMap<&String, &BuildRecord> = self
            .builds
            .iter()
            .filter(|(tag, _)| !self.overlay.owners.contains_key(*tag))
            .collect();
        json::to_string_sorted(&own)
    }
}

/// How one module of a build compares with a spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchFlag {
    /// The build lacks the module.
    Missing,
    /// The spec rejects the build's version.
    WrongVersion,
    /// An exact spec names exactly this version.
    Exact,
    /// An inexact spec accepts the version.
    Compatible,
}

impl MatchFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchFlag::Missing => "-",
            MatchFlag::WrongVersion => "!=",
            MatchFlag::Exact => "==",
            MatchFlag::Compatible => "=~",
        }
    }
}

impl fmt::Display for MatchFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMatch {
    pub flag: MatchFlag,
    /// `MODULE:VERSION` found in the build, or just `MODULE` if missing.
    pub rendered: String,
}

/// Per build outcome of [`BuildDb::check_by_module_specs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: usize,
    pub wrong_version: usize,
    pub missing: usize,
    pub modules: BTreeMap<String, ModuleMatch>,
}

/// Result of [`BuildDb::sort_by_linkage`].
#[derive(Debug, Clone)]
pub struct LinkageOrder {
    pub order: Vec<String>,
    pub cycle: Option<CycleWarning>,
}

#[derive(Debug, Default)]
pub struct BuildDb {
    doc: Document<BuildsData>,
}

impl BuildDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path, opts: LoadOptions) -> DbResult<Self> {
        Ok(BuildDb {
            doc: Document::load(path, opts)?,
        })
    }

    /// Load `path`, starting empty when it does not exist yet.
    pub fn load_or_default(path: &Path, opts: LoadOptions) -> DbResult<Self> {
        Ok(BuildDb {
            doc: Document::load_or_default(path, opts)?,
        })
    }

    pub fn from_json_str(text: &str, origin: &str) -> DbResult<Self> {
        Ok(BuildDb {
            doc: Document::from_json_str(text, origin)?,
        })
    }

    pub fn document(&self) -> &Document<BuildsData> {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document<BuildsData> {
        &mut self.doc
    }

    pub fn save(&mut self, path: Option<&Path>, dry_run: bool) -> DbResult<()> {
        let overlay = &self.doc.data().overlay;
        if overlay.suspended {
            // Saving now would copy overlaid builds into the primary file.
            if let Some((tag, &idx)) = overlay.owners.iter().next() {
                return Err(DbError::ReadOnly {
                    tag: tag.clone(),
                    owner: overlay.files[idx].clone(),
                });
            }
        }
        self.doc.save(path, dry_run)
    }

    pub fn to_json_string(&self) -> DbResult<String> {
        self.doc.to_json_string()
    }

    fn builds(&self) -> &BTreeMap<String, BuildRecord> {
        &self.doc.data().builds
    }

    fn builds_mut(&mut self) -> &mut BTreeMap<String, BuildRecord> {
        &mut self.doc.data_mut().builds
    }

    pub fn is_empty(&self) -> bool {
        self.builds().is_empty()
    }

    pub fn has_build_tag(&self, tag: &str) -> bool {
        self.builds().contains_key(tag)
    }

    /// Build tags in sorted order.
    pub fn iter_builds(&self) -> impl Iterator<Item = &str> {
        self.builds().keys().map(String::as_str)
    }

    pub fn build(&self, tag: &str) -> DbResult<&BuildRecord> {
        self.builds()
            .get(tag)
            .ok_or_else(|| DbError::not_found(format!("build '{}' not found", tag)))
    }

    fn build_mut(&mut self, tag: &str) -> DbResult<&mut BuildRecord> {
        self.assert_writable(tag)?;
        self.builds_mut()
            .get_mut(tag)
            .ok_or_else(|| DbError::not_found(format!("build '{}' not found", tag)))
    }

    fn assert_writable(&self, tag: &str) -> DbResult<()> {
        let overlay = &self.doc.data().overlay;
        if overlay.suspended {
            return Ok(());
        }
        match overlay.owners.get(tag) {
            Some(&idx) => Err(DbError::ReadOnly {
                tag: tag.to_string(),
                owner: overlay.files[idx].clone(),
            }),
            None => Ok(()),
        }
    }

    // ---- build tags ----

    /// `STEM-NNN` with the number one above the highest in use.
    pub fn generate_buildtag(&self, stem: &str) -> DbResult<String> {
        let prefix = format!("{}-", stem);
        let highest = self
            .iter_builds()
            .filter_map(|tag| tag.strip_prefix(&prefix))
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        let next = highest.checked_add(1).ok_or_else(|| {
            DbError::spec(format!("no free build number left for stem '{}'", stem))
        })?;
        Ok(format!("{}{:03}", prefix, next))
    }

    pub fn is_generated_buildtag(tag: &str) -> bool {
        tag.starts_with(GENERATED_TAG_PREFIX)
    }

    // ---- states ----

    pub fn new_build(&mut self, tag: &str, state: BuildState) -> DbResult<()> {
        check_state(state, true)?;
        if self.has_build_tag(tag) {
            return Err(DbError::spec(format!("cannot create, build {} already exists", tag)));
        }
        self.builds_mut().insert(tag.to_string(), BuildRecord::new(state));
        Ok(())
    }

    pub fn state(&self, tag: &str) -> DbResult<BuildState> {
        Ok(self.build(tag)?.state)
    }

    pub fn change_state(&mut self, tag: &str, state: BuildState) -> DbResult<()> {
        check_state(state, false)?;
        self.build_mut(tag)?.state = state;
        Ok(())
    }

    pub fn is_stable(&self, tag: &str) -> DbResult<bool> {
        Ok(self.state(tag)? == BuildState::Stable)
    }

    pub fn is_testing_or_stable(&self, tag: &str) -> DbResult<bool> {
        Ok(matches!(self.state(tag)?, BuildState::Testing | BuildState::Stable))
    }

    pub fn is_unstable(&self, tag: &str) -> DbResult<bool> {
        Ok(self.state(tag)? == BuildState::Unstable)
    }

    pub fn is_incomplete(&self, tag: &str) -> DbResult<bool> {
        Ok(self.state(tag)? == BuildState::Incomplete)
    }

    pub fn is_disabled(&self, tag: &str) -> DbResult<bool> {
        Ok(self.state(tag)? == BuildState::Disabled)
    }

    pub fn delete(&mut self, tag: &str) -> DbResult<()> {
        self.assert_writable(tag)?;
        self.builds_mut()
            .remove(tag)
            .map(|_| ())
            .ok_or_else(|| DbError::not_found(format!("build '{}' not found", tag)))
    }

    // ---- modules ----

    /// Record `module:version` in build `tag`, creating the build if needed.
    ///
    /// When `module_tag` differs from `tag`, the module is a link to the
    /// build `module_tag`.
    pub fn add_module(&mut self, tag: &str, module_tag: &str, module: &str, version: &str) -> DbResult<()> {
        self.assert_writable(tag)?;
        let build = self
            .builds_mut()
            .entry(tag.to_string())
            .or_insert_with(|| BuildRecord::new(BuildState::Unstable));
        build.modules.insert(module.to_string(), version.to_string());
        if tag != module_tag {
            build
                .linked
                .get_or_insert_with(BTreeMap::new)
                .insert(module.to_string(), module_tag.to_string());
        }
        Ok(())
    }

    /// Copy one build from another database.
    pub fn add_build(&mut self, other: &BuildDb, tag: &str) -> DbResult<()> {
        if self.has_build_tag(tag) {
            return Err(DbError::spec(format!("cannot add, build {} already exists", tag)));
        }
        let record = other.build(tag)?.clone();
        self.builds_mut().insert(tag.to_string(), record);
        Ok(())
    }

    pub fn modules(&self, tag: &str) -> DbResult<&BTreeMap<String, String>> {
        Ok(&self.build(tag)?.modules)
    }

    pub fn has_module(&self, tag: &str, module: &str) -> DbResult<bool> {
        Ok(self.modules(tag)?.contains_key(module))
    }

    pub fn module_version(&self, tag: &str, module: &str) -> DbResult<Option<&str>> {
        Ok(self.modules(tag)?.get(module).map(String::as_str))
    }

    /// Exact spec strings of a build, sorted by module.
    pub fn module_specs(&self, tag: &str) -> DbResult<Vec<String>> {
        Ok(self
            .modules(tag)?
            .iter()
            .map(|(m, v)| VersionSpec::exact(m.as_str(), v.as_str()).to_string())
            .collect())
    }

    // ---- linkage ----

    /// Build the module was taken from, if it is linked.
    pub fn module_link(&self, tag: &str, module: &str) -> DbResult<Option<&str>> {
        Ok(self
            .build(tag)?
            .linked
            .as_ref()
            .and_then(|l| l.get(module))
            .map(String::as_str))
    }

    /// True if every module of the build is a link.
    pub fn is_fully_linked(&self, tag: &str) -> DbResult<bool> {
        let build = self.build(tag)?;
        Ok(match &build.linked {
            Some(linked) if !linked.is_empty() => linked.len() >= build.modules.len(),
            _ => false,
        })
    }

    pub fn linked_to(&self, tag: &str) -> DbResult<BTreeSet<String>> {
        Ok(self.build(tag)?.linked_to())
    }

    pub fn is_linked_to(&self, tag: &str, other: &str) -> DbResult<bool> {
        Ok(self
            .build(tag)?
            .linked
            .iter()
            .flatten()
            .any(|(_, t)| t == other))
    }

    /// Builds that take at least one module from `tag`.
    pub fn linked_builds(&self, tag: &str) -> BTreeSet<String> {
        self.builds()
            .iter()
            .filter(|(_, build)| build.linked.iter().flatten().any(|(_, t)| t == tag))
            .map(|(t, _)| t.clone())
            .collect()
    }

    /// Every build `tag` takes modules from, directly or indirectly.
    pub fn rec_linked_builds(&self, tag: &str) -> DbResult<BTreeSet<String>> {
        self.build(tag)?;
        Ok(closure(tag, |t| {
            self.builds().get(t).map(BuildRecord::linked_to).unwrap_or_default()
        }))
    }

    /// Every build that depends on `tag`, directly or indirectly.
    pub fn rec_dependent_builds(&self, tag: &str) -> DbResult<BTreeSet<String>> {
        self.build(tag)?;
        Ok(closure(tag, |t| self.linked_builds(t)))
    }

    /// Order builds so that a build comes after the builds it links to.
    pub fn sort_by_linkage(&self, tags: &[String], reverse: bool) -> DbResult<LinkageOrder> {
        let mut sorted: Vec<String> = tags.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut edges = BTreeMap::new();
        for tag in &sorted {
            edges.insert(tag.clone(), self.linked_to(tag)?);
        }
        let nodes: Vec<(String, i64)> = sorted.iter().map(|t| (t.clone(), 1)).collect();
        let settled = settle_levels("linkage", &nodes, &edges, Some(1), String::clone);

        if reverse {
            sorted.sort_by(|a, b| settled.level(b).cmp(&settled.level(a)).then_with(|| a.cmp(b)));
        } else {
            sorted.sort_by(|a, b| settled.level(a).cmp(&settled.level(b)).then_with(|| a.cmp(b)));
        }
        Ok(LinkageOrder {
            order: sorted,
            cycle: settled.cycle,
        })
    }

    // ---- matching ----

    /// Compare every build with `specs`.
    ///
    /// Builds that lack every requested module are left out.
    pub fn check_by_module_specs(&self, specs: &SpecList) -> BTreeMap<String, MatchResult> {
        let specs = specs.sorted();
        let mut results = BTreeMap::new();
        for (tag, build) in self.builds() {
            let mut result = MatchResult::default();
            for spec in &specs {
                let entry = match build.modules.get(spec.module()) {
                    None => {
                        result.missing += 1;
                        ModuleMatch {
                            flag: MatchFlag::Missing,
                            rendered: spec.module().to_string(),
                        }
                    }
                    Some(version) => {
                        let rendered = VersionSpec::exact(spec.module(), version.as_str()).to_string();
                        let flag = if !spec.matches(version) {
                            result.wrong_version += 1;
                            MatchFlag::WrongVersion
                        } else if spec.equal(version) {
                            result.matched += 1;
                            MatchFlag::Exact
                        } else {
                            result.matched += 1;
                            MatchFlag::Compatible
                        };
                        ModuleMatch { flag, rendered }
                    }
                };
                result.modules.insert(spec.module().to_string(), entry);
            }
            if result.matched > 0 || result.wrong_version > 0 {
                results.insert(tag.clone(), result);
            }
        }
        results
    }

    /// New database with the builds that satisfy every spec.
    pub fn filter_by_specs(&self, specs: &SpecList) -> BuildDb {
        let mut filtered = BuildsData::default();
        for (tag, build) in self.builds() {
            let all = specs.iter().all(|spec| {
                build
                    .modules
                    .get(spec.module())
                    .is_some_and(|v| spec.matches(v))
            });
            if all {
                filtered.builds.insert(tag.clone(), build.clone());
            }
        }
        BuildDb {
            doc: Document::new(filtered),
        }
    }

    // ---- merging and overlays ----

    /// Add the builds of `other` that are not here yet.
    ///
    /// Returns the added and the ignored tags.
    pub fn merge(&mut self, other: &BuildDb) -> (BTreeSet<String>, BTreeSet<String>) {
        let mut added = BTreeSet::new();
        let mut ignored = BTreeSet::new();
        for (tag, build) in other.builds() {
            if self.has_build_tag(tag) {
                ignored.insert(tag.clone());
                continue;
            }
            self.builds_mut().insert(tag.clone(), build.clone());
            added.insert(tag.clone());
        }
        (added, ignored)
    }

    /// Layer the builds of another file on top of this database, read-only.
    pub fn overlay(&mut self, path: &Path, opts: LoadOptions) -> DbResult<()> {
        let other = BuildDb::load(path, LoadOptions { keep_lock: false, ..opts })?;
        let (added, ignored) = self.merge(&other);
        if !ignored.is_empty() {
            let own = self
                .doc
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "the build database".to_string());
            tracing::warn!(
                "the following build tags in {} were ignored since they already exist in {}: {}",
                path.display(),
                own,
                ignored.iter().cloned().collect::<Vec<_>>().join(" ")
            );
        }
        let overlay = &mut self.doc.data_mut().overlay;
        overlay.files.push(path.to_path_buf());
        let idx = overlay.files.len() - 1;
        for tag in added {
            overlay.owners.insert(tag, idx);
        }
        Ok(())
    }

    pub fn tag_is_overlayed(&self, tag: &str) -> bool {
        self.doc.data().overlay.owners.contains_key(tag)
    }

    /// File that owns `tag`: an overlay file or the primary database file.
    pub fn filename_from_tag(&self, tag: &str) -> Option<&Path> {
        let overlay = &self.doc.data().overlay;
        match overlay.owners.get(tag) {
            Some(&idx) => overlay.files.get(idx).map(PathBuf::as_path),
            None => self.doc.path(),
        }
    }

    pub fn dirname_from_tag(&self, tag: &str) -> Option<&Path> {
        self.filename_from_tag(tag).and_then(Path::parent)
    }

    pub fn overlay_mode(&self) -> bool {
        !self.doc.data().overlay.suspended
    }

    /// Switch overlay mode. While off, overlaid builds can be changed and
    /// appear in the JSON output, and [`BuildDb::save`] refuses to write.
    pub fn set_overlay_mode(&mut self, on: bool) {
        self.doc.data_mut().overlay.suspended = !on;
    }
}

/// Tags reachable from `start` through `step`, without `start` itself.
fn closure<F>(start: &str, step: F) -> BTreeSet<String>
where
    F: Fn(&str) -> BTreeSet<String>,
{
    let mut seen = BTreeSet::new();
    let mut queue = vec![start.to_string()];
    while let Some(tag) = queue.pop() {
        for next in step(&tag) {
            if next != start && seen.insert(next.clone()) {
                queue.push(next);
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_builds, BUILDS_JSON, OVERLAY_BUILDS_JSON};
    use std::fs;
    use tempfile::TempDir;

    fn specs(items: &[&str]) -> SpecList {
        SpecList::parse_all(items).unwrap()
    }

    #[test]
    fn test_roundtrip_is_byte_identical() {
        assert_eq!(sample_builds().to_json_string().unwrap(), BUILDS_JSON);
    }

    #[test]
    fn test_check_by_module_specs_scenario() {
        let db = BuildDb::from_json_str(
            r#"{"MYAPP-001": {"state": "testing", "modules": {"ALARM": "R3-7", "MCAN": "R2-6"}}}"#,
            "inline",
        )
        .unwrap();
        let results = db.check_by_module_specs(&specs(&["MCAN", "ALARM:R3-7"]));
        let r = &results["MYAPP-001"];
        assert_eq!((r.matched, r.wrong_version, r.missing), (2, 0, 0));
        assert_eq!(r.modules["ALARM"].flag, MatchFlag::Exact);
        assert_eq!(r.modules["MCAN"].flag, MatchFlag::Compatible);
        assert_eq!(r.modules["MCAN"].rendered, "MCAN:R2-6");
    }

    #[test]
    fn test_check_by_module_specs_flags() {
        let db = sample_builds();
        let results = db.check_by_module_specs(&specs(&["ALARM:R3-8", "MYAPP", "GHOST"]));

        let first = &results["MYAPP-001"];
        assert_eq!((first.matched, first.wrong_version, first.missing), (0, 1, 2));
        assert_eq!(first.modules["ALARM"].flag.as_str(), "!=");
        assert_eq!(first.modules["GHOST"].rendered, "GHOST");

        let second = &results["MYAPP-002"];
        assert_eq!((second.matched, second.wrong_version, second.missing), (2, 0, 1));

        let none = db.check_by_module_specs(&specs(&["GHOST"]));
        assert!(none.is_empty());
    }

    #[test]
    fn test_states() {
        let mut db = sample_builds();
        assert_eq!(db.state("MYAPP-001").unwrap(), BuildState::Testing);
        assert!(db.is_testing_or_stable("MYAPP-001").unwrap());
        assert!(db.is_stable("MYAPP-002").unwrap());

        db.change_state("MYAPP-001", BuildState::Disabled).unwrap();
        assert!(db.is_disabled("MYAPP-001").unwrap());
        assert!(db.new_build("NEW-001", BuildState::Disabled).is_err());
        assert!(db.new_build("MYAPP-001", BuildState::Unstable).is_err());
        assert!(matches!(db.state("NOPE"), Err(DbError::NotFound(_))));
        assert!("bogus".parse::<BuildState>().is_err());
        assert_eq!("broken".parse::<BuildState>().unwrap(), BuildState::Broken);
    }

    #[test]
    fn test_new_build_and_modules() {
        let mut db = sample_builds();
        db.new_build("MYAPP-003", BuildState::Unstable).unwrap();
        db.add_module("MYAPP-003", "MYAPP-003", "ALARM", "R3-8").unwrap();
        db.add_module("MYAPP-003", "MYAPP-001", "MCAN", "R2-6").unwrap();

        assert_eq!(db.module_specs("MYAPP-003").unwrap(), vec!["ALARM:R3-8", "MCAN:R2-6"]);
        assert_eq!(db.module_link("MYAPP-003", "MCAN").unwrap(), Some("MYAPP-001"));
        assert_eq!(db.module_link("MYAPP-003", "ALARM").unwrap(), None);
        assert!(!db.is_fully_linked("MYAPP-003").unwrap());
        assert!(db.is_linked_to("MYAPP-003", "MYAPP-001").unwrap());
        assert_eq!(db.module_version("MYAPP-003", "ALARM").unwrap(), Some("R3-8"));
        assert!(db.has_module("MYAPP-003", "MCAN").unwrap());

        db.delete("MYAPP-003").unwrap();
        assert!(!db.has_build_tag("MYAPP-003"));
        assert!(db.delete("MYAPP-003").is_err());
    }

    #[test]
    fn test_empty_new_build_serializes_modules() {
        let mut db = BuildDb::new();
        db.new_build("X-001", BuildState::Testing).unwrap();
        assert_eq!(
            db.to_json_string().unwrap(),
            "{\n    \"X-001\": {\n        \"modules\": {},\n        \"state\": \"testing\"\n    }\n}\n"
        );
    }

    #[test]
    fn test_generate_buildtag_with_huge_numbers() {
        let mut db = BuildDb::new();
        db.new_build("X-4294967295", BuildState::Testing).unwrap();
        assert_eq!(db.generate_buildtag("X").unwrap(), "X-4294967296");

        db.new_build("X-18446744073709551615", BuildState::Testing).unwrap();
        assert!(matches!(db.generate_buildtag("X"), Err(DbError::Spec(_))));
    }

    #[test]
    fn test_generate_buildtag() {
        let mut db = sample_builds();
        assert_eq!(db.generate_buildtag("MYAPP").unwrap(), "MYAPP-003");
        assert_eq!(db.generate_buildtag("OTHER").unwrap(), "OTHER-001");
        db.new_build("MYAPP-abc", BuildState::Testing).unwrap();
        assert_eq!(db.generate_buildtag("MYAPP").unwrap(), "MYAPP-003");
        assert!(BuildDb::is_generated_buildtag("AUTO-004"));
        assert!(!BuildDb::is_generated_buildtag("MYAPP-004"));
    }

    #[test]
    fn test_linkage() {
        let mut db = sample_builds();
        db.add_module("MYAPP-003", "MYAPP-002", "MYAPP", "R1-0").unwrap();

        assert_eq!(db.linked_builds("MYAPP-001"), ["MYAPP-002".to_string()].into_iter().collect());
        assert_eq!(
            db.rec_linked_builds("MYAPP-003").unwrap(),
            ["MYAPP-001".to_string(), "MYAPP-002".to_string()].into_iter().collect()
        );
        assert_eq!(
            db.rec_dependent_builds("MYAPP-001").unwrap(),
            ["MYAPP-002".to_string(), "MYAPP-003".to_string()].into_iter().collect()
        );
        assert!(db.is_fully_linked("MYAPP-003").unwrap());

        let tags: Vec<String> = vec!["MYAPP-003".into(), "MYAPP-001".into(), "MYAPP-002".into()];
        let order = db.sort_by_linkage(&tags, false).unwrap();
        assert!(order.cycle.is_none());
        assert_eq!(order.order, vec!["MYAPP-001", "MYAPP-002", "MYAPP-003"]);
        let order = db.sort_by_linkage(&tags, true).unwrap();
        assert_eq!(order.order, vec!["MYAPP-003", "MYAPP-002", "MYAPP-001"]);
    }

    #[test]
    fn test_linkage_cycle_terminates() {
        let mut db = sample_builds();
        db.add_module("MYAPP-001", "MYAPP-002", "MYAPP", "R1-0").unwrap();
        let tags: Vec<String> = vec!["MYAPP-001".into(), "MYAPP-002".into()];
        let order = db.sort_by_linkage(&tags, false).unwrap();
        assert_eq!(order.order.len(), 2);
        assert!(order.cycle.is_some());
    }

    #[test]
    fn test_filter_and_merge() {
        let db = sample_builds();
        let filtered = db.filter_by_specs(&specs(&["ALARM:+R3-8"]));
        assert_eq!(filtered.iter_builds().collect::<Vec<_>>(), vec!["MYAPP-002"]);

        let mut other = BuildDb::new();
        other.new_build("MYAPP-001", BuildState::Unstable).unwrap();
        other.new_build("ZZZ-001", BuildState::Unstable).unwrap();
        let mut merged = sample_builds();
        let (added, ignored) = merged.merge(&other);
        assert_eq!(added.into_iter().collect::<Vec<_>>(), vec!["ZZZ-001"]);
        assert_eq!(ignored.into_iter().collect::<Vec<_>>(), vec!["MYAPP-001"]);
        assert_eq!(merged.state("MYAPP-001").unwrap(), BuildState::Testing);
    }

    #[test]
    fn test_linked_module_must_exist() {
        let text = r#"{"B-001": {"state": "stable", "modules": {}, "linked": {"A": "A-001"}}}"#;
        let err = BuildDb::from_json_str(text, "inline").unwrap_err();
        assert!(matches!(err, DbError::Invalid { kind: "build", .. }));
    }

    #[test]
    fn test_overlay_is_read_only_and_not_saved() {
        let tmp = TempDir::new().unwrap();
        let primary = tmp.path().join("BUILDS.DB");
        let shared = tmp.path().join("SHARED.DB");
        fs::write(&primary, BUILDS_JSON).unwrap();
        fs::write(&shared, OVERLAY_BUILDS_JSON).unwrap();

        let mut db = BuildDb::load(&primary, LoadOptions::edit(0)).unwrap();
        db.overlay(&shared, LoadOptions::read(0)).unwrap();

        assert!(db.tag_is_overlayed("SHARED-001"));
        assert_eq!(db.filename_from_tag("SHARED-001"), Some(shared.as_path()));
        assert_eq!(db.filename_from_tag("MYAPP-001"), Some(primary.as_path()));
        assert_eq!(db.dirname_from_tag("SHARED-001"), Some(tmp.path()));
        assert!(db.check_by_module_specs(&specs(&["ALARM:R3-7"])).contains_key("SHARED-001"));

        assert!(matches!(db.delete("SHARED-001"), Err(DbError::ReadOnly { .. })));
        assert!(matches!(
            db.change_state("SHARED-001", BuildState::Broken),
            Err(DbError::ReadOnly { .. })
        ));
        assert!(!db.to_json_string().unwrap().contains("SHARED-001"));

        db.set_overlay_mode(false);
        assert!(db.to_json_string().unwrap().contains("SHARED-001"));
        db.change_state("SHARED-001", BuildState::Broken).unwrap();
        assert!(db.save(None, false).is_err());

        db.set_overlay_mode(true);
        db.change_state("MYAPP-001", BuildState::Stable).unwrap();
        db.save(None, false).unwrap();
        let saved = fs::read_to_string(&primary).unwrap();
        assert!(!saved.contains("SHARED-001"));
        assert_eq!(fs::read_to_string(&shared).unwrap(), OVERLAY_BUILDS_JSON);
    }

    #[test]
    fn test_overlay_ignores_existing_tags() {
        let tmp = TempDir::new().unwrap();
        let shared = tmp.path().join("SHARED.DB");
        fs::write(&shared, BUILDS_JSON).unwrap();

        let mut db = sample_builds();
        db.change_state("MYAPP-001", BuildState::Broken).unwrap();
        db.overlay(&shared, LoadOptions::unlocked()).unwrap();
        assert!(!db.tag_is_overlayed("MYAPP-001"));
        assert_eq!(db.state("MYAPP-001").unwrap(), BuildState::Broken);
    }
}
