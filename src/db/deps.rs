//! The dependency database.
//!
//! Maps `module -> version -> VersionRecord`. A record names where the
//! version's source comes from and which other modules it needs; the
//! versions of those modules are not fixed here but chosen when a set of
//! specs is completed against the database.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::source_spec::SourceSpec;
use crate::core::spec::{compare_versions, VersionFlag};
use crate::core::spec_list::SpecList;
use crate::core::version::VersionKey;
use crate::db::document::{Document, DocumentData, LoadOptions};
use crate::resolver::order::{settle_levels, CycleWarning};
use crate::util::errors::{DbError, DbResult};

/// RELEASE file used when a record does not name one.
pub const DEFAULT_RELEASE_FILE: &str = "configure/RELEASE";

/// A `(module, version)` pair.
pub type ModuleVersion = (String, String);

/// Candidate versions per module.
pub type SetsDict = BTreeMap<String, BTreeSet<String>>;

/// Everything known about one version of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionRecord {
    pub source: SourceSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<BTreeSet<String>>,
    /// Dependency module name -> name used in the RELEASE file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
    #[serde(
        default,
        rename = "make-recipes",
        skip_serializing_if = "Option::is_none"
    )]
    pub make_recipes: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub releasefile: Option<String>,
}

impl VersionRecord {
    pub fn new(source: SourceSpec) -> Self {
        VersionRecord {
            source,
            dependencies: None,
            aliases: None,
            extra: None,
            weight: None,
            make_recipes: None,
            releasefile: None,
        }
    }

    fn merge_from(&mut self, other: &VersionRecord, context: &str) -> DbResult<()> {
        if let Some(theirs) = &other.aliases {
            merge_dict(
                self.aliases.get_or_insert_with(BTreeMap::new),
                theirs,
                &format!("{} aliases", context),
            )?;
        }
        if let Some(theirs) = &other.dependencies {
            match &self.dependencies {
                None => self.dependencies = Some(theirs.clone()),
                Some(ours) if ours != theirs => {
                    return Err(DbError::conflict(
                        format!("{} dependencies", context),
                        ours,
                        theirs,
                    ))
                }
                Some(_) => {}
            }
        }
        if let Some(theirs) = &other.extra {
            let ours = self.extra.get_or_insert_with(Vec::new);
            for line in theirs {
                if !ours.contains(line) {
                    ours.push(line.clone());
                }
            }
        }
        if let Some(theirs) = &other.make_recipes {
            merge_dict(
                self.make_recipes.get_or_insert_with(BTreeMap::new),
                theirs,
                &format!("{} make-recipes", context),
            )?;
        }
        if let Some(theirs) = &other.releasefile {
            match &self.releasefile {
                None => self.releasefile = Some(theirs.clone()),
                Some(ours) if ours != theirs => {
                    return Err(DbError::conflict(
                        format!("{} releasefile", context),
                        ours,
                        theirs,
                    ))
                }
                Some(_) => {}
            }
        }
        if self.source != other.source {
            return Err(DbError::conflict(
                format!("{} source", context),
                self.source.to_deps_value(),
                other.source.to_deps_value(),
            ));
        }
        if other.weight.is_some() {
            self.weight = other.weight;
        }
        Ok(())
    }
}

fn merge_dict<V>(ours: &mut BTreeMap<String, V>, theirs: &BTreeMap<String, V>, context: &str) -> DbResult<()>
where
    V: Clone + PartialEq + std::fmt::Debug,
{
    for (key, value) in theirs {
        match ours.get(key) {
            Some(existing) if existing != value => {
                return Err(DbError::conflict(format!("{} key {}", context, key), existing, value));
            }
            Some(_) => {}
            None => {
                ours.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(())
}

/// The persisted content of a dependency database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepsData {
    modules: BTreeMap<String, BTreeMap<String, VersionRecord>>,
}

impl DocumentData for DepsData {
    const KIND: &'static str = "dependency";

    fn selfcheck(&self, origin: &str) -> DbResult<()> {
        for (module, versions) in &self.modules {
            for (version, record) in versions {
                if record.source.url.is_empty() {
                    return Err(DbError::Invalid {
                        kind: Self::KIND,
                        message: format!("source data missing for {}:{}", module, version),
                        origin: origin.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Result of [`DependencyDb::sort_by_dependency`].
#[derive(Debug, Clone)]
pub struct Sorted {
    pub order: Vec<ModuleVersion>,
    /// Set when the ordering did not settle because of a cycle.
    pub cycle: Option<CycleWarning>,
}

/// A dependency database bound to its document.
#[derive(Debug, Default)]
pub struct DependencyDb {
    doc: Document<DepsData>,
}

impl DependencyDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path, opts: LoadOptions) -> DbResult<Self> {
        Ok(DependencyDb {
            doc: Document::load(path, opts)?,
        })
    }

    pub fn from_json_str(text: &str, origin: &str) -> DbResult<Self> {
        Ok(DependencyDb {
            doc: Document::from_json_str(text, origin)?,
        })
    }

    fn from_data(data: DepsData) -> Self {
        DependencyDb {
            doc: Document::new(data),
        }
    }

    pub fn document(&self) -> &Document<DepsData> {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document<DepsData> {
        &mut self.doc
    }

    pub fn save(&mut self, path: Option<&Path>, dry_run: bool) -> DbResult<()> {
        self.doc.save(path, dry_run)
    }

    pub fn to_json_string(&self) -> DbResult<String> {
        self.doc.to_json_string()
    }

    fn modules(&self) -> &BTreeMap<String, BTreeMap<String, VersionRecord>> {
        &self.doc.data().modules
    }

    fn modules_mut(&mut self) -> &mut BTreeMap<String, BTreeMap<String, VersionRecord>> {
        &mut self.doc.data_mut().modules
    }

    pub fn is_empty(&self) -> bool {
        self.modules().is_empty()
    }

    // ---- lookups ----

    pub fn iter_modulenames(&self) -> impl Iterator<Item = &str> {
        self.modules().keys().map(String::as_str)
    }

    pub fn iter_versions(&self, module: &str) -> DbResult<impl Iterator<Item = &str>> {
        Ok(self.module_versions(module)?.keys().map(String::as_str))
    }

    fn module_versions(&self, module: &str) -> DbResult<&BTreeMap<String, VersionRecord>> {
        self.modules().get(module).ok_or_else(|| {
            DbError::not_found(format!(
                "module '{}' not found in dependency database",
                module
            ))
        })
    }

    /// Versions of `module`, newest first.
    pub fn sorted_versions(&self, module: &str) -> DbResult<Vec<String>> {
        let mut versions: Vec<String> = self.iter_versions(module)?.map(str::to_string).collect();
        versions.sort_by_key(|v| std::cmp::Reverse(VersionKey::new(v)));
        Ok(versions)
    }

    pub fn record(&self, module: &str, version: &str) -> DbResult<&VersionRecord> {
        self.module_versions(module)?.get(version).ok_or_else(|| {
            DbError::not_found(format!(
                "module '{}:{}' not found in dependency database",
                module, version
            ))
        })
    }

    fn record_mut(&mut self, module: &str, version: &str) -> DbResult<&mut VersionRecord> {
        self.modules_mut()
            .get_mut(module)
            .and_then(|versions| versions.get_mut(version))
            .ok_or_else(|| {
                DbError::not_found(format!(
                    "module '{}:{}' not found in dependency database",
                    module, version
                ))
            })
    }

    /// Fail unless the module (and, if given, the version) is known.
    pub fn assert_module(&self, module: &str, version: Option<&str>) -> DbResult<()> {
        let versions = self
            .modules()
            .get(module)
            .ok_or_else(|| DbError::not_found(format!("no data for module '{}'", module)))?;
        if let Some(version) = version {
            if !versions.contains_key(version) {
                return Err(DbError::not_found(format!(
                    "version '{}' not found for module '{}'",
                    version, module
                )));
            }
        }
        Ok(())
    }

    pub fn dependencies_found(&self, module: &str, version: &str) -> DbResult<bool> {
        Ok(self.record(module, version)?.dependencies.is_some())
    }

    pub fn iter_dependencies(&self, module: &str, version: &str) -> DbResult<impl Iterator<Item = &str>> {
        Ok(self
            .record(module, version)?
            .dependencies
            .iter()
            .flatten()
            .map(String::as_str))
    }

    pub fn depends_on_module(&self, module: &str, version: &str, dependency: &str) -> DbResult<bool> {
        Ok(self
            .record(module, version)?
            .dependencies
            .as_ref()
            .is_some_and(|deps| deps.contains(dependency)))
    }

    /// Module to versions map, used for shell completion.
    pub fn module_versions_map(&self) -> BTreeMap<String, Vec<String>> {
        self.modules()
            .iter()
            .map(|(m, versions)| (m.clone(), versions.keys().cloned().collect()))
            .collect()
    }

    // ---- merging and import ----

    /// Merge `other` into this database.
    ///
    /// Either everything is merged or, on a conflict, nothing changes.
    pub fn merge(&mut self, other: &DependencyDb) -> DbResult<()> {
        let mut merged = self.doc.data().clone();
        for (module, versions) in other.modules() {
            let ours = merged.modules.entry(module.clone()).or_default();
            for (version, record) in versions {
                match ours.get_mut(version) {
                    None => {
                        ours.insert(version.clone(), record.clone());
                    }
                    Some(existing) => {
                        existing.merge_from(record, &format!("module {} version {}", module, version))?;
                    }
                }
            }
        }
        *self.doc.data_mut() = merged;
        Ok(())
    }

    /// Copy one version record from another database.
    pub fn import_module(&mut self, other: &DependencyDb, module: &str, version: &str) -> DbResult<()> {
        let record = other.record(module, version)?.clone();
        self.modules_mut()
            .entry(module.to_string())
            .or_default()
            .insert(version.to_string(), record);
        Ok(())
    }

    // ---- record edits ----

    /// Set or update the source of a version, creating the version if needed.
    ///
    /// Returns whether anything changed.
    pub fn set_source_spec(&mut self, module: &str, version: &str, source: &SourceSpec) -> bool {
        let versions = self.modules_mut().entry(module.to_string()).or_default();
        match versions.get_mut(version) {
            None => {
                versions.insert(version.to_string(), VersionRecord::new(source.clone()));
                true
            }
            Some(record) => record.source.change_source(source),
        }
    }

    pub fn set_source_spec_by_tag(&mut self, module: &str, version: &str, tag: &str) -> DbResult<bool> {
        let record = self.record_mut(module, version)?;
        record
            .source
            .change_source_by_tag(tag)
            .map_err(|e| DbError::spec(format!("'{}:{}' {}", module, version, e)))
    }

    pub fn add_dependency(&mut self, module: &str, version: &str, dependency: &str) -> DbResult<()> {
        self.record_mut(module, version)?
            .dependencies
            .get_or_insert_with(BTreeSet::new)
            .insert(dependency.to_string());
        Ok(())
    }

    /// Remove one dependency; the field goes away with the last one.
    pub fn remove_dependency(&mut self, module: &str, version: &str, dependency: &str) -> DbResult<()> {
        let record = self.record_mut(module, version)?;
        let Some(deps) = record.dependencies.as_mut() else {
            return Err(DbError::not_found(format!(
                "'{}:{}' has no dependencies",
                module, version
            )));
        };
        if !deps.remove(dependency) {
            return Err(DbError::not_found(format!(
                "'{}:{}' doesn't depend on {}",
                module, version, dependency
            )));
        }
        if deps.is_empty() {
            record.dependencies = None;
        }
        Ok(())
    }

    /// Name `real_name` as `alias` in the RELEASE file of module:version.
    pub fn add_alias(&mut self, module: &str, version: &str, alias: &str, real_name: &str) -> DbResult<()> {
        let aliases = self
            .record_mut(module, version)?
            .aliases
            .get_or_insert_with(BTreeMap::new);
        match aliases.get(real_name) {
            Some(existing) if existing == alias => Ok(()),
            Some(existing) => Err(DbError::conflict(
                format!("module {} version {} alias for {}", module, version, real_name),
                existing,
                alias,
            )),
            None => {
                aliases.insert(real_name.to_string(), alias.to_string());
                Ok(())
            }
        }
    }

    /// The alias of `dependency`, or the dependency name itself.
    pub fn get_alias<'a>(&'a self, module: &str, version: &str, dependency: &'a str) -> DbResult<&'a str> {
        Ok(self
            .record(module, version)?
            .aliases
            .as_ref()
            .and_then(|a| a.get(dependency))
            .map_or(dependency, String::as_str))
    }

    pub fn release_file_name(&self, module: &str, version: &str) -> DbResult<&str> {
        Ok(self
            .record(module, version)?
            .releasefile
            .as_deref()
            .unwrap_or(DEFAULT_RELEASE_FILE))
    }

    /// Set the RELEASE file name; blank or the default removes the entry.
    pub fn set_release_file_name(&mut self, module: &str, version: &str, name: &str) -> DbResult<()> {
        let record = self.record_mut(module, version)?;
        let name = name.trim();
        record.releasefile = if name.is_empty() || name == DEFAULT_RELEASE_FILE {
            None
        } else {
            Some(name.to_string())
        };
        Ok(())
    }

    pub fn extra(&self, module: &str, version: &str) -> DbResult<&[String]> {
        Ok(self.record(module, version)?.extra.as_deref().unwrap_or_default())
    }

    pub fn set_extra(&mut self, module: &str, version: &str, lines: Vec<String>) -> DbResult<()> {
        self.record_mut(module, version)?.extra = Some(lines);
        Ok(())
    }

    pub fn weight(&self, module: &str, version: &str) -> DbResult<i64> {
        Ok(self.record(module, version)?.weight.unwrap_or(0))
    }

    pub fn set_weight(&mut self, module: &str, version: &str, weight: i64) -> DbResult<()> {
        self.record_mut(module, version)?.weight = Some(weight);
        Ok(())
    }

    /// Define how the top level makefile builds this module.
    ///
    /// Without a target the module gets an empty recipe table, meaning it
    /// has no makefile. Empty `lines` remove the recipe for `target`.
    pub fn set_make_recipes(
        &mut self,
        module: &str,
        version: &str,
        target: Option<&str>,
        lines: &[String],
    ) -> DbResult<()> {
        let record = self.record_mut(module, version)?;
        let Some(target) = target else {
            record.make_recipes = Some(BTreeMap::new());
            return Ok(());
        };
        let recipes = record.make_recipes.get_or_insert_with(BTreeMap::new);
        if lines.is_empty() {
            recipes.remove(target);
        } else {
            recipes.insert(target.to_string(), lines.to_vec());
        }
        if recipes.is_empty() {
            record.make_recipes = None;
        }
        Ok(())
    }

    pub fn make_recipes(&self, module: &str, version: &str) -> DbResult<Option<&BTreeMap<String, Vec<String>>>> {
        Ok(self.record(module, version)?.make_recipes.as_ref())
    }

    // ---- structural edits ----

    /// Copy `version` of `module` to `new_version`, optionally dropping the old one.
    pub fn clone_version(&mut self, module: &str, version: &str, new_version: &str, replace: bool) -> DbResult<()> {
        let versions = self.modules_mut().get_mut(module).ok_or_else(|| {
            DbError::not_found(format!(
                "module with name '{}' not found in dependency database",
                module
            ))
        })?;
        if versions.contains_key(new_version) {
            return Err(DbError::spec(format!(
                "module {}: version {} already exists",
                module, new_version
            )));
        }
        let record = versions
            .get(version)
            .cloned()
            .ok_or_else(|| DbError::not_found(format!("version '{}' not found for module '{}'", version, module)))?;
        versions.insert(new_version.to_string(), record);
        if replace {
            versions.remove(version);
        }
        Ok(())
    }

    /// Create `new_module` from some or all versions of `old_module`.
    pub fn clone_module(&mut self, old_module: &str, new_module: &str, versions: &[String]) -> DbResult<()> {
        if self.modules().contains_key(new_module) {
            return Err(DbError::spec(format!("module '{}' already exists", new_module)));
        }
        let old = self.module_versions(old_module)?;
        let copied: BTreeMap<String, VersionRecord> = if versions.is_empty() {
            old.clone()
        } else {
            versions
                .iter()
                .map(|v| {
                    old.get(v).cloned().map(|r| (v.clone(), r)).ok_or_else(|| {
                        DbError::not_found(format!("version '{}' not found for module '{}'", v, old_module))
                    })
                })
                .collect::<DbResult<_>>()?
        };
        self.modules_mut().insert(new_module.to_string(), copied);
        Ok(())
    }

    /// Drop dependencies on modules this database does not know.
    pub fn remove_missing_deps(&mut self) {
        let known: BTreeSet<String> = self.modules().keys().cloned().collect();
        for versions in self.modules_mut().values_mut() {
            for record in versions.values_mut() {
                if let Some(deps) = record.dependencies.as_mut() {
                    deps.retain(|d| known.contains(d));
                    if deps.is_empty() {
                        record.dependencies = None;
                    }
                }
            }
        }
    }

    // ---- queries ----

    /// One message per dependency on an unknown module. Never fails.
    pub fn check(&self) -> Vec<String> {
        let mut messages = Vec::new();
        for (module, versions) in self.modules() {
            for (version, record) in versions {
                for dep in record.dependencies.iter().flatten() {
                    if let Err(e) = self.assert_module(dep, None) {
                        messages.push(format!("{}:{}: dependencies: {}", module, version, e));
                    }
                }
            }
        }
        messages
    }

    /// Versions whose module name or source URL matches `rx`.
    pub fn search_modules(&self, rx: &Regex) -> Vec<ModuleVersion> {
        let mut results = BTreeSet::new();
        for (module, versions) in self.modules() {
            let name_matches = rx.is_match(module);
            for (version, record) in versions {
                if name_matches || rx.is_match(&record.source.url) {
                    results.insert((module.clone(), version.clone()));
                }
            }
        }
        results.into_iter().collect()
    }

    /// Module to matching versions for every spec.
    pub fn sets_dict(&self, specs: &SpecList) -> DbResult<SetsDict> {
        let mut sets = SetsDict::new();
        for spec in specs {
            let matching: BTreeSet<String> = self
                .iter_versions(spec.module())?
                .filter(|v| spec.matches(v))
                .map(str::to_string)
                .collect();
            if matching.is_empty() {
                return Err(DbError::spec(format!(
                    "no data found in dependency database for module specification '{}'",
                    spec
                )));
            }
            sets.entry(spec.module().to_string()).or_default().extend(matching);
        }
        Ok(sets)
    }

    /// Add every missing dependency module with all of its versions.
    ///
    /// Returns the names of the modules that were added.
    pub fn complete_sets_dict(&self, sets: &mut SetsDict) -> DbResult<BTreeSet<String>> {
        let mut added = BTreeSet::new();
        let mut pending: Vec<String> = sets.keys().cloned().collect();
        while !pending.is_empty() {
            let mut next = Vec::new();
            for module in pending {
                let versions: Vec<String> = sets.get(&module).into_iter().flatten().cloned().collect();
                for version in versions {
                    for dep in self.iter_dependencies(&module, &version)? {
                        if sets.contains_key(dep) {
                            continue;
                        }
                        let all: BTreeSet<String> = self.iter_versions(dep)?.map(str::to_string).collect();
                        tracing::debug!("{}:{} pulls in {}", module, version, dep);
                        sets.insert(dep.to_string(), all);
                        added.insert(dep.to_string());
                        next.push(dep.to_string());
                    }
                }
            }
            pending = next;
        }
        Ok(added)
    }

    /// Fail if a module in `modules` depends on one that is not in it.
    pub fn assert_complete_modulelist(&self, modules: &BTreeMap<String, String>) -> DbResult<()> {
        let mut missing = BTreeSet::new();
        for (module, version) in modules {
            for dep in self.iter_dependencies(module, version)? {
                if !modules.contains_key(dep) {
                    missing.insert(dep.to_string());
                }
            }
        }
        if missing.is_empty() {
            return Ok(());
        }
        Err(DbError::not_found(format!(
            "set of modules is incomplete, these modules are missing: {}",
            missing.into_iter().collect::<Vec<_>>().join(" ")
        )))
    }

    /// New database with exactly the listed versions.
    pub fn partial_copy_by_list(&self, list: &[ModuleVersion]) -> DbResult<DependencyDb> {
        let mut data = DepsData::default();
        for (module, version) in list {
            let target = data.modules.entry(module.clone()).or_default();
            for (v, record) in self.module_versions(module)? {
                if compare_versions(Some(v.as_str()), Some(version.as_str()), Some(VersionFlag::Eq)) {
                    target.insert(v.clone(), record.clone());
                }
            }
        }
        Ok(Self::from_data(data))
    }

    /// New database with the versions each spec accepts.
    pub fn partial_copy_by_specs(&self, specs: &SpecList) -> DbResult<DependencyDb> {
        let mut data = DepsData::default();
        for spec in specs {
            let target = data.modules.entry(spec.module().to_string()).or_default();
            for (v, record) in self.module_versions(spec.module())? {
                if spec.matches(v) {
                    target.insert(v.clone(), record.clone());
                }
            }
        }
        Ok(Self::from_data(data))
    }

    // ---- orderings ----

    /// Smaller weights first; equal weights keep their input order.
    ///
    /// With `reverse` larger weights come first, still in input order.
    pub fn sort_by_weight(&self, items: &[ModuleVersion], reverse: bool) -> DbResult<Vec<ModuleVersion>> {
        let mut keyed: Vec<(i64, usize, &ModuleVersion)> = items
            .iter()
            .enumerate()
            .map(|(i, mv)| Ok((self.weight(&mv.0, &mv.1)?, i, mv)))
            .collect::<DbResult<_>>()?;
        if reverse {
            keyed.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        } else {
            keyed.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        }
        Ok(keyed.into_iter().map(|(_, _, mv)| mv.clone()).collect())
    }

    /// Order so that every item comes after the items it depends on.
    ///
    /// Only dependencies that are part of `items` count.
    pub fn sort_by_dependency(&self, items: &[ModuleVersion], reverse: bool) -> DbResult<Sorted> {
        let chosen: BTreeMap<&str, &str> = items.iter().map(|(m, v)| (m.as_str(), v.as_str())).collect();
        let mut edges: BTreeMap<ModuleVersion, BTreeSet<ModuleVersion>> = BTreeMap::new();
        for (module, version) in items {
            let deps = edges.entry((module.clone(), version.clone())).or_default();
            for dep in self.iter_dependencies(module, version)? {
                if let Some(dep_version) = chosen.get(dep) {
                    deps.insert((dep.to_string(), dep_version.to_string()));
                }
            }
        }

        let nodes: Vec<(ModuleVersion, i64)> = items
            .iter()
            .enumerate()
            .map(|(i, mv)| (mv.clone(), i as i64))
            .collect();
        let settled = settle_levels("dependency", &nodes, &edges, None, |(m, v): &ModuleVersion| {
            format!("{}:{}", m, v)
        });

        let mut order: Vec<ModuleVersion> = edges.into_keys().collect();
        order.sort_by(|a, b| settled.level(a).cmp(&settled.level(b)).then_with(|| a.cmp(b)));
        if reverse {
            order.reverse();
        }
        Ok(Sorted {
            order,
            cycle: settled.cycle,
        })
    }
}
