//! Ordered lists of module specs.
//!
//! A [`SpecList`] is built from strings that are either plain specs or
//! directives:
//!
//! - `:clear:` forgets everything collected so far,
//! - `:rm:MODULE` drops MODULE (a later plain spec brings it back at its
//!   old position),
//! - `:load:FILE` splices in the `"module"` list of a JSON file,
//! - `:build:TAG` splices in the exact specs of a build.
//!
//! A module mentioned twice keeps the position of its first mention and
//! the spec of its last one.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::core::spec::VersionSpec;
use crate::util::errors::{DbError, DbResult};
use crate::util::json;

/// Callback resolving a build tag into exact spec strings.
pub type BuildLookup<'a> = dyn FnMut(&str) -> DbResult<Vec<String>> + 'a;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecList {
    specs: Vec<VersionSpec>,
}

#[derive(Deserialize)]
struct ModuleFile {
    #[serde(default)]
    module: Option<Vec<String>>,
}

struct Slot {
    position: usize,
    spec: Option<VersionSpec>,
}

impl SpecList {
    pub fn new(specs: Vec<VersionSpec>) -> Self {
        SpecList { specs }
    }

    /// Build a list from spec strings and directives.
    pub fn from_strings<S: AsRef<str>>(items: &[S], lookup: &mut BuildLookup<'_>) -> DbResult<Self> {
        let mut slots: HashMap<String, Slot> = HashMap::new();
        let mut next = 0usize;
        collect(&mut slots, &mut next, items, lookup)?;

        let mut ordered: Vec<Slot> = slots.into_values().collect();
        ordered.sort_by_key(|s| s.position);
        Ok(SpecList {
            specs: ordered.into_iter().filter_map(|s| s.spec).collect(),
        })
    }

    /// Like [`SpecList::from_strings`] for input without `:build:`.
    pub fn parse_all<S: AsRef<str>>(items: &[S]) -> DbResult<Self> {
        Self::from_strings(items, &mut |tag: &str| -> DbResult<Vec<String>> {
            Err(DbError::spec(format!(
                ":build:{} cannot be used here, no build database loaded",
                tag
            )))
        })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VersionSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn push(&mut self, spec: VersionSpec) {
        self.specs.push(spec);
    }

    /// A copy sorted by module name.
    pub fn sorted(&self) -> SpecList {
        let mut specs = self.specs.clone();
        specs.sort_by(|a, b| a.module().cmp(b.module()));
        SpecList { specs }
    }

    pub fn assert_exact(&self) -> DbResult<()> {
        for spec in &self.specs {
            if !spec.is_exact() {
                return Err(DbError::spec(format!(
                    "error at specification '{}', all module specifications must be exact",
                    spec
                )));
            }
        }
        Ok(())
    }

    pub fn assert_unique(&self) -> DbResult<()> {
        let mut seen = BTreeSet::new();
        for spec in &self.specs {
            if !seen.insert(spec.module()) {
                return Err(DbError::spec(format!(
                    "error, module '{}' is mentioned twice in module specifications",
                    spec.module()
                )));
            }
        }
        Ok(())
    }

    /// Module to version map of an exact, unique list.
    pub fn to_version_map(&self) -> DbResult<BTreeMap<String, String>> {
        self.assert_exact()?;
        self.assert_unique()?;
        Ok(self
            .specs
            .iter()
            .filter_map(|s| Some((s.module().to_string(), s.version()?.to_string())))
            .collect())
    }

    /// Sorted spec strings.
    pub fn to_string_list(&self) -> Vec<String> {
        let mut list: Vec<String> = self.specs.iter().map(ToString::to_string).collect();
        list.sort();
        list
    }

    pub fn module_set(&self) -> BTreeSet<String> {
        self.specs.iter().map(|s| s.module().to_string()).collect()
    }
}

impl<'a> IntoIterator for &'a SpecList {
    type Item = &'a VersionSpec;
    type IntoIter = std::slice::Iter<'a, VersionSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.specs.iter()
    }
}

impl FromIterator<VersionSpec> for SpecList {
    fn from_iter<I: IntoIterator<Item = VersionSpec>>(iter: I) -> Self {
        SpecList {
            specs: iter.into_iter().collect(),
        }
    }
}

fn directive_argument<'a>(parts: &[&'a str], name: &str) -> DbResult<&'a str> {
    match parts.get(1) {
        Some(arg) if !arg.is_empty() => Ok(arg),
        _ => Err(DbError::spec(format!("argument to :{}: missing", name))),
    }
}

fn collect<S: AsRef<str>>(
    slots: &mut HashMap<String, Slot>,
    next: &mut usize,
    items: &[S],
    lookup: &mut BuildLookup<'_>,
) -> DbResult<()> {
    for item in items {
        let item = item.as_ref();
        if let Some(directive) = item.strip_prefix(':') {
            let parts: Vec<&str> = directive.split(':').collect();
            match parts[0] {
                "clear" => slots.clear(),
                "rm" => {
                    let module = directive_argument(&parts, "rm")?;
                    if let Some(slot) = slots.get_mut(module) {
                        slot.spec = None;
                    }
                }
                "load" => {
                    let file = directive_argument(&parts, "load")?;
                    let data: ModuleFile = json::load_file(Path::new(file), "module list")?;
                    if let Some(specs) = data.module {
                        collect(slots, next, &specs, lookup)?;
                    }
                }
                "build" => {
                    let tag = directive_argument(&parts, "build")?;
                    let specs = lookup(tag)?;
                    collect(slots, next, &specs, lookup)?;
                }
                _ => return Err(DbError::spec(format!("unexpected spec: {}", item))),
            }
            continue;
        }

        let spec = VersionSpec::parse(item)?;
        match slots.get_mut(spec.module()) {
            Some(slot) => slot.spec = Some(spec),
            None => {
                slots.insert(
                    spec.module().to_string(),
                    Slot {
                        position: *next,
                        spec: Some(spec),
                    },
                );
                *next += 1;
            }
        }
    }
    Ok(())
}
