//! Registering a new build from a list of module specs.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use tracing::info;

use crate::core::spec_list::SpecList;
use crate::db::builds::{BuildDb, BuildState};
use crate::db::deps::DependencyDb;
use crate::resolver::closure::complete_specs;

/// Options for [`register_build`].
#[derive(Debug, Clone)]
pub struct RegisterOptions {
    /// Stem of the generated tag, `STEM-NNN`.
    pub stem: String,
    /// Use this tag instead of generating one.
    pub tag: Option<String>,
    pub state: BuildState,
    /// Link modules to existing builds that already provide them.
    pub reuse: bool,
}

impl RegisterOptions {
    pub fn new(stem: impl Into<String>) -> Self {
        RegisterOptions {
            stem: stem.into(),
            tag: None,
            state: BuildState::Unstable,
            reuse: true,
        }
    }
}

/// Outcome of [`register_build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registered {
    pub tag: String,
    /// False if an existing build already had exactly these modules.
    pub created: bool,
    pub modules: BTreeMap<String, String>,
    /// Modules taken from other builds, with the build they come from.
    pub linked: BTreeMap<String, String>,
}

/// Add a build for `specs` to `builds`.
///
/// The specs are closed over the dependencies in `deps` and must then
/// name exactly one version of every module.
pub fn register_build(
    deps: &DependencyDb,
    builds: &mut BuildDb,
    specs: &SpecList,
    opts: &RegisterOptions,
) -> Result<Registered> {
    let completion = complete_specs(deps, specs)?;
    if !completion.is_exact() {
        let ambiguous: Vec<String> = completion
            .ambiguous()
            .into_iter()
            .map(|m| {
                let versions: Vec<&str> =
                    completion.sets.get(m).into_iter().flatten().map(String::as_str).collect();
                format!("{} ({})", m, versions.join(", "))
            })
            .collect();
        bail!(
            "module specs are not exact, choose one version for: {}",
            ambiguous.join("; ")
        );
    }
    let modules: BTreeMap<String, String> = completion
        .sets
        .iter()
        .filter_map(|(m, versions)| versions.iter().next().map(|v| (m.clone(), v.clone())))
        .collect();
    deps.assert_complete_modulelist(&modules)?;

    if let Some(existing) = identical_build(builds, &modules)? {
        info!("build {} already has these modules", existing);
        return Ok(Registered {
            tag: existing,
            created: false,
            modules,
            linked: BTreeMap::new(),
        });
    }

    let tag = match &opts.tag {
        Some(tag) => tag.clone(),
        None => builds.generate_buildtag(&opts.stem)?,
    };
    builds.new_build(&tag, opts.state)?;

    let mut linked = BTreeMap::new();
    for (module, version) in &modules {
        let provider = if opts.reuse {
            provider_for(deps, builds, &modules, module, version)?
        } else {
            None
        };
        let module_tag = provider.as_deref().unwrap_or(&tag);
        builds.add_module(&tag, module_tag, module, version)?;
        if let Some(provider) = provider {
            linked.insert(module.clone(), provider);
        }
    }
    info!("registered build {}", tag);
    Ok(Registered {
        tag,
        created: true,
        modules,
        linked,
    })
}

/// A usable build whose module set equals `modules`.
fn identical_build(builds: &BuildDb, modules: &BTreeMap<String, String>) -> Result<Option<String>> {
    for tag in builds.iter_builds() {
        if builds.is_disabled(tag)? {
            continue;
        }
        if builds.modules(tag)? == modules {
            return Ok(Some(tag.to_string()));
        }
    }
    Ok(None)
}

/// A testing or stable build that has `module:version` built against the
/// same dependency versions as `modules`.
fn provider_for(
    deps: &DependencyDb,
    builds: &BuildDb,
    modules: &BTreeMap<String, String>,
    module: &str,
    version: &str,
) -> Result<Option<String>> {
    'builds: for tag in builds.iter_builds() {
        if !builds.is_testing_or_stable(tag)? {
            continue;
        }
        if builds.module_version(tag, module)? != Some(version) {
            continue;
        }
        for dep in deps.iter_dependencies(module, version)? {
            if builds.module_version(tag, dep)? != modules.get(dep).map(String::as_str) {
                continue 'builds;
            }
        }
        // Link to the build that really holds the module.
        let owner = builds.module_link(tag, module)?.unwrap_or(tag);
        return Ok(Some(owner.to_string()));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_builds, sample_deps};

    fn specs(items: &[&str]) -> SpecList {
        SpecList::parse_all(items).unwrap()
    }

    #[test]
    fn test_register_links_existing_modules() {
        let deps = sample_deps();
        let mut builds = sample_builds();
        let done = register_build(
            &deps,
            &mut builds,
            &specs(&["MYAPP:R1-0", "ALARM:R3-7"]),
            &RegisterOptions::new("MYAPP"),
        )
        .unwrap();

        assert!(done.created);
        assert_eq!(done.tag, "MYAPP-003");
        assert_eq!(done.modules.len(), 3);
        assert_eq!(done.linked.get("ALARM").map(String::as_str), Some("MYAPP-001"));
        assert_eq!(done.linked.get("MCAN").map(String::as_str), Some("MYAPP-001"));
        assert!(!done.linked.contains_key("MYAPP"));
        assert_eq!(builds.state("MYAPP-003").unwrap(), BuildState::Unstable);
        assert_eq!(
            builds.module_link("MYAPP-003", "MCAN").unwrap(),
            Some("MYAPP-001")
        );
    }

    #[test]
    fn test_register_without_reuse() {
        let deps = sample_deps();
        let mut builds = sample_builds();
        let opts = RegisterOptions {
            reuse: false,
            tag: Some("CUSTOM".into()),
            ..RegisterOptions::new("MYAPP")
        };
        let done =
            register_build(&deps, &mut builds, &specs(&["MYAPP:R1-0", "ALARM:R3-7"]), &opts).unwrap();
        assert_eq!(done.tag, "CUSTOM");
        assert!(done.linked.is_empty());
        assert!(builds.linked_to("CUSTOM").unwrap().is_empty());
    }

    #[test]
    fn test_ambiguous_specs_rejected() {
        let deps = sample_deps();
        let mut builds = sample_builds();
        let err = register_build(&deps, &mut builds, &specs(&["MYAPP:R1-0"]), &RegisterOptions::new("X"))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ALARM (R3-7, R3-8)"), "{msg}");
        assert!(!builds.has_build_tag("X-001"));
    }

    #[test]
    fn test_identical_build_is_reused() {
        let deps = sample_deps();
        let mut builds = sample_builds();
        let done = register_build(
            &deps,
            &mut builds,
            &specs(&["MYAPP:R1-0", "ALARM:R3-8", "MCAN:R2-6"]),
            &RegisterOptions::new("MYAPP"),
        )
        .unwrap();
        assert!(!done.created);
        assert_eq!(done.tag, "MYAPP-002");
    }
}
