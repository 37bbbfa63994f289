//! Completing a spec list over the dependency graph.

use std::collections::BTreeSet;

use crate::core::spec_list::SpecList;
use crate::db::deps::{DependencyDb, SetsDict};
use crate::util::errors::DbResult;

/// A spec list resolved to candidate versions, closed over dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    /// Candidate versions for every module, requested or pulled in.
    pub sets: SetsDict,
    /// Modules that were not requested but are needed.
    pub added: BTreeSet<String>,
}

impl Completion {
    /// True if every module has exactly one candidate.
    pub fn is_exact(&self) -> bool {
        self.sets.values().all(|versions| versions.len() == 1)
    }

    /// Modules with more than one candidate version.
    pub fn ambiguous(&self) -> Vec<&str> {
        self.sets
            .iter()
            .filter(|(_, versions)| versions.len() > 1)
            .map(|(module, _)| module.as_str())
            .collect()
    }
}

/// Resolve `specs` against `db` and add every missing dependency.
pub fn complete_specs(db: &DependencyDb, specs: &SpecList) -> DbResult<Completion> {
    let mut sets = db.sets_dict(specs)?;
    let added = db.complete_sets_dict(&mut sets)?;
    if !added.is_empty() {
        tracing::debug!(
            "completed with {}",
            added.iter().cloned().collect::<Vec<_>>().join(" ")
        );
    }
    Ok(Completion { sets, added })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_deps;
    use crate::util::errors::DbError;

    #[test]
    fn test_complete_pulls_in_dependencies() {
        let db = sample_deps();
        let specs = SpecList::parse_all(&["MYAPP:R1-0"]).unwrap();
        let completion = complete_specs(&db, &specs).unwrap();

        assert_eq!(
            completion.added,
            ["ALARM".to_string(), "MCAN".to_string()].into_iter().collect()
        );
        assert_eq!(completion.sets["ALARM"].len(), 2);
        assert!(!completion.is_exact());
        assert_eq!(completion.ambiguous(), vec!["ALARM"]);
    }

    #[test]
    fn test_complete_exact() {
        let db = sample_deps();
        let specs = SpecList::parse_all(&["MYAPP:R1-0", "ALARM:R3-7"]).unwrap();
        let completion = complete_specs(&db, &specs).unwrap();
        assert!(completion.is_exact());
        assert_eq!(completion.added.len(), 1);
    }

    #[test]
    fn test_unknown_module() {
        let db = sample_deps();
        let specs = SpecList::parse_all(&["GHOST"]).unwrap();
        assert!(matches!(complete_specs(&db, &specs), Err(DbError::NotFound(_))));
    }
}
