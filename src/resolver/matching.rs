//! Ranking of build match results.

use std::collections::BTreeMap;

use crate::db::builds::MatchResult;

/// One ranked build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedBuild<'a> {
    pub tag: &'a str,
    pub result: &'a MatchResult,
}

/// Best matches first: most matched modules, then fewest wrong versions,
/// then fewest missing modules, then by tag.
pub fn rank(results: &BTreeMap<String, MatchResult>) -> Vec<RankedBuild<'_>> {
    let mut ranked: Vec<RankedBuild<'_>> = results
        .iter()
        .map(|(tag, result)| RankedBuild { tag, result })
        .collect();
    ranked.sort_by(|a, b| {
        b.result
            .matched
            .cmp(&a.result.matched)
            .then(a.result.wrong_version.cmp(&b.result.wrong_version))
            .then(a.result.missing.cmp(&b.result.missing))
            .then(a.tag.cmp(b.tag))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(matched: usize, wrong_version: usize, missing: usize) -> MatchResult {
        MatchResult {
            matched,
            wrong_version,
            missing,
            modules: BTreeMap::new(),
        }
    }

    #[test]
    fn test_rank_order() {
        let mut results = BTreeMap::new();
        results.insert("C-001".to_string(), result(2, 1, 0));
        results.insert("B-001".to_string(), result(2, 0, 1));
        results.insert("A-001".to_string(), result(1, 0, 0));
        results.insert("A-002".to_string(), result(2, 0, 1));

        let tags: Vec<&str> = rank(&results).into_iter().map(|r| r.tag).collect();
        assert_eq!(tags, vec!["A-002", "B-001", "C-001", "A-001"]);
    }
}
