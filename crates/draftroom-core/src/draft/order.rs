// Draft order construction for round 1.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::DraftError;

/// How the round 1 order is decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftOrderMode {
    /// Uniform shuffle of the league's teams.
    #[default]
    Random,
    /// The commissioner's configured order, verbatim.
    Manual,
    /// Reverse of the prior season's final standings.
    Standings,
}

/// Build the round 1 order. Every team appears exactly once.
///
/// - `manual_order` is only read in `Manual` mode and must be a permutation
///   of `team_ids`.
/// - `standings` is only read in `Standings` mode: prior-season finish, best
///   first. The worst team picks first. Teams with no prior season pick
///   ahead of everyone, in `team_ids` order.
/// - `seed` makes `Random` deterministic.
pub fn build_order(
    team_ids: &[String],
    mode: DraftOrderMode,
    manual_order: &[String],
    standings: &[String],
    seed: Option<u64>,
) -> Result<Vec<String>, DraftError> {
    if team_ids.is_empty() {
        return Err(DraftError::InvalidConfiguration(
            "league has no teams".into(),
        ));
    }
    let teams = unique_set(team_ids, "team list")?;

    match mode {
        DraftOrderMode::Random => {
            let mut order = team_ids.to_vec();
            let mut rng = match seed {
                Some(s) => StdRng::seed_from_u64(s),
                None => StdRng::from_entropy(),
            };
            fisher_yates(&mut order, &mut rng);
            Ok(order)
        }
        DraftOrderMode::Manual => {
            let manual = unique_set(manual_order, "manual order")?;
            if manual != teams {
                let missing: Vec<&str> = teams.difference(&manual).copied().collect();
                let unknown: Vec<&str> = manual.difference(&teams).copied().collect();
                return Err(DraftError::InvalidConfiguration(format!(
                    "manual order must list every team once (missing: {missing:?}, unknown: {unknown:?})"
                )));
            }
            Ok(manual_order.to_vec())
        }
        DraftOrderMode::Standings => {
            let ranked = unique_set(standings, "standings")?;
            if let Some(unknown) = ranked.difference(&teams).next() {
                return Err(DraftError::InvalidConfiguration(format!(
                    "standings list unknown team `{unknown}`"
                )));
            }
            let mut order: Vec<String> = team_ids
                .iter()
                .filter(|t| !ranked.contains(t.as_str()))
                .cloned()
                .collect();
            order.extend(standings.iter().rev().cloned());
            Ok(order)
        }
    }
}

/// In-place uniform shuffle.
fn fisher_yates<T, R: Rng>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

fn unique_set<'a>(ids: &'a [String], what: &str) -> Result<HashSet<&'a str>, DraftError> {
    let mut set = HashSet::with_capacity(ids.len());
    for id in ids {
        if !set.insert(id.as_str()) {
            return Err(DraftError::InvalidConfiguration(format!(
                "{what} lists `{id}` more than once"
            )));
        }
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teams(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn random_is_a_permutation() {
        let t = teams(&["A", "B", "C", "D", "E", "F"]);
        let order = build_order(&t, DraftOrderMode::Random, &[], &[], None).unwrap();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(sorted, t);
    }

    #[test]
    fn random_with_seed_is_deterministic() {
        let t = teams(&["A", "B", "C", "D", "E", "F", "G", "H"]);
        let a = build_order(&t, DraftOrderMode::Random, &[], &[], Some(42)).unwrap();
        let b = build_order(&t, DraftOrderMode::Random, &[], &[], Some(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn random_covers_every_position() {
        // Over many seeds each team should land first at least once.
        let t = teams(&["A", "B", "C"]);
        let mut firsts = HashSet::new();
        for seed in 0..200 {
            let order = build_order(&t, DraftOrderMode::Random, &[], &[], Some(seed)).unwrap();
            firsts.insert(order[0].clone());
        }
        assert_eq!(firsts.len(), 3);
    }

    #[test]
    fn manual_returns_verbatim() {
        let t = teams(&["A", "B", "C"]);
        let manual = teams(&["C", "A", "B"]);
        let order = build_order(&t, DraftOrderMode::Manual, &manual, &[], None).unwrap();
        assert_eq!(order, manual);
    }

    #[test]
    fn manual_missing_team_is_rejected() {
        let t = teams(&["A", "B", "C"]);
        let err = build_order(&t, DraftOrderMode::Manual, &teams(&["A", "B"]), &[], None)
            .unwrap_err();
        assert!(matches!(err, DraftError::InvalidConfiguration(_)));
    }

    #[test]
    fn manual_duplicate_team_is_rejected() {
        let t = teams(&["A", "B", "C"]);
        let err = build_order(
            &t,
            DraftOrderMode::Manual,
            &teams(&["A", "B", "B"]),
            &[],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, DraftError::InvalidConfiguration(_)));
    }

    #[test]
    fn manual_unknown_team_is_rejected() {
        let t = teams(&["A", "B"]);
        let err = build_order(&t, DraftOrderMode::Manual, &teams(&["A", "Z"]), &[], None)
            .unwrap_err();
        assert!(matches!(err, DraftError::InvalidConfiguration(_)));
    }

    #[test]
    fn standings_reverse_with_new_teams_first() {
        let t = teams(&["A", "B", "C", "D"]);
        // B won, then D, then A. C is an expansion team.
        let order = build_order(
            &t,
            DraftOrderMode::Standings,
            &[],
            &teams(&["B", "D", "A"]),
            None,
        )
        .unwrap();
        assert_eq!(order, teams(&["C", "A", "D", "B"]));
    }

    #[test]
    fn standings_unknown_team_is_rejected() {
        let t = teams(&["A", "B"]);
        let err = build_order(&t, DraftOrderMode::Standings, &[], &teams(&["X"]), None)
            .unwrap_err();
        assert!(matches!(err, DraftError::InvalidConfiguration(_)));
    }

    #[test]
    fn empty_or_duplicate_team_list_is_rejected() {
        assert!(build_order(&[], DraftOrderMode::Random, &[], &[], None).is_err());
        assert!(build_order(&teams(&["A", "A"]), DraftOrderMode::Random, &[], &[], None).is_err());
    }
}
