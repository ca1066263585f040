//! Vote tally and ranking.
//!
//! Every observation in a batch is one vote for its `(artifact name, artifact id)`
//! pair. Names are ranked by their total votes; within a name the most voted
//! id represents it. A script is then attributed to the best ranked name whose
//! representative id appears in that script's own ballot.

use std::collections::{BTreeMap, HashMap};

use scriptsource_core::{ArtifactId, Observation, ResolvedScript};

/// Candidate build after ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedArtifact {
    pub name: String,
    /// Most voted id under `name`; ties go to the larger id.
    pub representative_id: ArtifactId,
    /// Total votes under `name`, over every id.
    pub score: u64,
}

#[derive(Debug, Clone, Default)]
struct NameVotes {
    name: String,
    ids: BTreeMap<ArtifactId, u64>,
}

/// Two-level vote count: `votes[name][id]`.
///
/// Names keep the order in which they were first seen, which breaks score
/// ties during ranking.
#[derive(Debug, Clone, Default)]
pub struct VoteTally {
    names: Vec<NameVotes>,
    index: HashMap<String, usize>,
}

impl VoteTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tally every ballot, in order, each ballot front to back.
    pub fn from_ballots<'a, I>(ballots: I) -> Self
    where
        I: IntoIterator<Item = &'a [Observation]>,
    {
        let mut tally = Self::new();
        for ballot in ballots {
            for observation in ballot {
                tally.add(observation);
            }
        }
        tally
    }

    /// Count one vote.
    pub fn add(&mut self, observation: &Observation) {
        let slot = match self.index.get(&observation.artifact_name) {
            Some(&slot) => slot,
            None => {
                self.names.push(NameVotes {
                    name: observation.artifact_name.clone(),
                    ids: BTreeMap::new(),
                });
                self.index
                    .insert(observation.artifact_name.clone(), self.names.len() - 1);
                self.names.len() - 1
            }
        };
        *self.names[slot].ids.entry(observation.artifact_id).or_insert(0) += 1;
    }

    /// Votes for one `(name, id)` pair.
    pub fn votes(&self, name: &str, id: ArtifactId) -> u64 {
        self.index
            .get(name)
            .and_then(|&slot| self.names[slot].ids.get(&id))
            .copied()
            .unwrap_or(0)
    }

    /// Total votes under `name`.
    pub fn score(&self, name: &str) -> u64 {
        self.index
            .get(name)
            .map(|&slot| self.names[slot].ids.values().sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names ranked by descending score, ties in first-seen order.
    pub fn rank(&self) -> Vec<RankedArtifact> {
        let mut ranked: Vec<RankedArtifact> = self
            .names
            .iter()
            .filter_map(|votes| {
                let (&representative_id, _) = votes
                    .ids
                    .iter()
                    .max_by_key(|&(&id, &count)| (count, id))?;
                Some(RankedArtifact {
                    name: votes.name.clone(),
                    representative_id,
                    score: votes.ids.values().sum(),
                })
            })
            .collect();

        // sort_by is stable, so equal scores keep first-seen order
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked
    }
}

/// Attribute each script from its own ballot and the batch-wide ranking.
///
/// `ballots[i]` belongs to `scripts[i]`. Output order matches input order.
pub fn attribute<S>(scripts: Vec<S>, ballots: &[Vec<Observation>]) -> Vec<ResolvedScript<S>> {
    let ranked = VoteTally::from_ballots(ballots.iter().map(Vec::as_slice)).rank();

    scripts
        .into_iter()
        .zip(ballots)
        .map(|(script, ballot)| {
            let matched = ranked.iter().find_map(|candidate| {
                ballot
                    .iter()
                    .find(|o| o.artifact_id == candidate.representative_id)
            });
            match matched {
                Some(observation) => ResolvedScript::resolved(script, observation.to_artifact_ref()),
                None => ResolvedScript::unresolved(script),
            }
        })
        .collect()
}


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_observation() -> impl Strategy<Value = Observation> {
        (0i64..6, prop::sample::select(vec!["main", "vendor", "worker"]), "[a-c]\\.js")
            .prop_map(|(id, name, path)| Observation::new(ArtifactId(id), name, path))
    }

    fn arb_ballots() -> impl Strategy<Value = Vec<Vec<Observation>>> {
        prop::collection::vec(prop::collection::vec(arb_observation(), 0..6), 0..8)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_output_matches_input_order(ballots in arb_ballots()) {
            let scripts: Vec<usize> = (0..ballots.len()).collect();
            let out = attribute(scripts.clone(), &ballots);
            prop_assert_eq!(out.len(), scripts.len());
            for (i, resolved) in out.iter().enumerate() {
                prop_assert_eq!(resolved.script, i);
            }
        }

        #[test]
        fn prop_empty_ballot_never_resolves(ballots in arb_ballots()) {
            let scripts: Vec<usize> = (0..ballots.len()).collect();
            let out = attribute(scripts, &ballots);
            for (resolved, ballot) in out.iter().zip(&ballots) {
                if ballot.is_empty() {
                    prop_assert!(resolved.artifact.is_none());
                }
            }
        }

        #[test]
        fn prop_resolved_artifact_comes_from_own_ballot(ballots in arb_ballots()) {
            let scripts: Vec<usize> = (0..ballots.len()).collect();
            let out = attribute(scripts, &ballots);
            for (resolved, ballot) in out.iter().zip(&ballots) {
                if let Some(artifact) = &resolved.artifact {
                    prop_assert!(ballot.iter().any(|o| o.to_artifact_ref() == *artifact));
                }
            }
        }

        #[test]
        fn prop_scores_sum_to_total_observations(ballots in arb_ballots()) {
            let tally = VoteTally::from_ballots(ballots.iter().map(Vec::as_slice));
            let total: usize = ballots.iter().map(Vec::len).sum();
            let scored: u64 = tally.rank().iter().map(|r| r.score).sum();
            prop_assert_eq!(scored, total as u64);
        }

        #[test]
        fn prop_rank_is_sorted_by_score(ballots in arb_ballots()) {
            let ranked = VoteTally::from_ballots(ballots.iter().map(Vec::as_slice)).rank();
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
        }

        #[test]
        fn prop_tied_ids_pick_larger(a in 0i64..1000, b in 0i64..1000, votes in 1usize..5) {
            prop_assume!(a != b);
            let mut ballot = Vec::new();
            for _ in 0..votes {
                ballot.push(Observation::new(ArtifactId(a), "main", "x.js"));
                ballot.push(Observation::new(ArtifactId(b), "main", "x.js"));
            }
            let ranked = VoteTally::from_ballots([ballot.as_slice()]).rank();
            prop_assert_eq!(ranked[0].representative_id, ArtifactId(a.max(b)));
        }
    }
}
