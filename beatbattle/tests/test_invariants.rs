//! Model-based checks of the tally engine: arbitrary vote sequences are
//! replayed against the engine and a plain set-of-ballots model.

mod common;

use std::collections::BTreeSet;

use proptest::prelude::*;

use beatbattle::gateway::Gateway;
use beatbattle_core::{Rejection, UserId, VoteOutcome};

use common::Harness;

/// Submission owners; owner `i` entered submission `i`.
const OWNERS: [i64; 4] = [2, 3, 4, 5];

/// Voters include an entrant so self-votes show up in the sequences.
const VOTERS: [i64; 4] = [100, 101, 102, 3];

fn vote_strategy() -> impl Strategy<Value = Vec<(usize, usize)>> {
    proptest::collection::vec((0..VOTERS.len(), 0..OWNERS.len()), 0..40)
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn tallies_match_live_votes_and_caps_hold(
        cap in 1_u32..=3,
        votes in vote_strategy(),
    ) {
        tokio_test::block_on(async {
            let h = Harness::new();
            let contest = h.contest(cap).await;
            let subs = h.submissions(contest, &OWNERS).await;
            h.open_voting();

            let mut ballots: BTreeSet<(usize, usize)> = BTreeSet::new();
            for (v, s) in votes {
                let voter = UserId(VOTERS[v]);
                let outcome = h.app.engine().apply_vote(voter, subs[s]).await.unwrap();

                let held = ballots.iter().filter(|(bv, _)| *bv == v).count();
                let expected = if VOTERS[v] == OWNERS[s] {
                    VoteOutcome::Rejected(Rejection::SelfVote)
                } else if ballots.remove(&(v, s)) {
                    VoteOutcome::VoteWithdrawn
                } else if held >= cap as usize {
                    VoteOutcome::Rejected(Rejection::MaxVotesReached)
                } else {
                    ballots.insert((v, s));
                    VoteOutcome::VoteCast
                };
                prop_assert_eq!(outcome, expected);
            }

            for (s, sub) in subs.iter().enumerate() {
                let live = ballots.iter().filter(|(_, bs)| *bs == s).count();
                prop_assert_eq!(h.gateway.live_vote_rows(*sub), live);
            }
            let standings = h.app.board().standings(contest).await.unwrap();
            for standing in &standings {
                prop_assert_eq!(
                    standing.submission.votes as usize,
                    h.gateway.live_vote_rows(standing.submission.id)
                );
            }
            for voter in VOTERS {
                let held = h.gateway.count_votes(UserId(voter), contest).await.unwrap();
                prop_assert!(held <= cap);
            }
            Ok(())
        })?;
    }

    #[test]
    fn resolution_never_reverts(steps in proptest::collection::vec(-120_i64..3_000, 1..20)) {
        tokio_test::block_on(async {
            let h = Harness::new();
            let contest = h.contest(1).await;

            let mut last = h.gateway.contest_phase(contest).await.unwrap();
            for minutes in steps {
                h.clock.advance(chrono::Duration::minutes(minutes));
                let status = h.app.resolver().resolve(contest, false).await.unwrap();
                prop_assert!(status.phase >= last);
                prop_assert!(status.transition.is_none() || status.phase > last);
                last = status.phase;
            }
            Ok(())
        })?;
    }
}
