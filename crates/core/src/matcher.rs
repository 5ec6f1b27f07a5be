//! Best-match selection of tag-conditioned variants.
//!
//! A [`TagMatcher`] is built from one tag vector of a unit. A candidate is
//! eligible when every tag it declares is present in the vector and, for
//! concrete declarations, carries the same value. Among eligible candidates
//! the most specific wins: a wildcard match scores 1, an exact match scores 2.
//! Ties are narrowed by walking the unit's tag order and preferring the
//! candidates that declare each tag; the first survivor wins.

use std::collections::BTreeSet;

use crate::action::ActionDescriptor;
use crate::tags::{TagValue, TagVector, Tags};

/// Anything that declares tags.
pub trait Taggable {
    fn tags(&self) -> &Tags;
}

impl Taggable for ActionDescriptor {
    fn tags(&self) -> &Tags {
        &self.tags
    }
}

impl Taggable for Tags {
    fn tags(&self) -> &Tags {
        self
    }
}

/// The winning candidate of [`TagMatcher::find_best_match`].
#[derive(Debug)]
pub struct BestMatch<'a, T> {
    /// Index of the candidate in the input sequence.
    pub position: usize,
    pub candidate: &'a T,
    pub score: u32,
}

#[derive(Debug, Clone)]
pub struct TagMatcher {
    vector: TagVector,
    required: Tags,
    priority: Vec<String>,
}

impl TagMatcher {
    pub fn new(vector: TagVector) -> Self {
        let required = vector.present();
        let priority = vector
            .names()
            .filter(|name| required.contains_key(*name))
            .map(str::to_string)
            .collect();
        TagMatcher {
            vector,
            required,
            priority,
        }
    }

    pub fn vector(&self) -> &TagVector {
        &self.vector
    }

    /// Score of `declared` against this matcher, or `None` when disqualified.
    pub fn score(&self, declared: &Tags) -> Option<u32> {
        let mut score = 0;
        for (name, value) in declared {
            let required = self.required.get(name)?;
            score += match (value, required) {
                (TagValue::Wildcard, _) => 1,
                (v, r) if v == r => 2,
                _ => return None,
            };
        }
        Some(score)
    }

    pub fn find_best_match<'a, T, I>(&self, candidates: I) -> Option<BestMatch<'a, T>>
    where
        T: Taggable + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let mut best: Vec<BestMatch<'a, T>> = Vec::new();
        for (position, candidate) in candidates.into_iter().enumerate() {
            let Some(score) = self.score(candidate.tags()) else {
                continue;
            };
            match best.first().map(|b| b.score) {
                Some(top) if score < top => {}
                Some(top) if score == top => best.push(BestMatch {
                    position,
                    candidate,
                    score,
                }),
                _ => {
                    best.clear();
                    best.push(BestMatch {
                        position,
                        candidate,
                        score,
                    });
                }
            }
        }

        for name in &self.priority {
            if best.len() <= 1 {
                break;
            }
            let declaring: BTreeSet<usize> = best
                .iter()
                .filter(|b| b.candidate.tags().contains_key(name))
                .map(|b| b.position)
                .collect();
            if !declaring.is_empty() {
                best.retain(|b| declaring.contains(&b.position));
            }
        }

        best.into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(entries: &[(&str, Option<TagValue>)]) -> TagVector {
        TagVector::new(
            entries
                .iter()
                .map(|(n, v)| (n.to_string(), v.clone()))
                .collect(),
        )
    }

    fn tags(entries: &[(&str, TagValue)]) -> Tags {
        entries
            .iter()
            .map(|(n, v)| (n.to_string(), v.clone()))
            .collect()
    }

    fn exact(v: &str) -> TagValue {
        TagValue::exact(v)
    }

    #[test]
    fn untagged_candidate_matches_everything_with_zero_score() {
        let m = TagMatcher::new(vector(&[("lang", Some(exact("en")))]));
        let candidates = [Tags::new()];
        let best = m.find_best_match(&candidates).unwrap();
        assert_eq!(best.score, 0);
        assert_eq!(best.position, 0);
    }

    #[test]
    fn exact_beats_wildcard_beats_untagged() {
        let m = TagMatcher::new(vector(&[("lang", Some(exact("en")))]));
        let candidates = vec![
            Tags::new(),
            tags(&[("lang", TagValue::Wildcard)]),
            tags(&[("lang", exact("en"))]),
        ];
        let best = m.find_best_match(&candidates).unwrap();
        assert_eq!(best.position, 2);
        assert_eq!(best.score, 2);
    }

    #[test]
    fn declared_tags_outside_the_vector_disqualify() {
        let m = TagMatcher::new(vector(&[("lang", None), ("channel", Some(exact("web")))]));
        let candidates = vec![tags(&[("lang", TagValue::Wildcard)])];
        assert!(m.find_best_match(&candidates).is_none());
    }

    #[test]
    fn mismatched_values_disqualify() {
        let m = TagMatcher::new(vector(&[("lang", Some(exact("en")))]));
        assert!(m.find_best_match(&[tags(&[("lang", exact("fr"))])]).is_none());
        assert!(m.find_best_match(&[tags(&[("lang", TagValue::Empty)])]).is_none());
    }

    #[test]
    fn wildcard_in_vector_only_matches_wildcard_declarations_exactly() {
        let m = TagMatcher::new(vector(&[("lang", Some(TagValue::Wildcard))]));
        let candidates = vec![
            tags(&[("lang", exact("en"))]),
            tags(&[("lang", TagValue::Wildcard)]),
        ];
        let best = m.find_best_match(&candidates).unwrap();
        assert_eq!(best.position, 1);
    }

    #[test]
    fn ties_prefer_earlier_tags_in_unit_order() {
        let m = TagMatcher::new(vector(&[
            ("channel", Some(exact("web"))),
            ("lang", Some(exact("en"))),
        ]));
        let candidates = vec![
            tags(&[("lang", exact("en"))]),
            tags(&[("channel", exact("web"))]),
        ];
        let best = m.find_best_match(&candidates).unwrap();
        assert_eq!(best.position, 1);
        assert_eq!(best.score, 2);
    }

    #[test]
    fn remaining_ties_resolve_to_first_candidate() {
        let m = TagMatcher::new(vector(&[("lang", Some(exact("en")))]));
        let candidates = vec![
            tags(&[("lang", exact("en"))]),
            tags(&[("lang", exact("en"))]),
        ];
        assert_eq!(m.find_best_match(&candidates).unwrap().position, 0);
    }

    #[test]
    fn repeated_matching_picks_the_same_winner() {
        let m = TagMatcher::new(vector(&[
            ("channel", Some(exact("web"))),
            ("lang", Some(exact("en"))),
        ]));
        let candidates = vec![
            tags(&[("lang", TagValue::Wildcard)]),
            tags(&[("channel", exact("web")), ("lang", TagValue::Wildcard)]),
            tags(&[("channel", TagValue::Wildcard), ("lang", TagValue::Wildcard)]),
        ];
        let first = m.find_best_match(&candidates).unwrap();
        let second = m.find_best_match(&candidates).unwrap();
        assert_eq!((first.position, first.score), (second.position, second.score));
        assert_eq!(first.position, 1);
    }

    #[test]
    fn reordering_untied_candidates_keeps_the_winner() {
        let m = TagMatcher::new(vector(&[("lang", Some(exact("en")))]));
        let generic = tags(&[("lang", TagValue::Wildcard)]);
        let english = tags(&[("lang", exact("en"))]);
        let untagged = Tags::new();

        let orders = [
            vec![generic.clone(), english.clone(), untagged.clone()],
            vec![english.clone(), untagged.clone(), generic.clone()],
            vec![untagged.clone(), generic.clone(), english.clone()],
        ];
        for candidates in &orders {
            let best = m.find_best_match(candidates).unwrap();
            assert_eq!(candidates[best.position], english);
            assert_eq!(best.score, 2);
        }

        // A genuine tie is the only case declaration order decides.
        let twin = tags(&[("lang", exact("en"))]);
        let tied = [english.clone(), twin.clone()];
        assert_eq!(m.find_best_match(&tied).unwrap().position, 0);
        let tied = [twin, english];
        assert_eq!(m.find_best_match(&tied).unwrap().position, 0);
    }
}
