use std::collections::{BTreeMap, HashMap};

use crate::db::types::GradingLanguage;
use crate::services::platform::RawSubmission;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AcceptedStudent {
    pub(crate) user_id: i64,
    pub(crate) email: String,
    pub(crate) student_number: Option<String>,
}

/// One accepted logical submission with every eligible co-submitter.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AcceptedSubmission {
    pub(crate) grade: i32,
    pub(crate) penalty: f64,
    pub(crate) language: GradingLanguage,
    pub(crate) students: Vec<AcceptedStudent>,
}

/// The submitter's grading-language preference, resolved once at ingestion.
/// Submissions without a hint go to the exercise's primary language pool.
pub(crate) fn resolve_language(sub: &RawSubmission) -> GradingLanguage {
    if let Some(lang) = &sub.feedback_lang {
        if lang == "en" {
            return GradingLanguage::Secondary;
        }
        return GradingLanguage::Primary;
    }

    if sub.grader_lang.as_deref() == Some("en") {
        return GradingLanguage::Secondary;
    }

    GradingLanguage::Primary
}

/// Filters the raw submission list down to the records eligible for manual
/// grading and collapses group submissions into one entry per submission id.
///
/// Students who ended up with more than one passing submission (retry and
/// group-formation artifacts) keep the submission shared with a partner; the
/// stray solo duplicate is dropped.
pub(crate) fn sort_submissions(
    submissions: &[RawSubmission],
    min_points: i32,
    max_points: Option<i32>,
    deadline_passed: bool,
) -> BTreeMap<i64, AcceptedSubmission> {
    let mut accepted: BTreeMap<i64, AcceptedSubmission> = BTreeMap::new();
    let mut subs_by_user: HashMap<i64, Vec<i64>> = HashMap::new();
    let mut duplicates: Vec<i64> = Vec::new();

    for sub in submissions {
        if sub.grade < min_points {
            continue;
        }

        if let Some(max) = max_points {
            if sub.grade > max {
                continue;
            }
        }

        // Before the deadline closes only explicitly opted-in submissions
        // are taken into grading.
        if !deadline_passed && sub.ready_for_review.is_none() {
            continue;
        }

        let student = AcceptedStudent {
            user_id: sub.user_id,
            email: sub.email.clone(),
            student_number: sub.student_number.clone(),
        };

        accepted
            .entry(sub.submission_id)
            .and_modify(|entry| entry.students.push(student.clone()))
            .or_insert_with(|| AcceptedSubmission {
                grade: sub.grade,
                penalty: sub.penalty.unwrap_or(0.0),
                language: resolve_language(sub),
                students: vec![student],
            });

        let seen = subs_by_user.entry(sub.user_id).or_default();
        seen.push(sub.submission_id);
        if seen.len() > 1 {
            duplicates.push(sub.user_id);
        }
    }

    for user_id in duplicates {
        let Some(seen) = subs_by_user.get(&user_id) else { continue };
        for sub_id in seen {
            let is_solo = accepted.get(sub_id).map(|entry| entry.students.len() == 1);
            if is_solo == Some(true) {
                accepted.remove(sub_id);
            }
        }
    }

    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(submission_id: i64, user_id: i64, grade: i32) -> RawSubmission {
        RawSubmission {
            submission_id,
            grade,
            penalty: None,
            email: format!("user{user_id}@example.fi"),
            student_number: None,
            user_id,
            feedback_lang: None,
            grader_lang: None,
            ready_for_review: None,
        }
    }

    #[test]
    fn empty_input_gives_empty_map() {
        let accepted = sort_submissions(&[], 0, None, true);
        assert!(accepted.is_empty());
    }

    #[test]
    fn rejects_grades_outside_bounds() {
        let submissions =
            vec![raw(1, 1, 4), raw(2, 2, 5), raw(3, 3, 10), raw(4, 4, 11)];
        let accepted = sort_submissions(&submissions, 5, Some(10), true);
        assert_eq!(accepted.keys().copied().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn no_upper_bound_when_max_points_unset() {
        let submissions = vec![raw(1, 1, 1000)];
        let accepted = sort_submissions(&submissions, 0, None, true);
        assert_eq!(accepted.len(), 1);
    }

    #[test]
    fn deadline_gating_requires_review_marker_while_open() {
        let mut opted_in = raw(1, 1, 8);
        opted_in.ready_for_review = Some(serde_json::json!("yes"));
        let not_opted = raw(2, 2, 8);

        let accepted = sort_submissions(&[opted_in.clone(), not_opted.clone()], 5, None, false);
        assert_eq!(accepted.keys().copied().collect::<Vec<_>>(), vec![1]);

        // Once the module closes, both are taken in.
        let accepted = sort_submissions(&[opted_in, not_opted], 5, None, true);
        assert_eq!(accepted.len(), 2);
    }

    #[test]
    fn group_submission_collects_co_submitters() {
        let submissions = vec![raw(7, 1, 8), raw(7, 2, 8)];
        let accepted = sort_submissions(&submissions, 5, None, true);
        let entry = accepted.get(&7).expect("submission 7");
        assert_eq!(entry.students.len(), 2);
        assert_eq!(entry.grade, 8);
    }

    #[test]
    fn solo_duplicate_dropped_in_favor_of_pair_submission() {
        // User A appears under submission 1 (alone) and submission 2 (with B).
        let submissions = vec![raw(1, 1, 8), raw(2, 1, 8), raw(2, 2, 8)];
        let accepted = sort_submissions(&submissions, 5, None, true);

        assert!(!accepted.contains_key(&1));
        let entry = accepted.get(&2).expect("submission 2");
        let users: Vec<i64> = entry.students.iter().map(|s| s.user_id).collect();
        assert_eq!(users, vec![1, 2]);
    }

    #[test]
    fn language_resolved_from_hints() {
        let mut en = raw(1, 1, 8);
        en.feedback_lang = Some("en".into());
        let mut fi = raw(2, 2, 8);
        fi.feedback_lang = Some("fi".into());
        let mut legacy_en = raw(3, 3, 8);
        legacy_en.grader_lang = Some("en".into());
        let unhinted = raw(4, 4, 8);

        let accepted = sort_submissions(&[en, fi, legacy_en, unhinted], 5, None, true);
        assert_eq!(accepted[&1].language, GradingLanguage::Secondary);
        assert_eq!(accepted[&2].language, GradingLanguage::Primary);
        assert_eq!(accepted[&3].language, GradingLanguage::Secondary);
        assert_eq!(accepted[&4].language, GradingLanguage::Primary);
    }

    #[test]
    fn penalty_defaults_to_zero() {
        let accepted = sort_submissions(&[raw(1, 1, 8)], 5, None, true);
        assert_eq!(accepted[&1].penalty, 0.0);
    }
}
