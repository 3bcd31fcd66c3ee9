use std::collections::{BTreeMap, HashMap, HashSet};

use crate::db::types::{FeedbackStatus, GradingLanguage};
use crate::services::normalize::AcceptedSubmission;

/// Snapshot of one stored feedback record, with the platform user ids of the
/// students currently attached to it.
#[derive(Debug, Clone)]
pub(crate) struct ExistingFeedback {
    pub(crate) id: String,
    pub(crate) sub_id: i64,
    pub(crate) status: FeedbackStatus,
    pub(crate) grader_id: Option<String>,
    pub(crate) language: GradingLanguage,
    pub(crate) students: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlannedCreate {
    pub(crate) sub_id: i64,
    pub(crate) auto_grade: i32,
    pub(crate) penalty: f64,
    pub(crate) language: GradingLanguage,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlannedAttachment {
    pub(crate) sub_id: i64,
    pub(crate) user_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlannedDetachment {
    pub(crate) feedback_id: String,
    pub(crate) user_id: i64,
}

/// Moves the superseded record's grader onto the record for the new
/// submission id.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GraderMigration {
    pub(crate) sub_id: i64,
    pub(crate) grader_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GradeRefresh {
    pub(crate) feedback_id: String,
    pub(crate) auto_grade: i32,
    pub(crate) penalty: f64,
}

/// A student whose resubmission was ignored because grading of their earlier
/// submission has already started.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LockedStudent {
    pub(crate) user_id: i64,
    pub(crate) incoming_sub_id: i64,
}

#[derive(Debug, Default)]
pub(crate) struct ReconcilePlan {
    pub(crate) creates: Vec<PlannedCreate>,
    pub(crate) attachments: Vec<PlannedAttachment>,
    pub(crate) detachments: Vec<PlannedDetachment>,
    pub(crate) grader_migrations: Vec<GraderMigration>,
    pub(crate) grade_refreshes: Vec<GradeRefresh>,
    pub(crate) deletions: Vec<String>,
    pub(crate) locked: Vec<LockedStudent>,
}

impl ReconcilePlan {
    pub(crate) fn is_empty(&self) -> bool {
        self.creates.is_empty()
            && self.attachments.is_empty()
            && self.detachments.is_empty()
            && self.grader_migrations.is_empty()
            && self.deletions.is_empty()
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum SupersedeAction {
    /// Detach the student and carry the old record's grader over.
    Migrate { grader_id: String },
    /// Detach the student; the grader (if any) stays behind.
    DetachOnly,
    /// Grading already started; the incoming submission is ignored.
    KeepOld,
}

/// Decision for a student whose stored feedback points at a different
/// submission id than the newly accepted one.
pub(crate) fn supersede(old: &ExistingFeedback, new_language: GradingLanguage) -> SupersedeAction {
    if old.status != FeedbackStatus::Template {
        return SupersedeAction::KeepOld;
    }

    match &old.grader_id {
        Some(grader_id) if old.language == new_language => {
            SupersedeAction::Migrate { grader_id: grader_id.clone() }
        }
        _ => SupersedeAction::DetachOnly,
    }
}

/// Reconciles the accepted submission set against the stored feedback records
/// of one exercise. Pure planning: the caller applies the returned plan
/// through the repositories.
///
/// Records whose status has left `template` are never detached, deleted, or
/// re-pointed; their students' newer submissions land in `locked`.
pub(crate) fn plan_reconciliation(
    accepted: &BTreeMap<i64, AcceptedSubmission>,
    existing: &[ExistingFeedback],
) -> ReconcilePlan {
    let by_sub: HashMap<i64, &ExistingFeedback> =
        existing.iter().map(|e| (e.sub_id, e)).collect();

    let mut by_student: HashMap<i64, &ExistingFeedback> = HashMap::new();
    for record in existing {
        for user_id in &record.students {
            by_student.insert(*user_id, record);
        }
    }

    let mut remaining: HashMap<&str, HashSet<i64>> = existing
        .iter()
        .map(|e| (e.id.as_str(), e.students.iter().copied().collect()))
        .collect();

    // Partner churn can leave one student inside several accepted group
    // submissions in the same batch; dedup upstream only drops solo
    // duplicates. Resolve each student to their newest submission id before
    // planning so nobody lands on two records.
    let mut resolved: HashMap<i64, i64> = HashMap::new();
    for (&sub_id, acc) in accepted {
        for student in &acc.students {
            resolved.insert(student.user_id, sub_id);
        }
    }

    let mut plan = ReconcilePlan::default();
    let mut attach_counts: HashMap<i64, usize> = HashMap::new();
    let mut detached_from: HashSet<String> = HashSet::new();
    let mut migrated_subs: HashSet<i64> = HashSet::new();

    for (&sub_id, acc) in accepted {
        let target = by_sub.get(&sub_id).copied();

        if let Some(target) = target {
            plan.grade_refreshes.push(GradeRefresh {
                feedback_id: target.id.clone(),
                auto_grade: acc.grade,
                penalty: acc.penalty,
            });
        }

        let target_has_grader = target.map(|t| t.grader_id.is_some()).unwrap_or(false);

        for student in &acc.students {
            if resolved.get(&student.user_id).copied() != Some(sub_id) {
                continue;
            }

            match by_student.get(&student.user_id) {
                None => {
                    plan.attachments.push(PlannedAttachment { sub_id, user_id: student.user_id });
                    *attach_counts.entry(sub_id).or_insert(0) += 1;
                    if let Some(target) = target {
                        if let Some(set) = remaining.get_mut(target.id.as_str()) {
                            set.insert(student.user_id);
                        }
                    }
                }
                Some(old) if old.sub_id == sub_id => {}
                Some(old) => match supersede(old, acc.language) {
                    SupersedeAction::KeepOld => {
                        plan.locked
                            .push(LockedStudent { user_id: student.user_id, incoming_sub_id: sub_id });
                    }
                    action => {
                        plan.detachments.push(PlannedDetachment {
                            feedback_id: old.id.clone(),
                            user_id: student.user_id,
                        });
                        detached_from.insert(old.id.clone());
                        if let Some(set) = remaining.get_mut(old.id.as_str()) {
                            set.remove(&student.user_id);
                        }

                        plan.attachments
                            .push(PlannedAttachment { sub_id, user_id: student.user_id });
                        *attach_counts.entry(sub_id).or_insert(0) += 1;
                        if let Some(target) = target {
                            if let Some(set) = remaining.get_mut(target.id.as_str()) {
                                set.insert(student.user_id);
                            }
                        }

                        if let SupersedeAction::Migrate { grader_id } = action {
                            if !target_has_grader && migrated_subs.insert(sub_id) {
                                plan.grader_migrations.push(GraderMigration { sub_id, grader_id });
                            }
                        }
                    }
                },
            }
        }

        // A record is only created once at least one student actually lands
        // on it; a submission whose every student is locked leaves no trace.
        if target.is_none() && attach_counts.get(&sub_id).copied().unwrap_or(0) > 0 {
            plan.creates.push(PlannedCreate {
                sub_id,
                auto_grade: acc.grade,
                penalty: acc.penalty,
                language: acc.language,
            });
        }
    }

    for record in existing {
        let empty = remaining.get(record.id.as_str()).map(HashSet::is_empty).unwrap_or(false);
        if empty && detached_from.contains(&record.id) && record.status == FeedbackStatus::Template
        {
            plan.deletions.push(record.id.clone());
        }
    }

    plan
}
