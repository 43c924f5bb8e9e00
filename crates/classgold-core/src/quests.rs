use crate::error::{EconomyError, EntityKind};
use crate::ledger::Ledger;
use crate::repository::Repository;
use crate::types::{
    new_record_id, Quest, QuestProgress, QuestSubmission, SubmissionStatus, Transaction,
    TransactionType,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AcceptOutcome {
    Accepted { remaining_slots: usize },
    UnknownQuest,
    AlreadyAccepted,
    QuestFull,
}

impl AcceptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Work handed in by a student.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionDraft {
    pub quest_id: String,
    pub student_id: String,
    pub student_name: String,
    pub content: String,
    #[serde(default)]
    pub evidence_link: Option<String>,
}

impl SubmissionDraft {
    pub fn new(
        quest_id: impl Into<String>,
        student_id: impl Into<String>,
        student_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            quest_id: quest_id.into(),
            student_id: student_id.into(),
            student_name: student_name.into(),
            content: content.into(),
            evidence_link: None,
        }
    }

    pub fn with_evidence(mut self, evidence_link: impl Into<String>) -> Self {
        self.evidence_link = Some(evidence_link.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Created { submission: QuestSubmission },
    Resubmitted { submission: QuestSubmission },
    /// Approved work is final; nothing was written.
    AlreadyApproved { submission: QuestSubmission },
}

impl SubmitOutcome {
    pub fn submission(&self) -> &QuestSubmission {
        match self {
            Self::Created { submission }
            | Self::Resubmitted { submission }
            | Self::AlreadyApproved { submission } => submission,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReviewOutcome {
    /// `payout` is `None` only when neither the quest nor a cached reward
    /// was available.
    Approved {
        submission: QuestSubmission,
        payout: Option<Transaction>,
    },
    Rejected {
        submission: QuestSubmission,
    },
    /// Re-review of approved work; nothing changed and nothing was paid.
    AlreadyApproved {
        submission: QuestSubmission,
    },
}

/// One quest as seen by one student.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestProgressView {
    pub quest: Quest,
    pub progress: QuestProgress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// Owner of quests and submissions.
///
/// Payouts go through the [`Ledger`]; gold fields are never touched here.
#[derive(Clone)]
pub struct QuestBoard {
    repo: Repository,
}

impl QuestBoard {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub fn quests(&self) -> Result<Vec<Quest>, EconomyError> {
        self.repo.quests()
    }

    pub fn submissions(&self) -> Result<Vec<QuestSubmission>, EconomyError> {
        self.repo.submissions()
    }

    pub fn create_quest(&self, quest: Quest) -> Result<Quest, EconomyError> {
        quest.validate().map_err(EconomyError::InvalidRecord)?;
        let mut quests = self.repo.quests()?;
        if quests.iter().any(|existing| existing.id == quest.id) {
            return Err(EconomyError::InvalidRecord(format!(
                "quest '{}' already exists",
                quest.id
            )));
        }
        quests.push(quest.clone());
        self.repo.save_quests(&quests)?;
        debug!(quest_id = %quest.id, reward_gold = quest.reward_gold, "Quest created");
        Ok(quest)
    }

    /// Remove a quest. Submissions are left in place.
    pub fn delete_quest(&self, quest_id: &str) -> Result<bool, EconomyError> {
        let mut quests = self.repo.quests()?;
        let before = quests.len();
        quests.retain(|quest| quest.id != quest_id);
        if quests.len() == before {
            return Ok(false);
        }
        self.repo.save_quests(&quests)?;
        debug!(quest_id, "Quest deleted");
        Ok(true)
    }

    /// Join a quest. Capacity and duplicate checks run against one read.
    pub fn accept(&self, quest_id: &str, user_id: &str) -> Result<AcceptOutcome, EconomyError> {
        let mut quests = self.repo.quests()?;
        let Some(quest) = quests.iter_mut().find(|quest| quest.id == quest_id) else {
            return Ok(AcceptOutcome::UnknownQuest);
        };
        if quest.has_assignee(user_id) {
            return Ok(AcceptOutcome::AlreadyAccepted);
        }
        if quest.is_full() {
            return Ok(AcceptOutcome::QuestFull);
        }

        quest.current_assignees.push(user_id.to_string());
        let remaining_slots = quest.remaining_slots();
        self.repo.save_quests(&quests)?;
        debug!(quest_id, user_id, remaining_slots, "Quest accepted");
        Ok(AcceptOutcome::Accepted { remaining_slots })
    }

    /// Upsert the submission for `(quest_id, student_id)`.
    ///
    /// A resubmission keeps the record id, replaces the work and returns the
    /// status to `Pending`. Prior feedback stays until the next review.
    pub fn submit(&self, draft: SubmissionDraft) -> Result<SubmitOutcome, EconomyError> {
        let quest = self
            .repo
            .quests()?
            .into_iter()
            .find(|quest| quest.id == draft.quest_id);
        let mut submissions = self.repo.submissions()?;
        let now = Utc::now();

        let outcome = match submissions
            .iter_mut()
            .find(|submission| submission.matches(&draft.quest_id, &draft.student_id))
        {
            Some(existing) if existing.status.is_terminal() => {
                debug!(
                    submission_id = %existing.id,
                    "Resubmission ignored for approved work"
                );
                return Ok(SubmitOutcome::AlreadyApproved {
                    submission: existing.clone(),
                });
            }
            Some(existing) => {
                existing.student_name = draft.student_name;
                existing.content = draft.content;
                existing.evidence_link = draft.evidence_link;
                existing.submitted_at = now;
                existing.status = SubmissionStatus::Pending;
                if let Some(quest) = &quest {
                    existing.reward_gold = Some(quest.reward_gold);
                    existing.quest_title = Some(quest.title.clone());
                }
                SubmitOutcome::Resubmitted {
                    submission: existing.clone(),
                }
            }
            None => {
                let submission = QuestSubmission {
                    id: new_record_id(),
                    quest_id: draft.quest_id,
                    student_id: draft.student_id,
                    student_name: draft.student_name,
                    content: draft.content,
                    evidence_link: draft.evidence_link,
                    submitted_at: now,
                    status: SubmissionStatus::Pending,
                    feedback: None,
                    reward_gold: quest.as_ref().map(|quest| quest.reward_gold),
                    quest_title: quest.as_ref().map(|quest| quest.title.clone()),
                };
                submissions.push(submission.clone());
                SubmitOutcome::Created { submission }
            }
        };

        self.repo.save_submissions(&submissions)?;
        let submission = outcome.submission();
        debug!(
            submission_id = %submission.id,
            quest_id = %submission.quest_id,
            student_id = %submission.student_id,
            "Submission recorded"
        );
        Ok(outcome)
    }

    /// Decide a submission. Approval pays the reward exactly once.
    ///
    /// The caller must hold both the quest board and ledger locks.
    pub fn review(
        &self,
        ledger: &Ledger,
        submission_id: &str,
        approved: bool,
        feedback: impl Into<String>,
    ) -> Result<ReviewOutcome, EconomyError> {
        let previous = self.repo.submissions()?;
        let index = previous
            .iter()
            .position(|submission| submission.id == submission_id)
            .ok_or_else(|| EconomyError::not_found(EntityKind::Submission, submission_id))?;

        if previous[index].status.is_terminal() {
            debug!(submission_id, "Review ignored for approved work");
            return Ok(ReviewOutcome::AlreadyApproved {
                submission: previous[index].clone(),
            });
        }

        let mut submissions = previous.clone();
        let submission = &mut submissions[index];
        submission.status = if approved {
            SubmissionStatus::Approved
        } else {
            SubmissionStatus::Rejected
        };
        submission.feedback = Some(feedback.into());
        let submission = submission.clone();
        self.repo.save_submissions(&submissions)?;

        if !approved {
            debug!(submission_id, "Submission rejected");
            return Ok(ReviewOutcome::Rejected { submission });
        }

        let reward = self
            .repo
            .quests()?
            .into_iter()
            .find(|quest| quest.id == submission.quest_id)
            .map(|quest| (quest.reward_gold, quest.title))
            .or_else(|| {
                submission.reward_gold.map(|reward| {
                    let title = submission
                        .quest_title
                        .clone()
                        .unwrap_or_else(|| submission.quest_id.clone());
                    (reward, title)
                })
            });

        let Some((reward_gold, title)) = reward else {
            warn!(
                submission_id,
                quest_id = %submission.quest_id,
                "Approved submission has no quest or cached reward; no payout"
            );
            return Ok(ReviewOutcome::Approved {
                submission,
                payout: None,
            });
        };

        let payout = match ledger.apply_transaction(
            &submission.student_id,
            reward_gold,
            TransactionType::Earn,
            format!("Quest Reward: {title}"),
        ) {
            Ok(payout) => payout,
            Err(err) => {
                warn!(submission_id, error = %err, "Quest payout failed, restoring submission");
                if let Err(restore_err) = self.repo.save_submissions(&previous) {
                    error!(submission_id, error = %restore_err, "Submission restore failed after payout failure");
                }
                return Err(err);
            }
        };

        debug!(
            submission_id,
            student_id = %submission.student_id,
            reward_gold,
            "Submission approved and paid"
        );
        Ok(ReviewOutcome::Approved {
            submission,
            payout: Some(payout),
        })
    }

    /// Every quest with the given student's derived progress.
    pub fn progress(&self, student_id: &str) -> Result<Vec<QuestProgressView>, EconomyError> {
        let submissions = self.repo.submissions()?;
        Ok(self
            .repo
            .quests()?
            .into_iter()
            .map(|quest| {
                let submission = submissions
                    .iter()
                    .find(|submission| submission.matches(&quest.id, student_id));
                QuestProgressView {
                    progress: QuestProgress::derive(&quest, student_id, submission),
                    feedback: submission.and_then(|submission| submission.feedback.clone()),
                    quest,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::SeedData;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn setup() -> (QuestBoard, Ledger) {
        let repo = Repository::new(Arc::new(MemoryStore::new()), Arc::new(SeedData::default()));
        (QuestBoard::new(repo.clone()), Ledger::new(repo))
    }

    #[test]
    fn accept_respects_capacity_and_duplicates() {
        let (board, _) = setup();
        assert!(board.accept("q2", "s1").unwrap().is_success());
        assert_eq!(board.accept("q2", "s2").unwrap(), AcceptOutcome::QuestFull);
        assert_eq!(
            board.accept("q2", "s1").unwrap(),
            AcceptOutcome::AlreadyAccepted
        );
        assert_eq!(board.accept("q9", "s1").unwrap(), AcceptOutcome::UnknownQuest);

        let q2 = board.quests().unwrap().into_iter().find(|q| q.id == "q2").unwrap();
        assert_eq!(q2.current_assignees, vec!["s1".to_string()]);
    }

    #[test]
    fn resubmission_overwrites_single_record() {
        let (board, _) = setup();
        let first = board
            .submit(SubmissionDraft::new("q1", "s1", "Alice Smith", "swept"))
            .unwrap();
        let second = board
            .submit(SubmissionDraft::new("q1", "s1", "Alice Smith", "swept and dusted"))
            .unwrap();

        assert!(matches!(first, SubmitOutcome::Created { .. }));
        assert!(matches!(second, SubmitOutcome::Resubmitted { .. }));
        let submissions = board.submissions().unwrap();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].id, first.submission().id);
        assert_eq!(submissions[0].content, "swept and dusted");
        assert_eq!(submissions[0].reward_gold, Some(50));
    }

    #[test]
    fn rejected_work_keeps_feedback_until_next_review() {
        let (board, ledger) = setup();
        let id = board
            .submit(SubmissionDraft::new("q1", "s2", "Bob Jones", "half done"))
            .unwrap()
            .submission()
            .id
            .clone();
        board.review(&ledger, &id, false, "redo").unwrap();

        let outcome = board
            .submit(SubmissionDraft::new("q1", "s2", "Bob Jones", "all done").with_evidence("photo.png"))
            .unwrap();
        let submission = outcome.submission();
        assert_eq!(submission.status, SubmissionStatus::Pending);
        assert_eq!(submission.feedback.as_deref(), Some("redo"));
        assert_eq!(submission.evidence_link.as_deref(), Some("photo.png"));
        assert_eq!(ledger.user("s2").unwrap().current_gold, 50);
    }

    #[test]
    fn approval_pays_once() {
        let (board, ledger) = setup();
        let id = board
            .submit(SubmissionDraft::new("q2", "s2", "Bob Jones", "tutored"))
            .unwrap()
            .submission()
            .id
            .clone();

        let outcome = board.review(&ledger, &id, true, "great").unwrap();
        let ReviewOutcome::Approved { payout: Some(payout), .. } = &outcome else {
            panic!("expected paid approval, got {outcome:?}");
        };
        assert_eq!(payout.reason, "Quest Reward: Math Tutor");

        let again = board.review(&ledger, &id, true, "great again").unwrap();
        assert!(matches!(again, ReviewOutcome::AlreadyApproved { .. }));

        let resubmit = board
            .submit(SubmissionDraft::new("q2", "s2", "Bob Jones", "more tutoring"))
            .unwrap();
        assert!(matches!(resubmit, SubmitOutcome::AlreadyApproved { .. }));

        let bob = ledger.user("s2").unwrap();
        assert_eq!(bob.current_gold, 150);
        assert_eq!(bob.total_earned_gold, 150);
        assert_eq!(ledger.transactions().unwrap().len(), 1);
    }

    #[test]
    fn deleted_quest_pays_cached_reward() {
        let (board, ledger) = setup();
        let id = board
            .submit(SubmissionDraft::new("q1", "s3", "Charlie Day", "cleaned"))
            .unwrap()
            .submission()
            .id
            .clone();
        assert!(board.delete_quest("q1").unwrap());

        let outcome = board.review(&ledger, &id, true, "thanks").unwrap();
        let ReviewOutcome::Approved { payout: Some(payout), .. } = &outcome else {
            panic!("expected cached payout, got {outcome:?}");
        };
        assert_eq!(payout.amount, 50);
        assert_eq!(payout.reason, "Quest Reward: Clean the Classroom");
        assert_eq!(ledger.user("s3").unwrap().current_gold, 250);
    }

    #[test]
    fn submission_for_unknown_quest_approves_without_payout() {
        let (board, ledger) = setup();
        let id = board
            .submit(SubmissionDraft::new("q-missing", "s1", "Alice Smith", "??"))
            .unwrap()
            .submission()
            .id
            .clone();

        let outcome = board.review(&ledger, &id, true, "ok").unwrap();
        assert!(matches!(outcome, ReviewOutcome::Approved { payout: None, .. }));
        assert_eq!(ledger.user("s1").unwrap().current_gold, 120);
    }

    #[test]
    fn review_of_unknown_submission_is_not_found() {
        let (board, ledger) = setup();
        let err = board.review(&ledger, "nope", true, "").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn create_quest_validates_and_rejects_duplicate_ids() {
        let (board, _) = setup();
        let due = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let quest = Quest::new("Water plants", "Every pot", 20, 3, due, "t1");
        board.create_quest(quest.clone()).unwrap();
        assert!(board.create_quest(quest).is_err());

        let zero = Quest::new("Free", "Nothing", 0, 1, due, "t1");
        assert!(matches!(
            board.create_quest(zero),
            Err(EconomyError::InvalidRecord(_))
        ));
        assert_eq!(board.quests().unwrap().len(), 3);
    }

    #[test]
    fn delete_unknown_quest_is_a_noop() {
        let (board, _) = setup();
        assert!(!board.delete_quest("q404").unwrap());
        assert_eq!(board.quests().unwrap().len(), 2);
    }

    #[test]
    fn progress_reflects_assignment_and_review() {
        let (board, ledger) = setup();
        board.accept("q1", "s1").unwrap();
        board.accept("q2", "s2").unwrap();
        let id = board
            .submit(SubmissionDraft::new("q1", "s1", "Alice Smith", "done"))
            .unwrap()
            .submission()
            .id
            .clone();
        board.review(&ledger, &id, false, "missed a shelf").unwrap();

        let views = board.progress("s1").unwrap();
        assert_eq!(views[0].progress, QuestProgress::Rejected);
        assert_eq!(views[0].feedback.as_deref(), Some("missed a shelf"));
        assert_eq!(views[1].progress, QuestProgress::Full);
    }
}
