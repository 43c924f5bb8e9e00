use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a fresh record id.
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Teacher,
    Student,
}

/// Classroom member and their materialized gold balances.
///
/// Balances are written only by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    pub current_gold: u64,
    pub total_earned_gold: u64,
}

impl User {
    pub fn teacher(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: UserRole::Teacher,
            student_id: None,
            current_gold: 0,
            total_earned_gold: 0,
        }
    }

    pub fn student(
        id: impl Into<String>,
        name: impl Into<String>,
        student_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: UserRole::Student,
            student_id: Some(student_id.into()),
            current_gold: 0,
            total_earned_gold: 0,
        }
    }

    pub fn with_gold(mut self, current_gold: u64, total_earned_gold: u64) -> Self {
        self.current_gold = current_gold;
        self.total_earned_gold = total_earned_gold;
        self
    }

    pub fn level(&self) -> Level {
        Level::for_total_earned(self.total_earned_gold)
    }

    /// Students carry a `studentId`; teachers never do.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("user id must not be empty".to_string());
        }
        match (self.role, self.student_id.as_deref()) {
            (UserRole::Student, None) => {
                Err(format!("student '{}' must carry a studentId", self.id))
            }
            (UserRole::Student, Some(student_id)) if student_id.trim().is_empty() => {
                Err(format!("student '{}' has an empty studentId", self.id))
            }
            (UserRole::Teacher, Some(_)) => {
                Err(format!("teacher '{}' must not carry a studentId", self.id))
            }
            _ => Ok(()),
        }
    }
}

/// Balances a user held before the first logged transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OpeningBalance {
    pub user_id: String,
    pub current_gold: u64,
    pub total_earned_gold: u64,
}

impl From<&User> for OpeningBalance {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            current_gold: user.current_gold,
            total_earned_gold: user.total_earned_gold,
        }
    }
}

/// Shop item with limited stock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: u64,
    pub stock: u32,
    pub description: String,
}

impl Product {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        price: u64,
        stock: u32,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            stock,
            description: description.into(),
        }
    }

    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

/// Teacher-posted task with a reward and a capacity limit.
///
/// There is no quest-level status: per-student progress is derived from
/// assignees and submissions, see [`QuestProgress`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: String,
    pub title: String,
    pub description: String,
    pub reward_gold: u64,
    pub max_assignees: u32,
    #[serde(default)]
    pub current_assignees: Vec<String>,
    pub due_date: NaiveDate,
    pub created_by: String,
}

impl Quest {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        reward_gold: u64,
        max_assignees: u32,
        due_date: NaiveDate,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: new_record_id(),
            title: title.into(),
            description: description.into(),
            reward_gold,
            max_assignees,
            current_assignees: Vec::new(),
            due_date,
            created_by: created_by.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn has_assignee(&self, user_id: &str) -> bool {
        self.current_assignees.iter().any(|id| id == user_id)
    }

    pub fn is_full(&self) -> bool {
        self.current_assignees.len() >= self.max_assignees as usize
    }

    pub fn remaining_slots(&self) -> usize {
        (self.max_assignees as usize).saturating_sub(self.current_assignees.len())
    }

    /// Check the record-level invariants a stored quest must hold.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("quest id must not be empty".to_string());
        }
        if self.reward_gold == 0 {
            return Err(format!("quest '{}' rewardGold must be > 0", self.id));
        }
        if self.max_assignees == 0 {
            return Err(format!("quest '{}' maxAssignees must be >= 1", self.id));
        }
        if self.current_assignees.len() > self.max_assignees as usize {
            return Err(format!(
                "quest '{}' has {} assignees but allows {}",
                self.id,
                self.current_assignees.len(),
                self.max_assignees
            ));
        }
        for (idx, assignee) in self.current_assignees.iter().enumerate() {
            if self.current_assignees[..idx].contains(assignee) {
                return Err(format!(
                    "quest '{}' lists assignee '{}' twice",
                    self.id, assignee
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    /// `Approved` is terminal; `Rejected` reopens on resubmission.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved)
    }
}

/// A student's reported completion of a quest.
///
/// One record per `(quest_id, student_id)`; resubmission overwrites it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestSubmission {
    pub id: String,
    pub quest_id: String,
    pub student_id: String,
    pub student_name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_link: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub status: SubmissionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// Quest reward captured at submit time, used if the quest is deleted
    /// before review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_gold: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quest_title: Option<String>,
}

impl QuestSubmission {
    pub fn matches(&self, quest_id: &str, student_id: &str) -> bool {
        self.quest_id == quest_id && self.student_id == student_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Earn,
    Spend,
}

/// Audit log entry. Every balance change has exactly one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: u64,
    pub reason: String,
    pub date: DateTime<Utc>,
}

/// Standing tier derived from lifetime earnings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl Level {
    pub fn for_total_earned(total_earned_gold: u64) -> Self {
        match total_earned_gold {
            0..=49 => Self::Bronze,
            50..=149 => Self::Silver,
            150..=299 => Self::Gold,
            300..=599 => Self::Platinum,
            _ => Self::Diamond,
        }
    }
}

/// Where one student stands on one quest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestProgress {
    /// Not accepted, slots remain.
    Open,
    /// Not accepted, no slots left.
    Full,
    Assigned,
    Submitted,
    Completed,
    Rejected,
}

impl QuestProgress {
    pub fn derive(quest: &Quest, student_id: &str, submission: Option<&QuestSubmission>) -> Self {
        if let Some(submission) = submission {
            return match submission.status {
                SubmissionStatus::Pending => Self::Submitted,
                SubmissionStatus::Approved => Self::Completed,
                SubmissionStatus::Rejected => Self::Rejected,
            };
        }
        if quest.has_assignee(student_id) {
            Self::Assigned
        } else if quest.is_full() {
            Self::Full
        } else {
            Self::Open
        }
    }
}
