use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskboard_core::{BoardId, DomainError, DomainResult, MemberId, TaskId};

/// Workflow status of a task.
///
/// The CRUD layer owns the set of statuses; anything not recognised here is
/// carried verbatim in `Other` so it round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Pending,
    InProgress,
    InReview,
    Completed,
    Other(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::InReview => "in_review",
            TaskStatus::Completed => "completed",
            TaskStatus::Other(s) => s,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }
}

impl From<String> for TaskStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "pending" => TaskStatus::Pending,
            "in_progress" => TaskStatus::InProgress,
            "in_review" => TaskStatus::InReview,
            "completed" => TaskStatus::Completed,
            _ => TaskStatus::Other(value),
        }
    }
}

impl From<&str> for TaskStatus {
    fn from(value: &str) -> Self {
        TaskStatus::from(value.to_string())
    }
}

impl From<TaskStatus> for String {
    fn from(value: TaskStatus) -> Self {
        value.as_str().to_string()
    }
}

impl core::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A strictly positive number of penalty points.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct PenaltyPoints(i64);

impl PenaltyPoints {
    pub fn new(points: i64) -> DomainResult<Self> {
        if points <= 0 {
            return Err(DomainError::validation(format!(
                "penalty points must be positive (got {points})"
            )));
        }
        Ok(Self(points))
    }

    pub fn get(self) -> i64 {
        self.0
    }

    /// Balance change applied to each assigned member.
    pub fn delta(self) -> i64 {
        -self.0
    }
}

impl TryFrom<i64> for PenaltyPoints {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PenaltyPoints> for i64 {
    fn from(value: PenaltyPoints) -> Self {
        value.0
    }
}

/// A task returned by the overdue scan, before validation.
///
/// Fields the penalty needs are optional: the scan must never fail because of
/// one malformed document, so decoding maps missing or unusable values to
/// `None` and validation decides what to do with them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdueTask {
    pub id: TaskId,
    pub board_id: Option<BoardId>,
    pub deadline: Option<DateTime<Utc>>,
    pub status: Option<TaskStatus>,
    pub penalty_applied: bool,
    pub penalty_points: Option<i64>,
    pub assigned_members: Option<Vec<MemberId>>,
}

impl OverdueTask {
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            board_id: None,
            deadline: None,
            status: None,
            penalty_applied: false,
            penalty_points: None,
            assigned_members: None,
        }
    }

    pub fn with_board(mut self, board_id: BoardId) -> Self {
        self.board_id = Some(board_id);
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_penalty_points(mut self, points: i64) -> Self {
        self.penalty_points = Some(points);
        self
    }

    pub fn with_assigned_members(mut self, members: Vec<MemberId>) -> Self {
        self.assigned_members = Some(members);
        self
    }

    /// Decide whether this candidate can be penalized.
    ///
    /// Skipped tasks are left untouched so they stay eligible once their data
    /// is fixed. An empty member list is accepted: the task is still marked as
    /// penalized, there is just nobody to deduct from.
    pub fn validate(&self) -> Result<PenaltyTarget, SkipReason> {
        let board_id = self.board_id.clone().ok_or(SkipReason::MissingBoard)?;
        let members = self
            .assigned_members
            .clone()
            .ok_or(SkipReason::MissingAssignedMembers)?;
        let raw_points = self.penalty_points.ok_or(SkipReason::MissingPenaltyPoints)?;
        let points =
            PenaltyPoints::new(raw_points).map_err(|_| SkipReason::NonPositivePenalty(raw_points))?;

        Ok(PenaltyTarget {
            task_id: self.id.clone(),
            board_id,
            points,
            members,
        })
    }
}

/// Why a candidate was not penalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "value", rename_all = "snake_case")]
pub enum SkipReason {
    MissingBoard,
    MissingAssignedMembers,
    MissingPenaltyPoints,
    NonPositivePenalty(i64),
}

impl core::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SkipReason::MissingBoard => f.write_str("missing boardId"),
            SkipReason::MissingAssignedMembers => f.write_str("missing assignedMembers"),
            SkipReason::MissingPenaltyPoints => f.write_str("missing penaltyPoints"),
            SkipReason::NonPositivePenalty(p) => write!(f, "penaltyPoints must be > 0 (got {p})"),
        }
    }
}

/// A validated penalty: everything the applier needs to build its batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyTarget {
    pub task_id: TaskId,
    pub board_id: BoardId,
    pub points: PenaltyPoints,
    /// One decrement per entry, duplicates included.
    pub members: Vec<MemberId>,
}

impl PenaltyTarget {
    /// Total points removed across all members by this penalty.
    pub fn total_deduction(&self) -> i64 {
        self.points.get().saturating_mul(self.members.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn task_id(s: &str) -> TaskId {
        TaskId::new(s).unwrap()
    }

    fn members(ids: &[&str]) -> Vec<MemberId> {
        ids.iter().map(|m| MemberId::new(*m).unwrap()).collect()
    }

    fn valid_task() -> OverdueTask {
        OverdueTask::new(task_id("t1"))
            .with_board(BoardId::new("b1").unwrap())
            .with_status(TaskStatus::Pending)
            .with_penalty_points(5)
            .with_assigned_members(members(&["m1", "m2"]))
    }

    #[test]
    fn status_round_trips_known_and_unknown_values() {
        assert_eq!(TaskStatus::from("completed"), TaskStatus::Completed);
        assert_eq!(TaskStatus::from("in_progress"), TaskStatus::InProgress);
        assert_eq!(
            TaskStatus::from("archived"),
            TaskStatus::Other("archived".to_string())
        );
        assert_eq!(String::from(TaskStatus::Other("archived".into())), "archived");
    }

    #[test]
    fn valid_task_produces_target() {
        let target = valid_task().validate().unwrap();
        assert_eq!(target.board_id.as_str(), "b1");
        assert_eq!(target.points.delta(), -5);
        assert_eq!(target.members, members(&["m1", "m2"]));
        assert_eq!(target.total_deduction(), 10);
    }

    #[test]
    fn zero_points_is_skipped() {
        let task = valid_task().with_penalty_points(0);
        assert_eq!(task.validate(), Err(SkipReason::NonPositivePenalty(0)));
    }

    #[test]
    fn missing_fields_are_skipped() {
        let mut task = valid_task();
        task.board_id = None;
        assert_eq!(task.validate(), Err(SkipReason::MissingBoard));

        let mut task = valid_task();
        task.assigned_members = None;
        assert_eq!(task.validate(), Err(SkipReason::MissingAssignedMembers));

        let mut task = valid_task();
        task.penalty_points = None;
        assert_eq!(task.validate(), Err(SkipReason::MissingPenaltyPoints));
    }

    #[test]
    fn empty_member_list_is_still_a_target() {
        let target = valid_task().with_assigned_members(vec![]).validate().unwrap();
        assert!(target.members.is_empty());
        assert_eq!(target.total_deduction(), 0);
    }

    #[test]
    fn penalty_points_reject_non_positive() {
        assert!(PenaltyPoints::new(0).is_err());
        assert!(PenaltyPoints::new(-3).is_err());
        assert_eq!(PenaltyPoints::new(7).unwrap().delta(), -7);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: validation accepts exactly the strictly positive penalties,
        /// and the resulting delta is the negated penalty.
        #[test]
        fn validation_matches_sign_of_penalty(points in -1_000i64..1_000i64, n in 0usize..6) {
            let ids: Vec<MemberId> = (0..n).map(|i| MemberId::new(format!("m{i}")).unwrap()).collect();
            let task = valid_task().with_penalty_points(points).with_assigned_members(ids.clone());

            match task.validate() {
                Ok(target) => {
                    prop_assert!(points > 0);
                    prop_assert_eq!(target.points.delta(), -points);
                    prop_assert_eq!(target.members.len(), n);
                }
                Err(reason) => {
                    prop_assert!(points <= 0);
                    prop_assert_eq!(reason, SkipReason::NonPositivePenalty(points));
                }
            }
        }
    }
}
