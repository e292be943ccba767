//! Document layout of tasks, board members, users and boards.
//!
//! Field names match what the task CRUD layer writes. Decoding is lenient:
//! a field that is missing or has the wrong type decodes to `None` instead of
//! failing, so one bad document cannot break a scan.

use taskboard_core::{BoardId, MemberId, TaskId, UserId};
use taskboard_tasks::{BoardMember, OverdueTask, TaskStatus};

use crate::document_store::{Document, DocumentPath, DocumentStoreError, FieldValue, Fields};

pub const TASKS: &str = "tasks";
pub const BOARDS: &str = "boards";
pub const USERS: &str = "users";
pub const MEMBERS_DETAILS: &str = "members_details";

pub const DEADLINE: &str = "deadline";
pub const STATUS: &str = "status";
pub const PENALTY_APPLIED: &str = "penaltyApplied";
pub const PENALTY_POINTS: &str = "penaltyPoints";
pub const ASSIGNED_MEMBERS: &str = "assignedMembers";
pub const BOARD_ID: &str = "boardId";

pub const POINTS: &str = "points";
pub const ROLE: &str = "role";

pub const FCM_TOKEN: &str = "fcmToken";
pub const NOTIFICATIONS_ENABLED: &str = "notificationsEnabled";
pub const NAME: &str = "name";

/// `boards/{boardId}/members_details`
pub fn members_collection(board_id: &BoardId) -> String {
    format!("{BOARDS}/{board_id}/{MEMBERS_DETAILS}")
}

pub fn task_path(task_id: &TaskId) -> Result<DocumentPath, DocumentStoreError> {
    DocumentPath::new(TASKS, task_id.as_str())
}

pub fn member_path(board_id: &BoardId, member_id: &MemberId) -> Result<DocumentPath, DocumentStoreError> {
    DocumentPath::new(members_collection(board_id), member_id.as_str())
}

pub fn user_path(user_id: &UserId) -> Result<DocumentPath, DocumentStoreError> {
    DocumentPath::new(USERS, user_id.as_str())
}

pub fn board_path(board_id: &BoardId) -> Result<DocumentPath, DocumentStoreError> {
    DocumentPath::new(BOARDS, board_id.as_str())
}

/// Decode a task document returned by the overdue scan.
///
/// Returns `None` only when the document id itself is not a usable task id.
pub fn decode_overdue_task(doc: &Document) -> Option<OverdueTask> {
    let id = TaskId::new(doc.id()).ok()?;

    Some(OverdueTask {
        id,
        board_id: doc
            .get(BOARD_ID)
            .and_then(FieldValue::as_str)
            .and_then(|s| BoardId::new(s).ok()),
        deadline: doc.get(DEADLINE).and_then(FieldValue::as_timestamp),
        status: doc
            .get(STATUS)
            .and_then(FieldValue::as_str)
            .map(TaskStatus::from),
        penalty_applied: doc
            .get(PENALTY_APPLIED)
            .and_then(FieldValue::as_bool)
            .unwrap_or(false),
        penalty_points: doc.get(PENALTY_POINTS).and_then(FieldValue::as_i64),
        assigned_members: doc.get(ASSIGNED_MEMBERS).and_then(decode_member_ids),
    })
}

// Any element that is not a valid member id makes the whole list unusable.
fn decode_member_ids(value: &FieldValue) -> Option<Vec<MemberId>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().and_then(|s| MemberId::new(s).ok()))
        .collect()
}

/// Encode a task as the CRUD layer would store it.
pub fn encode_task(task: &OverdueTask) -> Fields {
    let mut fields = Fields::new();
    if let Some(board_id) = &task.board_id {
        fields.insert(BOARD_ID.into(), board_id.as_str().into());
    }
    if let Some(deadline) = task.deadline {
        fields.insert(DEADLINE.into(), deadline.into());
    }
    if let Some(status) = &task.status {
        fields.insert(STATUS.into(), status.as_str().into());
    }
    fields.insert(PENALTY_APPLIED.into(), task.penalty_applied.into());
    if let Some(points) = task.penalty_points {
        fields.insert(PENALTY_POINTS.into(), points.into());
    }
    if let Some(members) = &task.assigned_members {
        fields.insert(
            ASSIGNED_MEMBERS.into(),
            members.iter().map(|m| m.as_str()).collect::<Vec<_>>().into(),
        );
    }
    fields
}

/// Board and member addressed by `boards/{boardId}/members_details/{memberId}`.
pub fn parse_member_path(path: &DocumentPath) -> Option<(BoardId, MemberId)> {
    let segments: Vec<&str> = path.collection().split('/').collect();
    let [BOARDS, board_id, MEMBERS_DETAILS] = segments.as_slice() else {
        return None;
    };
    Some((BoardId::new(*board_id).ok()?, MemberId::new(path.id()).ok()?))
}

/// Decode a `members_details` document.
pub fn decode_member(doc: &Document) -> Option<BoardMember> {
    let (board_id, member_id) = parse_member_path(&doc.path)?;

    let mut member = BoardMember::new(
        board_id,
        member_id,
        doc.get(POINTS).and_then(FieldValue::as_i64).unwrap_or(0),
    );
    if let Some(role) = doc.get(ROLE).and_then(FieldValue::as_str) {
        member = member.with_role(role);
    }
    Some(member)
}

pub fn encode_member(member: &BoardMember) -> Fields {
    let mut fields = Fields::new();
    fields.insert(POINTS.into(), member.points.into());
    if let Some(role) = &member.role {
        fields.insert(ROLE.into(), role.as_str().into());
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn doc(path: &str, fields: Fields) -> Document {
        Document::new(DocumentPath::parse(path).unwrap(), fields)
    }

    #[test]
    fn task_round_trips_through_its_document() {
        let task = OverdueTask::new(TaskId::new("t1").unwrap())
            .with_board(BoardId::new("b1").unwrap())
            .with_deadline(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .with_status(TaskStatus::InReview)
            .with_penalty_points(5)
            .with_assigned_members(vec![MemberId::new("m1").unwrap()]);

        let decoded = decode_overdue_task(&doc("tasks/t1", encode_task(&task))).unwrap();
        assert_eq!(decoded, task);
    }

    #[test]
    fn wrong_types_decode_as_absent() {
        let mut fields = Fields::new();
        fields.insert(BOARD_ID.into(), 42i64.into());
        fields.insert(PENALTY_POINTS.into(), 2.5f64.into());
        fields.insert(ASSIGNED_MEMBERS.into(), "m1".into());

        let task = decode_overdue_task(&doc("tasks/t1", fields)).unwrap();
        assert_eq!(task.board_id, None);
        assert_eq!(task.penalty_points, None);
        assert_eq!(task.assigned_members, None);
        assert!(!task.penalty_applied);
    }

    #[test]
    fn empty_board_id_decodes_as_absent() {
        let mut fields = Fields::new();
        fields.insert(BOARD_ID.into(), "".into());
        let task = decode_overdue_task(&doc("tasks/t1", fields)).unwrap();
        assert_eq!(task.board_id, None);
    }

    #[test]
    fn member_list_with_bad_entry_decodes_as_absent() {
        let mut fields = Fields::new();
        fields.insert(
            ASSIGNED_MEMBERS.into(),
            FieldValue::Array(vec!["m1".into(), FieldValue::Integer(3)]),
        );
        let task = decode_overdue_task(&doc("tasks/t1", fields)).unwrap();
        assert_eq!(task.assigned_members, None);
    }

    #[test]
    fn integral_double_points_are_accepted() {
        let mut fields = Fields::new();
        fields.insert(PENALTY_POINTS.into(), 5.0f64.into());
        let task = decode_overdue_task(&doc("tasks/t1", fields)).unwrap();
        assert_eq!(task.penalty_points, Some(5));
    }

    #[test]
    fn member_is_decoded_from_nested_path() {
        let member = BoardMember::new(BoardId::new("b1").unwrap(), MemberId::new("m1").unwrap(), -2)
            .with_role("admin");
        let decoded = decode_member(&doc("boards/b1/members_details/m1", encode_member(&member))).unwrap();
        assert_eq!(decoded, member);

        assert!(decode_member(&doc("tasks/t1", Fields::new())).is_none());
    }

    #[test]
    fn paths_follow_layout() {
        let board = BoardId::new("b1").unwrap();
        let member = MemberId::new("m1").unwrap();
        assert_eq!(
            member_path(&board, &member).unwrap().to_string(),
            "boards/b1/members_details/m1"
        );
        assert_eq!(task_path(&TaskId::new("t1").unwrap()).unwrap().to_string(), "tasks/t1");
        assert_eq!(user_path(&UserId::new("u1").unwrap()).unwrap().to_string(), "users/u1");
        assert_eq!(board_path(&board).unwrap().to_string(), "boards/b1");
    }

    #[test]
    fn member_paths_are_recognised() {
        let parsed = parse_member_path(&DocumentPath::parse("boards/b1/members_details/m1").unwrap());
        assert_eq!(
            parsed,
            Some((BoardId::new("b1").unwrap(), MemberId::new("m1").unwrap()))
        );

        for other in ["tasks/t1", "boards/b1", "boards/b1/columns/c1", "users/u1"] {
            assert_eq!(parse_member_path(&DocumentPath::parse(other).unwrap()), None, "{other}");
        }
    }
}
