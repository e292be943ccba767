use serde::{Deserialize, Serialize};

use taskboard_core::{BoardId, MemberId};

/// A member's standing on one board.
///
/// Balances have no lower bound: penalties can drive `points` negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardMember {
    pub board_id: BoardId,
    pub member_id: MemberId,
    pub points: i64,
    pub role: Option<String>,
}

impl BoardMember {
    pub fn new(board_id: BoardId, member_id: MemberId, points: i64) -> Self {
        Self {
            board_id,
            member_id,
            points,
            role: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}
