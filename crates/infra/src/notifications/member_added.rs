use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use taskboard_core::{BoardId, MemberId, UserId};

use crate::document_store::{DocumentStore, DocumentStoreError, FieldValue};
use crate::penalties::records;

use super::dispatcher::{NotificationDispatcher, PushMessage};

pub const DEFAULT_BOARD_NAME: &str = "a board";
pub const TITLE: &str = "You've been added to a board";

/// What the member-added trigger did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotificationOutcome {
    Sent,
    UserNotFound,
    NotificationsDisabled,
    MissingToken,
    /// Delivery failed; logged and not retried.
    SendFailed { reason: String },
}

/// Notifies a user when they are added to a board.
///
/// Runs when a `boards/{boardId}/members_details/{memberId}` document is
/// created. Store read failures are returned to the caller; everything else
/// ends in a `NotificationOutcome`.
pub struct MemberAddedNotifier<S: ?Sized, D: ?Sized> {
    store: Arc<S>,
    dispatcher: Arc<D>,
}

impl<S, D> MemberAddedNotifier<S, D>
where
    S: DocumentStore + ?Sized,
    D: NotificationDispatcher + ?Sized,
{
    pub fn new(store: Arc<S>, dispatcher: Arc<D>) -> Self {
        Self { store, dispatcher }
    }

    #[instrument(skip_all, fields(board_id = %board_id, member_id = %member_id))]
    pub async fn on_member_added(
        &self,
        board_id: &BoardId,
        member_id: &MemberId,
    ) -> Result<NotificationOutcome, DocumentStoreError> {
        let user_id = UserId::from(member_id.clone());
        let Some(user) = self.store.get(&records::user_path(&user_id)?).await? else {
            error!("user document not found for new board member");
            return Ok(NotificationOutcome::UserNotFound);
        };

        // Only an explicit `false` opts out.
        if user.get(records::NOTIFICATIONS_ENABLED).and_then(FieldValue::as_bool) == Some(false) {
            info!("user has notifications disabled; not sending");
            return Ok(NotificationOutcome::NotificationsDisabled);
        }

        let token = match user.get(records::FCM_TOKEN).and_then(FieldValue::as_str) {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => {
                info!("user has no push token registered; not sending");
                return Ok(NotificationOutcome::MissingToken);
            }
        };

        let board_name = self
            .store
            .get(&records::board_path(board_id)?)
            .await?
            .and_then(|board| {
                board
                    .get(records::NAME)
                    .and_then(FieldValue::as_str)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| DEFAULT_BOARD_NAME.to_string());

        let message = PushMessage {
            token,
            title: TITLE.to_string(),
            body: format!("You have been added to the board '{board_name}'."),
        };

        match self.dispatcher.send(message).await {
            Ok(()) => {
                info!("member-added notification sent");
                Ok(NotificationOutcome::Sent)
            }
            Err(e) => {
                error!(error = %e, "failed to send member-added notification");
                Ok(NotificationOutcome::SendFailed {
                    reason: e.to_string(),
                })
            }
        }
    }
}
