//! Push notifications sent when a member joins a board.

pub mod dispatcher;
pub mod listener;
pub mod member_added;

pub use dispatcher::{DispatchError, InMemoryDispatcher, NotificationDispatcher, PushMessage, TracingDispatcher};
pub use listener::{ListenerHandle, ListenerStats};
pub use member_added::{MemberAddedNotifier, NotificationOutcome};
