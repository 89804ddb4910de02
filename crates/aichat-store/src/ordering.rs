//! List surgery for the newest-first message view.
//!
//! Every helper here keeps `messages` sorted by `created_at` descending and
//! free of duplicate ids.

use uuid::Uuid;

use aichat_types::chat::ChatMessage;

pub(crate) fn is_newest_first(messages: &[ChatMessage]) -> bool {
    messages.windows(2).all(|w| w[0].created_at >= w[1].created_at)
}

/// Insert `message` at its time position, replacing any entry with the same id.
///
/// Equal timestamps go after the existing ones, so inserting an answer
/// before its query keeps the answer on top.
pub(crate) fn insert_sorted(messages: &mut Vec<ChatMessage>, message: ChatMessage) -> bool {
    let existed = remove_id(messages, &message);
    let pos = messages.partition_point(|m| m.created_at >= message.created_at);
    messages.insert(pos, message);
    !existed
}

fn remove_id(messages: &mut Vec<ChatMessage>, message: &ChatMessage) -> bool {
    match messages.iter().position(|m| m.id == message.id) {
        Some(pos) => {
            messages.remove(pos);
            true
        }
        None => false,
    }
}

/// Merge a fetched page. Returns how many ids were new.
pub(crate) fn merge(messages: &mut Vec<ChatMessage>, fetched: Vec<ChatMessage>) -> usize {
    fetched
        .into_iter()
        .map(|m| insert_sorted(messages, m))
        .filter(|added| *added)
        .count()
}

/// Drop both optimistic entries of one send. Returns how many were removed.
pub(crate) fn remove_send(messages: &mut Vec<ChatMessage>, client_id: Uuid) -> usize {
    let before = messages.len();
    messages.retain(|m| m.id.client_id() != Some(client_id));
    before - messages.len()
}
