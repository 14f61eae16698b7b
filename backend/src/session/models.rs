//! Session data models
//!
//! Read-only projections of library records, built fresh on every fetch or
//! event. Nothing here is cached or persisted.

use crate::library::{Identity, PeerInfo, RemoteConversation};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Label used whenever a name cannot be resolved
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Text shown for messages without a text body
pub const NO_TEXT_LABEL: &str = "(no text)";

/// Kind of conversation, for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    /// Broadcast channel
    Channel,
    /// Megagroup or basic group
    Group,
    /// Anything else (users, bots)
    Direct,
}

impl ConversationKind {
    /// Display label
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::Channel => "Channel",
            ConversationKind::Group => "Group",
            ConversationKind::Direct => "Direct",
        }
    }
}

/// A conversation as shown in the dialog list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Numeric peer id
    pub id: i64,
    /// Title, first name, or "Unknown"
    pub title: String,
    /// Public username, if any
    pub username: Option<String>,
    /// Member count, 0 when unknown
    pub member_count: u32,
    /// Display kind
    pub kind: ConversationKind,
    /// Broadcast flag
    pub is_channel: bool,
    /// Megagroup or basic group flag
    pub is_group: bool,
}

impl ConversationSummary {
    /// Project a library record
    pub fn from_remote(remote: &RemoteConversation) -> Self {
        let is_channel = remote.broadcast;
        let is_group = remote.megagroup || remote.kind_tag == "Chat";
        let kind = if is_channel {
            ConversationKind::Channel
        } else if is_group {
            ConversationKind::Group
        } else {
            ConversationKind::Direct
        };

        Self {
            id: remote.id,
            title: first_present(&[&remote.title, &remote.first_name]),
            username: remote.username.clone().filter(|u| !u.is_empty()),
            member_count: remote.participants_count.unwrap_or(0),
            kind,
            is_channel,
            is_group,
        }
    }

    /// Value used to prefill the send-target field: username, else numeric id
    pub fn target_field(&self) -> String {
        match &self.username {
            Some(username) => username.clone(),
            None => self.id.to_string(),
        }
    }

    /// One-line info string: id, username, member count
    pub fn info_line(&self) -> String {
        let username = match &self.username {
            Some(username) => format!("@{}", username),
            None => "No username".to_string(),
        };
        format!(
            "ID: {} | {} | {} members",
            self.id, username, self.member_count
        )
    }
}

/// Result of a conversation fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationListing {
    /// One summary per fetched record, in library order
    pub summaries: Vec<ConversationSummary>,
    /// Number of broadcast channels
    pub channel_count: usize,
    /// Number of groups
    pub group_count: usize,
}

impl ConversationListing {
    /// Classify a page of library records
    pub fn from_remote(records: &[RemoteConversation]) -> Self {
        let summaries: Vec<ConversationSummary> =
            records.iter().map(ConversationSummary::from_remote).collect();
        let channel_count = summaries.iter().filter(|s| s.is_channel).count();
        let group_count = summaries.iter().filter(|s| s.is_group).count();
        Self {
            summaries,
            channel_count,
            group_count,
        }
    }

    /// True when the remote set was empty
    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}

/// The conversation chosen as the send target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Numeric id recorded as the selected target
    pub target_id: i64,
    /// Value to put in the target input field
    pub target_field: String,
    /// Title for the status line
    pub title: String,
}

impl Selection {
    /// Selection for a listed conversation
    pub fn of(summary: &ConversationSummary) -> Self {
        Self {
            target_id: summary.id,
            target_field: summary.target_field(),
            title: summary.title.clone(),
        }
    }
}

/// A delivered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// The target the message went to
    pub target: String,
}

/// An incoming message as shown in the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessageView {
    /// Sender display name
    pub sender_name: String,
    /// Chat display name
    pub chat_name: String,
    /// Message text, or "(no text)"
    pub text: String,
    /// Message date
    pub timestamp: DateTime<Utc>,
}

impl IncomingMessageView {
    /// Build a view from resolved parts
    ///
    /// Unresolved peers become "Unknown"; an unrepresentable date falls back to
    /// the epoch.
    pub fn new(
        sender: Option<&PeerInfo>,
        chat: Option<&PeerInfo>,
        text: &str,
        date: i64,
    ) -> Self {
        Self {
            sender_name: sender.map(sender_label).unwrap_or_else(unknown),
            chat_name: chat.map(chat_label).unwrap_or_else(unknown),
            text: if text.is_empty() {
                NO_TEXT_LABEL.to_string()
            } else {
                text.to_string()
            },
            timestamp: DateTime::from_timestamp(date, 0).unwrap_or_default(),
        }
    }

    /// "{sender} in {chat}"
    pub fn heading(&self) -> String {
        format!("{} in {}", self.sender_name, self.chat_name)
    }

    /// Date rendered in the local time zone
    pub fn local_time_label(&self) -> String {
        self.timestamp
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

/// Sender names prefer the first name, then the title
pub fn sender_label(peer: &PeerInfo) -> String {
    first_present(&[&peer.first_name, &peer.title])
}

/// Chat names prefer the title, then the first name
pub fn chat_label(peer: &PeerInfo) -> String {
    first_present(&[&peer.title, &peer.first_name])
}

/// "Connected as" label for an identity
pub fn identity_label(identity: &Identity) -> String {
    let name = identity
        .first_name
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or("User");
    let username = identity
        .username
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or("no username");
    format!("{} (@{})", name, username)
}

fn first_present(candidates: &[&Option<String>]) -> String {
    candidates
        .iter()
        .filter_map(|c| c.as_deref())
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(unknown)
}

fn unknown() -> String {
    UNKNOWN_LABEL.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(id: i64) -> RemoteConversation {
        RemoteConversation {
            id,
            ..Default::default()
        }
    }

    #[test]
    fn test_classification_flags_are_independent() {
        let channel = ConversationSummary::from_remote(&RemoteConversation {
            broadcast: true,
            kind_tag: "Channel".to_string(),
            ..remote(1)
        });
        assert_eq!(channel.kind, ConversationKind::Channel);
        assert!(channel.is_channel && !channel.is_group);

        let megagroup = ConversationSummary::from_remote(&RemoteConversation {
            megagroup: true,
            kind_tag: "Channel".to_string(),
            ..remote(2)
        });
        assert_eq!(megagroup.kind, ConversationKind::Group);

        let basic = ConversationSummary::from_remote(&RemoteConversation {
            kind_tag: "Chat".to_string(),
            ..remote(3)
        });
        assert_eq!(basic.kind, ConversationKind::Group);
        assert!(basic.is_group);

        let user = ConversationSummary::from_remote(&RemoteConversation {
            kind_tag: "User".to_string(),
            ..remote(4)
        });
        assert_eq!(user.kind, ConversationKind::Direct);
        assert!(!user.is_channel && !user.is_group);
    }

    #[test]
    fn test_title_fallbacks() {
        let titled = ConversationSummary::from_remote(&RemoteConversation {
            title: Some("Rust".to_string()),
            first_name: Some("ignored".to_string()),
            ..remote(1)
        });
        assert_eq!(titled.title, "Rust");

        let named = ConversationSummary::from_remote(&RemoteConversation {
            first_name: Some("Ada".to_string()),
            ..remote(2)
        });
        assert_eq!(named.title, "Ada");

        assert_eq!(ConversationSummary::from_remote(&remote(3)).title, "Unknown");
    }

    #[test]
    fn test_target_field_prefers_username() {
        let with_username = ConversationSummary::from_remote(&RemoteConversation {
            username: Some("rustlang".to_string()),
            ..remote(10)
        });
        assert_eq!(with_username.target_field(), "rustlang");

        let without = ConversationSummary::from_remote(&remote(-100123));
        assert_eq!(without.target_field(), "-100123");
        assert_eq!(without.info_line(), "ID: -100123 | No username | 0 members");
    }

    #[test]
    fn test_listing_counts() {
        let records = vec![
            RemoteConversation {
                broadcast: true,
                ..remote(1)
            },
            RemoteConversation {
                megagroup: true,
                ..remote(2)
            },
            RemoteConversation {
                kind_tag: "Chat".to_string(),
                ..remote(3)
            },
            remote(4),
        ];
        let listing = ConversationListing::from_remote(&records);
        assert_eq!(listing.summaries.len(), 4);
        assert_eq!(listing.channel_count, 1);
        assert_eq!(listing.group_count, 2);
        assert!(ConversationListing::from_remote(&[]).is_empty());
    }

    #[test]
    fn test_message_view_labels() {
        let sender = PeerInfo {
            first_name: Some("Ada".to_string()),
            title: Some("ignored".to_string()),
        };
        let chat = PeerInfo {
            first_name: None,
            title: Some("Rustaceans".to_string()),
        };
        let view = IncomingMessageView::new(Some(&sender), Some(&chat), "hello", 1_700_000_000);
        assert_eq!(view.heading(), "Ada in Rustaceans");
        assert_eq!(view.text, "hello");
        assert_eq!(view.timestamp.timestamp(), 1_700_000_000);

        let bare = IncomingMessageView::new(None, Some(&PeerInfo::default()), "", 0);
        assert_eq!(bare.sender_name, "Unknown");
        assert_eq!(bare.chat_name, "Unknown");
        assert_eq!(bare.text, "(no text)");
    }

    #[test]
    fn test_identity_label() {
        let full = Identity {
            first_name: Some("Ada".to_string()),
            username: Some("ada".to_string()),
        };
        assert_eq!(identity_label(&full), "Ada (@ada)");
        assert_eq!(identity_label(&Identity::default()), "User (@no username)");
    }
}
