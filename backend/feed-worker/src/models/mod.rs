use serde::{Deserialize, Serialize};
use std::fmt;

/// A published post, as emitted by the posting service.
///
/// Wire names are the publisher's: `{"user_id": ..., "tweet_id": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostEvent {
    #[serde(rename = "user_id")]
    pub author_id: String,
    #[serde(rename = "tweet_id")]
    pub post_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed post event: {0}")]
    Json(#[from] serde_json::Error),

    #[error("post event field {0} is empty")]
    EmptyField(&'static str),
}

impl PostEvent {
    /// Decode a raw delivery body. Both ids must be non-empty.
    pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
        let event: PostEvent = serde_json::from_slice(body)?;

        if event.author_id.is_empty() {
            return Err(DecodeError::EmptyField("user_id"));
        }
        if event.post_id.is_empty() {
            return Err(DecodeError::EmptyField("tweet_id"));
        }

        Ok(event)
    }
}

/// One recipient of a fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Follower {
    pub follower_id: String,
}

impl Follower {
    pub fn new(follower_id: impl Into<String>) -> Self {
        Self {
            follower_id: follower_id.into(),
        }
    }
}

/// Why a delivery was handed back to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    MalformedEvent,
    ResolverUnavailable,
    FeedWriteFailed,
}

impl FailureCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCause::MalformedEvent => "malformed_event",
            FailureCause::ResolverUnavailable => "resolver_unavailable",
            FailureCause::FeedWriteFailed => "feed_write_failed",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision for one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ack,
    Nack { requeue: bool, cause: FailureCause },
}

impl Outcome {
    pub fn requeue(cause: FailureCause) -> Self {
        Outcome::Nack {
            requeue: true,
            cause,
        }
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Outcome::Ack)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Ack => "ack",
            Outcome::Nack { requeue: true, .. } => "nack_requeue",
            Outcome::Nack { requeue: false, .. } => "nack_discard",
        }
    }
}

/// Counters for one fan-out attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub followers: usize,
    pub delivered: usize,
    pub already_delivered: usize,
    pub trim_failures: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_event_decode() {
        let event = PostEvent::decode(br#"{"user_id":"author1","tweet_id":"tweet123"}"#).unwrap();
        assert_eq!(event.author_id, "author1");
        assert_eq!(event.post_id, "tweet123");
    }

    #[test]
    fn test_post_event_ignores_unknown_fields() {
        let event = PostEvent::decode(
            br#"{"user_id":"a","tweet_id":"t","content":"hello","created_at":1}"#,
        )
        .unwrap();
        assert_eq!(event.post_id, "t");
    }

    #[test]
    fn test_post_event_rejects_malformed() {
        assert!(matches!(
            PostEvent::decode(b"not json"),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            PostEvent::decode(br#"{"user_id":"author1"}"#),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            PostEvent::decode(br#"{"user_id":1,"tweet_id":"t"}"#),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            PostEvent::decode(br#"{"user_id":"","tweet_id":"t"}"#),
            Err(DecodeError::EmptyField("user_id"))
        ));
        assert!(matches!(
            PostEvent::decode(br#"{"user_id":"a","tweet_id":""}"#),
            Err(DecodeError::EmptyField("tweet_id"))
        ));
    }

    #[test]
    fn test_post_event_wire_names() {
        let json = serde_json::to_string(&PostEvent {
            author_id: "author1".into(),
            post_id: "tweet123".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"user_id":"author1","tweet_id":"tweet123"}"#);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Outcome::Ack.label(), "ack");
        assert_eq!(
            Outcome::requeue(FailureCause::FeedWriteFailed).label(),
            "nack_requeue"
        );
        assert!(!Outcome::requeue(FailureCause::MalformedEvent).is_ack());
        assert_eq!(FailureCause::ResolverUnavailable.to_string(), "resolver_unavailable");
    }
}
