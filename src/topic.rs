use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashSet;

/// Longest topic name the log accepts
pub const MAX_TOPIC_LENGTH: usize = 249;

/// Check a topic name against the characters a partitioned log accepts
pub fn validate_topic_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidTopic("Topic name cannot be empty".into()));
    }
    if name.len() > MAX_TOPIC_LENGTH {
        return Err(Error::InvalidTopic(format!(
            "Topic name longer than {MAX_TOPIC_LENGTH} characters"
        )));
    }
    if name == "." || name == ".." {
        return Err(Error::InvalidTopic(format!("Topic name cannot be {name:?}")));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(Error::InvalidTopic(format!(
            "Topic name {name:?} contains illegal character {c:?}"
        )));
    }
    Ok(())
}

/// Outcome of a write-locked admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Admitted,
    AlreadyKnown,
    Full,
}

/// Bounded set of topics known to the broker.
///
/// `len() <= capacity()` holds at all times: the capacity check and the
/// insert happen under the same write lock.
pub(crate) struct TopicRegistry {
    known: RwLock<HashSet<String>>,
    capacity: usize,
}

impl TopicRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            known: RwLock::new(HashSet::new()),
            capacity,
        }
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.known.read().contains(topic)
    }

    pub fn is_full(&self) -> bool {
        self.known.read().len() >= self.capacity
    }

    pub fn try_admit(&self, topic: &str) -> Admission {
        let mut known = self.known.write();
        if known.contains(topic) {
            return Admission::AlreadyKnown;
        }
        if known.len() >= self.capacity {
            return Admission::Full;
        }
        known.insert(topic.to_string());
        Admission::Admitted
    }

    pub fn len(&self) -> usize {
        self.known.read().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.known.read().iter().cloned().collect();
        names.sort_unstable();
        names
    }
}
