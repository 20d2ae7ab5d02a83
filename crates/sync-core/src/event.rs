//! Canonical change events.
//!
//! Both the live feed and the snapshot scan normalize into [`ChangeEvent`],
//! so the apply path never sees a source-specific shape.

use crate::values::Document;
use chrono::{DateTime, Utc};
use std::fmt;

/// Operation vocabulary of the source live feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Insert,
    Replace,
    Update,
    Delete,
    Rename,
    Drop,
    DropDatabase,
    Invalidate,
}

impl OperationKind {
    /// Every operation kind, in vocabulary order.
    pub const ALL: [OperationKind; 8] = [
        Self::Insert,
        Self::Replace,
        Self::Update,
        Self::Delete,
        Self::Rename,
        Self::Drop,
        Self::DropDatabase,
        Self::Invalidate,
    ];

    /// Parse an operation name case-insensitively.
    ///
    /// Returns `None` for names outside the vocabulary.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(name.trim()))
    }

    /// Parse a list of operation names, silently dropping unrecognized ones.
    pub fn parse_all<S: AsRef<str>>(names: &[S]) -> Vec<Self> {
        let mut ops = Vec::new();
        for name in names {
            if let Some(op) = Self::parse(name.as_ref()) {
                if !ops.contains(&op) {
                    ops.push(op);
                }
            }
        }
        ops
    }

    /// Wire name as used by the source feed's `operationType`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Replace => "replace",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Rename => "rename",
            Self::Drop => "drop",
            Self::DropDatabase => "dropDatabase",
            Self::Invalidate => "invalidate",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream lifecycle signal. Carries no document data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// The underlying feed or cursor was released
    Closed,
    /// The feed or cursor reached its end
    Ended,
    /// The feed reported an error
    Errored,
}

impl fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Ended => "ended",
            Self::Errored => "errored",
        })
    }
}

/// Database/collection a change was observed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub database: String,
    pub collection: Option<String>,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.collection {
            Some(coll) => write!(f, "{}.{}", self.database, coll),
            None => f.write_str(&self.database),
        }
    }
}

/// Diagnostic metadata carried by data events. Never affects apply semantics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventMeta {
    /// Source-side time of the change, if the source provides one
    pub source_time: Option<DateTime<Utc>>,
    /// Source namespace, if the source provides one
    pub namespace: Option<Namespace>,
}

/// A single mutation, independent of source or sink shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// A new document
    Insert { document: Document, meta: EventMeta },

    /// A partial modification of existing row(s)
    Update {
        /// Fields to set to new values
        set: Document,
        /// Fields to clear, in source order
        unset: Vec<String>,
        /// Fields identifying the target row(s)
        identity: Document,
        meta: EventMeta,
    },

    /// Removal of existing row(s)
    Delete { identity: Document, meta: EventMeta },

    /// A feed operation the pipeline does not model (rename, drop, ...)
    Unsupported {
        operation: OperationKind,
        meta: EventMeta,
    },

    /// Stream lifecycle signal
    Control(ControlSignal),
}

impl ChangeEvent {
    pub fn insert(document: Document) -> Self {
        Self::Insert {
            document,
            meta: EventMeta::default(),
        }
    }

    pub fn update(set: Document, unset: Vec<String>, identity: Document) -> Self {
        Self::Update {
            set,
            unset,
            identity,
            meta: EventMeta::default(),
        }
    }

    pub fn delete(identity: Document) -> Self {
        Self::Delete {
            identity,
            meta: EventMeta::default(),
        }
    }

    /// Attach diagnostic metadata to a data event. Control events are returned unchanged.
    pub fn with_meta(mut self, new_meta: EventMeta) -> Self {
        match &mut self {
            Self::Insert { meta, .. }
            | Self::Update { meta, .. }
            | Self::Delete { meta, .. }
            | Self::Unsupported { meta, .. } => *meta = new_meta,
            Self::Control(_) => {}
        }
        self
    }

    /// Metadata of a data event.
    pub fn meta(&self) -> Option<&EventMeta> {
        match self {
            Self::Insert { meta, .. }
            | Self::Update { meta, .. }
            | Self::Delete { meta, .. }
            | Self::Unsupported { meta, .. } => Some(meta),
            Self::Control(_) => None,
        }
    }

    /// Short variant name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Unsupported { .. } => "unsupported",
            Self::Control(_) => "control",
        }
    }
}
