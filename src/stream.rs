use std::{
    collections::BTreeMap,
    fmt,
    ops::Bound,
    str::FromStr,
};

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum StreamIdError {
    #[error("ERR The ID specified in XADD must be greater than 0-0")]
    Invalid,
    #[error("ERR The ID specified in XADD is equal or smaller than the target stream top item")]
    Stale,
    #[error("ERR Invalid stream ID specified as stream command argument")]
    Malformed,
}

/// `<milliseconds>-<sequence>`, ordered lexicographically on the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const ZERO: StreamId = StreamId { ms: 0, seq: 0 };

    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for StreamId {
    type Err = StreamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ms, seq) = s.split_once('-').ok_or(StreamIdError::Malformed)?;
        let ms = ms.parse::<u64>().map_err(|_| StreamIdError::Malformed)?;
        let seq = seq.parse::<u64>().map_err(|_| StreamIdError::Malformed)?;

        Ok(StreamId { ms, seq })
    }
}

/// The ID argument of `XADD`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamIdSpec {
    /// `*`
    Auto,
    /// `<ms>-*`
    AutoSequence(u64),
    /// `<ms>-<seq>`
    Explicit(StreamId),
}

impl FromStr for StreamIdSpec {
    type Err = StreamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(StreamIdSpec::Auto);
        }

        match s.split_once('-') {
            Some((ms, "*")) => {
                let ms = ms.parse::<u64>().map_err(|_| StreamIdError::Malformed)?;
                Ok(StreamIdSpec::AutoSequence(ms))
            }
            _ => Ok(StreamIdSpec::Explicit(s.parse::<StreamId>()?)),
        }
    }
}

pub type StreamFields = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stream {
    entries: BTreeMap<StreamId, StreamFields>,
    last_id: StreamId,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_id(&self) -> StreamId {
        self.last_id
    }

    pub fn first_id(&self) -> Option<StreamId> {
        self.entries.keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StreamId, &StreamFields)> {
        self.entries.iter()
    }

    /// Turns an `XADD` ID argument into a concrete ID and validates it against
    /// the current top item.
    pub fn resolve_id(&self, spec: StreamIdSpec, now_ms: u64) -> Result<StreamId, StreamIdError> {
        let id = match spec {
            StreamIdSpec::Explicit(id) => id,
            StreamIdSpec::AutoSequence(ms) => StreamId::new(ms, self.next_sequence(ms)?),
            StreamIdSpec::Auto => {
                let ms = now_ms.max(self.last_id.ms);
                StreamId::new(ms, self.next_sequence(ms)?)
            }
        };

        if id == StreamId::ZERO {
            return Err(StreamIdError::Invalid);
        }

        if id <= self.last_id {
            return Err(StreamIdError::Stale);
        }

        Ok(id)
    }

    // An empty stream has a last ID of 0-0, so ms 0 starts at sequence 1.
    fn next_sequence(&self, ms: u64) -> Result<u64, StreamIdError> {
        if ms < self.last_id.ms {
            return Err(StreamIdError::Stale);
        }

        if ms == self.last_id.ms {
            return self.last_id.seq.checked_add(1).ok_or(StreamIdError::Stale);
        }

        Ok(0)
    }

    pub fn add(
        &mut self,
        spec: StreamIdSpec,
        fields: StreamFields,
        now_ms: u64,
    ) -> Result<StreamId, StreamIdError> {
        let id = self.resolve_id(spec, now_ms)?;
        self.insert_entry(id, fields);

        Ok(id)
    }

    /// Inserts without validation. Used when restoring snapshots.
    pub fn insert_entry(&mut self, id: StreamId, fields: StreamFields) {
        self.entries.insert(id, fields);
        self.last_id = self.last_id.max(id);
    }

    pub fn set_last_id(&mut self, id: StreamId) {
        self.last_id = self.last_id.max(id);
    }

    /// Entries with `start <= id <= end`, in ID order.
    pub fn range(&self, start: StreamId, end: StreamId) -> Vec<(&StreamId, &StreamFields)> {
        if start > end {
            return Vec::new();
        }

        self.entries.range(start..=end).collect()
    }

    /// Up to `count` entries with an ID strictly greater than `after`.
    pub fn entries_after(&self, after: StreamId, count: usize) -> Vec<(&StreamId, &StreamFields)> {
        self.entries
            .range((Bound::Excluded(after), Bound::Unbounded))
            .take(count)
            .collect()
    }
}
