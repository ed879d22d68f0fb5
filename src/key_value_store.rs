use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap, VecDeque},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use thiserror::Error;
use tokio::time::Instant;

use crate::stream::Stream;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum StoreError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    String(String),
    Integer(i64),
    List(VecDeque<String>),
    Stream(Stream),
}

impl DataType {
    /// Name reported by `TYPE`. Integers are strings as far as clients are concerned.
    pub fn type_name(&self) -> &'static str {
        match self {
            DataType::String(_) | DataType::Integer(_) => "string",
            DataType::List(_) => "list",
            DataType::Stream(_) => "stream",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub data: DataType,
    pub expiration: Option<Instant>,
}

impl Value {
    pub fn new(data: DataType) -> Self {
        Self {
            data,
            expiration: None,
        }
    }

    /// The deadline as wall-clock milliseconds, for snapshots.
    pub fn expires_at_unix_ms(&self) -> Option<u64> {
        let deadline = self.expiration?;
        let remaining = deadline.saturating_duration_since(Instant::now());

        Some(unix_time_ms() + remaining.as_millis() as u64)
    }
}

pub fn unix_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}

/// Maps a wall-clock deadline onto the monotonic clock.
///
/// Returns `None` when the deadline has already passed.
pub fn deadline_from_unix_ms(expires_at: u64) -> Option<Instant> {
    let remaining = expires_at.checked_sub(unix_time_ms()).filter(|ms| *ms > 0)?;

    Some(Instant::now() + Duration::from_millis(remaining))
}

/// The keyspace.
///
/// Expirations are tracked in a min-heap of `(deadline, key)` pairs. Every read
/// first pops the deadlines that have passed and removes the key only if its
/// current deadline still matches, so overwritten keys are never evicted by a
/// stale heap entry.
#[derive(Debug, Default)]
pub struct KeyValueStore {
    entries: HashMap<String, Value>,
    expirations: BinaryHeap<Reverse<(Instant, String)>>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evict_expired(&mut self) {
        let now = Instant::now();

        while let Some(Reverse((deadline, _))) = self.expirations.peek() {
            if *deadline > now {
                break;
            }

            let Some(Reverse((deadline, key))) = self.expirations.pop() else {
                break;
            };

            if self
                .entries
                .get(&key)
                .is_some_and(|value| value.expiration == Some(deadline))
            {
                self.entries.remove(&key);
            }
        }
    }

    pub fn get(&mut self, key: &str) -> Option<&Value> {
        self.evict_expired();
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.evict_expired();
        self.entries.get_mut(key)
    }

    /// Writes `data` under `key`, replacing whatever kind was stored before.
    pub fn set(&mut self, key: String, data: DataType, ttl: Option<Duration>) {
        let expiration = ttl.map(|ttl| Instant::now() + ttl);
        self.insert_value(key, Value { data, expiration });
    }

    pub fn insert_value(&mut self, key: String, value: Value) {
        if let Some(deadline) = value.expiration {
            self.expirations.push(Reverse((deadline, key.clone())));
        }

        self.entries.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.evict_expired();
        self.entries.remove(key)
    }

    pub fn type_of(&mut self, key: &str) -> &'static str {
        self.get(key)
            .map(|value| value.data.type_name())
            .unwrap_or("none")
    }

    /// Increments the integer stored at `key`, creating it as 1 when absent.
    ///
    /// The entry is updated in place so an existing TTL survives.
    pub fn incr(&mut self, key: &str) -> Result<i64, StoreError> {
        let Some(value) = self.get_mut(key) else {
            self.set(key.to_string(), DataType::Integer(1), None);
            return Ok(1);
        };

        let current = match &value.data {
            DataType::Integer(current) => *current,
            DataType::String(current) => current
                .parse::<i64>()
                .map_err(|_| StoreError::NotAnInteger)?,
            DataType::List(_) | DataType::Stream(_) => return Err(StoreError::WrongType),
        };

        let next = current.checked_add(1).ok_or(StoreError::NotAnInteger)?;
        value.data = DataType::Integer(next);

        Ok(next)
    }

    pub fn get_list(&mut self, key: &str) -> Result<Option<&VecDeque<String>>, StoreError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value {
                data: DataType::List(list),
                ..
            }) => Ok(Some(list)),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    pub fn get_list_mut(
        &mut self,
        key: &str,
    ) -> Result<Option<&mut VecDeque<String>>, StoreError> {
        match self.get_mut(key) {
            None => Ok(None),
            Some(Value {
                data: DataType::List(list),
                ..
            }) => Ok(Some(list)),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    /// Returns the list at `key`, creating an empty one if the key is absent.
    pub fn list_entry(&mut self, key: &str) -> Result<&mut VecDeque<String>, StoreError> {
        self.evict_expired();

        let value = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::new(DataType::List(VecDeque::new())));

        match &mut value.data {
            DataType::List(list) => Ok(list),
            _ => Err(StoreError::WrongType),
        }
    }

    /// Pops the head of the list at `key`, dropping the key once the list is empty.
    pub fn pop_list_front(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        let (popped, is_empty) = match self.get_list_mut(key)? {
            Some(list) => (list.pop_front(), list.is_empty()),
            None => return Ok(None),
        };

        if is_empty {
            self.entries.remove(key);
        }

        Ok(popped)
    }

    pub fn get_stream(&mut self, key: &str) -> Result<Option<&Stream>, StoreError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value {
                data: DataType::Stream(stream),
                ..
            }) => Ok(Some(stream)),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    pub fn get_stream_mut(&mut self, key: &str) -> Result<Option<&mut Stream>, StoreError> {
        match self.get_mut(key) {
            None => Ok(None),
            Some(Value {
                data: DataType::Stream(stream),
                ..
            }) => Ok(Some(stream)),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    /// Live entries, used when writing snapshots.
    pub fn entries(&mut self) -> impl Iterator<Item = (&String, &Value)> {
        self.evict_expired();
        self.entries.iter()
    }

    pub fn len(&mut self) -> usize {
        self.evict_expired();
        self.entries.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }
}
