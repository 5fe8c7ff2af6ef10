use crate::error::handoff::HandoffError;

use common::ErrorLocation;

use std::fmt;
use std::os::fd::RawFd;
use std::panic::Location;

/// Separates one record from the next (ASCII "record separator").
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Separates a record's description from its descriptor number (ASCII "unit separator").
pub const FIELD_SEPARATOR: char = '\u{1f}';

/// One inherited listening socket: what it listens on and which descriptor holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerRecord {
    pub description: String,
    pub file_descriptor: RawFd,
}

impl ListenerRecord {
    pub fn new(description: impl Into<String>, file_descriptor: RawFd) -> Self {
        Self {
            description: description.into(),
            file_descriptor,
        }
    }

    #[track_caller]
    fn encode_into(&self, out: &mut String) -> Result<(), HandoffError> {
        if self.description.is_empty() {
            return Err(HandoffError::MalformedHandoffRecord {
                message: format!(
                    "Listener on descriptor {} has an empty description",
                    self.file_descriptor
                ),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if self
            .description
            .contains([RECORD_SEPARATOR, FIELD_SEPARATOR])
        {
            return Err(HandoffError::MalformedHandoffRecord {
                message: format!(
                    "Description {:?} contains a handoff separator byte",
                    self.description
                ),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        out.push_str(&self.description);
        out.push(FIELD_SEPARATOR);
        out.push_str(&self.file_descriptor.to_string());
        Ok(())
    }

    #[track_caller]
    fn decode(index: usize, raw: &str) -> Result<Self, HandoffError> {
        let mut fields = raw.split(FIELD_SEPARATOR);

        let (Some(description), Some(descriptor), None) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(HandoffError::MalformedHandoffRecord {
                message: format!("Record {index} does not have exactly two fields: {raw:?}"),
                location: ErrorLocation::from(Location::caller()),
            });
        };

        if description.is_empty() {
            return Err(HandoffError::MalformedHandoffRecord {
                message: format!("Record {index} has an empty description"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let file_descriptor = descriptor
            .parse::<RawFd>()
            .ok()
            .filter(|fd| *fd >= 0)
            .ok_or_else(|| HandoffError::MalformedHandoffRecord {
                message: format!(
                    "Record {index} has an invalid descriptor number {descriptor:?}"
                ),
                location: ErrorLocation::from(Location::caller()),
            })?;

        Ok(Self::new(description, file_descriptor))
    }
}

impl fmt::Display for ListenerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (fd {})", self.description, self.file_descriptor)
    }
}

/// Ordered list of listener records. Built once and never mutated; a
/// handoff captures a fresh set from the live listeners.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenerSet {
    records: Vec<ListenerRecord>,
}

impl ListenerSet {
    pub fn new(records: Vec<ListenerRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[ListenerRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Encode into the single-string form stored in the handoff variable.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError::MalformedHandoffRecord`] if a description is
    /// empty or contains either separator, since the result could not be
    /// decoded back position-for-position.
    #[track_caller]
    pub fn encode(&self) -> Result<String, HandoffError> {
        let mut out = String::new();

        for (index, record) in self.records.iter().enumerate() {
            if index > 0 {
                out.push(RECORD_SEPARATOR);
            }
            record.encode_into(&mut out)?;
        }

        Ok(out)
    }

    /// Decode a handoff value. Absent or empty input is an empty set.
    ///
    /// # Errors
    ///
    /// Fails fast with [`HandoffError::MalformedHandoffRecord`] on the first
    /// bad record. A record is never skipped, because a silently dropped
    /// socket would leave a port unserved after the handoff.
    #[track_caller]
    pub fn decode(value: Option<&str>) -> Result<Self, HandoffError> {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            return Ok(Self::default());
        };

        let records = value
            .split(RECORD_SEPARATOR)
            .enumerate()
            .map(|(index, raw)| ListenerRecord::decode(index, raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { records })
    }
}

impl FromIterator<ListenerRecord> for ListenerSet {
    fn from_iter<T: IntoIterator<Item = ListenerRecord>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ListenerSet {
    type Item = &'a ListenerRecord;
    type IntoIter = std::slice::Iter<'a, ListenerRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
