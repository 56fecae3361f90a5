use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::common::ImportError;

/// Length of the semester code at the end of every module id.
pub const SUFFIX_LEN: usize = 6;

/// Maps a module id's semester suffix to the academic year that semester belongs to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SemesterCalendar {
    by_suffix: HashMap<String, u16>,
}

// `{"2324S1": 2023}` or `{"2324S1": [2023, "Semester 1"]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum Entry {
    Year(u16),
    Tuple(Vec<serde_json::Value>),
}

impl SemesterCalendar {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, u16)>,
        S: Into<String>,
    {
        Self {
            by_suffix: entries.into_iter().map(|(s, y)| (s.into(), y)).collect(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let raw: HashMap<String, Entry> =
            serde_json::from_str(text).context("semester calendar is not a JSON object")?;

        let by_suffix = raw
            .into_iter()
            .map(|(suffix, entry)| -> Result<(String, u16)> {
                let year = match entry {
                    Entry::Year(y) => y,
                    Entry::Tuple(values) => values
                        .first()
                        .and_then(|v| v.as_u64())
                        .and_then(|y| u16::try_from(y).ok())
                        .with_context(|| {
                            format!("semester {suffix:?} must start with an academic year")
                        })?,
                };
                Ok((suffix, year))
            })
            .collect::<Result<_>>()?;

        Ok(Self { by_suffix })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read semester calendar {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Academic year owning `module_id`, looked up by its trailing six characters.
    pub fn academic_year_of(&self, module_id: &str) -> Result<u16, ImportError> {
        let suffix = semester_suffix(module_id);
        self.by_suffix
            .get(suffix)
            .copied()
            .ok_or_else(|| ImportError::UnknownSemester {
                module_id: module_id.to_string(),
                suffix: suffix.to_string(),
            })
    }
}

/// Last `SUFFIX_LEN` characters of `module_id`, or all of it when shorter.
pub fn semester_suffix(module_id: &str) -> &str {
    match module_id.char_indices().rev().nth(SUFFIX_LEN - 1) {
        Some((start, _)) => &module_id[start..],
        None => module_id,
    }
}
