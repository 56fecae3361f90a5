use std::{fmt::Display, str::FromStr};

use crate::common::{is_yes, ImportError};

/// What the TDS report is keyed by. Only per-module reports are supported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportBy {
    Module,
}

impl FromStr for ReportBy {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "module" => Ok(ReportBy::Module),
            _ => Err(ImportError::InvalidArgument(
                "TDS ReportBy parameter not specified or invalid".into(),
            )),
        }
    }
}

impl Display for ReportBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportBy::Module => write!(f, "module"),
        }
    }
}

/// Teaching week, 1 through 52.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Week(u8);

impl Week {
    pub fn new(week: i64) -> Result<Self, ImportError> {
        if (1..=52).contains(&week) {
            Ok(Week(week as u8))
        } else {
            Err(Self::invalid())
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    fn invalid() -> ImportError {
        ImportError::InvalidArgument(
            "Invalid week value. It must be an integer between 1 and 52".into(),
        )
    }
}

impl FromStr for Week {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let week = s.trim().parse::<i64>().map_err(|_| Self::invalid())?;
        Week::new(week)
    }
}

impl Display for Week {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Academic year the job is run for, 2018 through 2030.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AcademicYear(u16);

impl AcademicYear {
    pub fn new(year: i64) -> Result<Self, ImportError> {
        if (2018..=2030).contains(&year) {
            Ok(AcademicYear(year as u16))
        } else {
            Err(Self::invalid())
        }
    }

    pub fn get(self) -> u16 {
        self.0
    }

    fn invalid() -> ImportError {
        ImportError::InvalidArgument("Academic Year must be between 2018 and 2030".into())
    }
}

impl FromStr for AcademicYear {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let year = s.trim().parse::<i64>().map_err(|_| Self::invalid())?;
        AcademicYear::new(year)
    }
}

impl Display for AcademicYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operator input exactly as given on the command line.
#[derive(Clone, Debug)]
pub struct RawParams {
    pub reportby: String,
    pub week: String,
    pub ay: String,
    pub live_site: String,
    pub del_existing: String,
}

/// Parameters that passed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunParams {
    pub report_by: ReportBy,
    pub week: Week,
    pub ay: AcademicYear,
    pub live_site: bool,
    pub del_existing: bool,
    /// The delete flag as typed, for the startup record.
    pub del_existing_raw: String,
}

impl TryFrom<&RawParams> for RunParams {
    type Error = ImportError;

    fn try_from(raw: &RawParams) -> Result<Self, Self::Error> {
        Ok(RunParams {
            report_by: raw.reportby.parse()?,
            week: raw.week.parse()?,
            ay: raw.ay.parse()?,
            live_site: is_yes(&raw.live_site),
            del_existing: is_yes(&raw.del_existing),
            del_existing_raw: raw.del_existing.clone(),
        })
    }
}
