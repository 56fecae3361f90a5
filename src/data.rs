use std::{convert::Infallible, fmt, str::FromStr};

use jiff::civil::Date;

pub mod store;

/// A module being monitored in the requested week, with that week's date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredModule {
    pub id: String,
    pub from_date: Date,
    pub to_date: Date,
}

/// One student's attendance figures for one module, as reported by TDS.
#[derive(Debug, Clone, PartialEq)]
pub struct Attendance {
    pub student_id: String,
    pub attendance: AttendanceValue,
    pub attended: i64,
    pub approved_absence: i64,
    pub total_events: i64,
    pub late_count: i64,
}

impl Attendance {
    /// Id the rest of the student systems know this student by.
    pub fn user_id(&self) -> String {
        format!("LON{}", self.student_id)
    }
}

/// TDS reports attendance either as a percentage or as a flag such as `"Y"`.
#[derive(Debug, Clone, PartialEq)]
pub enum AttendanceValue {
    Percent(f64),
    Flag(String),
}

impl fmt::Display for AttendanceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendanceValue::Percent(p) => write!(f, "{p}"),
            AttendanceValue::Flag(s) => write!(f, "{s}"),
        }
    }
}

// numeric text is a percentage, anything else is kept as a flag
impl FromStr for AttendanceValue {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().parse::<f64>() {
            Ok(p) if p.is_finite() => AttendanceValue::Percent(p),
            _ => AttendanceValue::Flag(s.to_string()),
        })
    }
}

impl From<f64> for AttendanceValue {
    fn from(value: f64) -> Self {
        AttendanceValue::Percent(value)
    }
}

/// Natural key of a stored attendance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendanceKey<'a> {
    pub student_id: &'a str,
    pub module_id: &'a str,
    pub week: u8,
    pub week_ay: u16,
}

/// A row of `att_by_module`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub id: i64,
    pub att_user_id: String,
    pub mod_offer_name: String,
    pub week: u8,
    pub week_ay: u16,
    pub attendance: AttendanceValue,
    pub attended: i64,
    pub approved_absence: i64,
    pub total_events: i64,
    pub late_count: i64,
    pub user_id: String,
    pub ay: u16,
    pub course_code: Option<String>,
}
