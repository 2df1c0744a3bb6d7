use anyhow::Context;
use serde::Deserialize;
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime, Time,
};

use crate::users::model::{Profile, Role, UserStatus};

/// Column layout of an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CsvSchema {
    /// The nine columns shown in the admin dashboard.
    Summary,
    /// Every stored field.
    #[default]
    Full,
}

const SUMMARY_HEADERS: [&str; 9] = [
    "ID",
    "Name",
    "Email",
    "Phone",
    "Batch",
    "Department",
    "Year of Passing",
    "Status",
    "Registration Date",
];

const FULL_HEADERS: [&str; 14] = [
    "ID",
    "Unique ID",
    "Email",
    "Name",
    "Role",
    "Batch",
    "Department",
    "Phone",
    "Address",
    "Year of Passing",
    "Registration Date",
    "Status",
    "Created At",
    "Updated At",
];

impl CsvSchema {
    pub fn headers(self) -> &'static [&'static str] {
        match self {
            CsvSchema::Summary => &SUMMARY_HEADERS,
            CsvSchema::Full => &FULL_HEADERS,
        }
    }

    fn row(self, p: &Profile) -> anyhow::Result<Vec<String>> {
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        let registered = p
            .registration_date
            .format(format_description!("[year]-[month]-[day]"))?;

        Ok(match self {
            CsvSchema::Summary => vec![
                p.id.clone(),
                p.name.clone(),
                p.email.clone(),
                opt(&p.phone),
                opt(&p.batch),
                opt(&p.department),
                opt(&p.year_of_passing),
                p.status.to_string(),
                registered,
            ],
            CsvSchema::Full => vec![
                p.id.clone(),
                opt(&p.unique_id),
                p.email.clone(),
                p.name.clone(),
                p.role.to_string(),
                opt(&p.batch),
                opt(&p.department),
                opt(&p.phone),
                opt(&p.address),
                opt(&p.year_of_passing),
                registered,
                p.status.to_string(),
                p.created_at.format(&Rfc3339)?,
                p.updated_at.format(&Rfc3339)?,
            ],
        })
    }
}

/// Optional equality and creation-time filters. Empty strings are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFilters {
    pub role: Option<String>,
    pub status: Option<String>,
    pub batch: Option<String>,
    pub department: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

/// Accepts RFC 3339 timestamps or plain dates. A plain `date_to` covers the
/// whole day.
fn parse_bound(raw: &str, end_of_day: bool) -> anyhow::Result<OffsetDateTime> {
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(ts);
    }
    let date = Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .with_context(|| format!("invalid date: {raw}"))?;
    let time = if end_of_day {
        Time::from_hms_milli(23, 59, 59, 999)?
    } else {
        Time::MIDNIGHT
    };
    Ok(date.with_time(time).assume_utc())
}

fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl ExportFilters {
    pub fn is_empty(&self) -> bool {
        [&self.role, &self.status, &self.batch, &self.department, &self.date_from, &self.date_to]
            .iter()
            .all(|v| present(v).is_none())
    }

    /// Keeps matching profiles, in creation order.
    pub fn apply(&self, mut profiles: Vec<Profile>) -> anyhow::Result<Vec<Profile>> {
        let role = present(&self.role).map(str::parse::<Role>).transpose()?;
        let status = present(&self.status).map(str::parse::<UserStatus>).transpose()?;
        let from = present(&self.date_from).map(|d| parse_bound(d, false)).transpose()?;
        let to = present(&self.date_to).map(|d| parse_bound(d, true)).transpose()?;
        let batch = present(&self.batch);
        let department = present(&self.department);

        profiles.retain(|p| {
            role.map_or(true, |r| p.role == r)
                && status.map_or(true, |s| p.status == s)
                && batch.map_or(true, |b| p.batch.as_deref() == Some(b))
                && department.map_or(true, |d| p.department.as_deref() == Some(d))
                && from.map_or(true, |f| p.created_at >= f)
                && to.map_or(true, |t| p.created_at <= t)
        });
        profiles.sort_by_key(|p| p.created_at);
        Ok(profiles)
    }
}

pub fn to_csv(profiles: &[Profile], schema: CsvSchema) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(schema.headers())?;
    for p in profiles {
        wtr.write_record(schema.row(p)?)?;
    }
    let bytes = wtr.into_inner().context("flush csv")?;
    String::from_utf8(bytes).context("csv output is not utf-8")
}

/// `2025-01-15T10-30-00`, safe for file names.
pub fn file_timestamp(now: OffsetDateTime) -> anyhow::Result<String> {
    Ok(now.format(format_description!("[year]-[month]-[day]T[hour]-[minute]-[second]"))?)
}
