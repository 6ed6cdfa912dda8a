use crate::subscription::Frequency;
use chrono::{Duration, FixedOffset, Months, NaiveDate, Offset, Utc};

/// The archive partitions its tables by Pacific calendar day.
pub const ARCHIVE_UTC_OFFSET_HOURS: i32 = -8;

const DEFAULT_LIMIT: u64 = 10;
const DAY_PREFIX: &str = "githubarchive.day.";
const MONTH_PREFIX: &str = "githubarchive.month.";

/// Today's date in the archive's partition timezone.
pub fn archive_today(utc_offset_hours: i32) -> NaiveDate {
    let offset = utc_offset_hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .unwrap_or(Utc.fix());
    Utc::now().with_timezone(&offset).date_naive()
}

/// Tables covering one digest period ending on `today`.
pub fn partition_tables(frequency: Frequency, today: NaiveDate) -> Vec<String> {
    match frequency {
        Frequency::Weekly => {
            let start = today - Duration::days(7);
            vec![format!(
                "(TABLE_DATE_RANGE([{}],TIMESTAMP('{}'),TIMESTAMP('{}')))",
                DAY_PREFIX,
                start.format("%Y-%m-%d"),
                today.format("%Y-%m-%d")
            )]
        }
        Frequency::Monthly => vec![format!("{}{}", MONTH_PREFIX, today.format("%Y%m"))],
        Frequency::Daily | Frequency::Never => {
            vec![format!("{}{}", DAY_PREFIX, today.format("%Y%m%d"))]
        }
    }
}

/// Start of the window a digest of `frequency` looks back over.
pub fn period_start(frequency: Frequency, today: NaiveDate) -> NaiveDate {
    match frequency {
        Frequency::Weekly => today - Duration::days(7),
        Frequency::Monthly => today
            .checked_sub_months(Months::new(1))
            .unwrap_or(today - Duration::days(30)),
        Frequency::Daily | Frequency::Never => today - Duration::days(1),
    }
}

/// Overrides for a fetcher's query. Empty fields fall back to defaults
/// when the query is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Source tables; today's day partition when empty.
    pub tables: Vec<String>,
    /// `Org/Name` repositories to restrict to.
    pub repositories: Vec<String>,
    /// `payload.action` values to select, e.g. "opened", "closed".
    pub kinds: Vec<String>,
    pub order: Vec<String>,
    /// Row cap; zero means the default of 10.
    pub limit: u64,
    /// When set, replaces every default condition verbatim.
    pub conditions: Vec<String>,
    /// Day whose partition is read when `tables` is empty; the current
    /// archive day when unset.
    pub today: Option<NaiveDate>,
}

impl Options {
    pub fn for_repositories<I, S>(repositories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            repositories: repositories.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn tables(&self) -> Vec<String> {
        if !self.tables.is_empty() {
            return self.tables.clone();
        }
        let today = self
            .today
            .unwrap_or_else(|| archive_today(ARCHIVE_UTC_OFFSET_HOURS));
        partition_tables(Frequency::Daily, today)
    }

    pub fn order(&self) -> Vec<String> {
        if !self.order.is_empty() {
            return self.order.clone();
        }
        vec!["id DESC".to_string(), "author".to_string()]
    }

    pub fn limit(&self) -> u64 {
        if self.limit > 0 {
            self.limit
        } else {
            DEFAULT_LIMIT
        }
    }

    pub fn set_tables(&mut self, frequency: Frequency, today: NaiveDate) {
        self.tables = partition_tables(frequency, today);
    }
}
