//! List filtering, sorting and paging
//!
//! A [`ListFilter`] is checked against the entity kind before any SQL is
//! built: a criterion that does not apply to the kind (for example `stage`
//! on companies) is a validation error rather than being ignored.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use super::model::{
    ActivityPriority, ActivityStatus, ActivityType, ContactStatus, DealStage, DealStatus,
    EntityKind,
};
use crate::{Result, Violations};

/// Largest page a single list call returns
pub const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

/// Criteria for [`CrmService::list`](super::CrmService::list)
///
/// All criteria are combined with AND. `from`/`to` bound `created_at`,
/// except for activities where they bound `due_date`; `from` is inclusive
/// and `to` exclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListFilter {
    pub search: Option<String>,
    pub assignee: Option<Uuid>,
    pub status: Option<String>,
    pub stage: Option<String>,
    #[serde(rename = "type")]
    pub activity_type: Option<String>,
    pub priority: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub sort: Option<SortSpec>,
    pub paging: Option<Paging>,
}

impl ListFilter {
    pub fn search(text: impl Into<String>) -> Self {
        Self {
            search: Some(text.into()),
            ..Default::default()
        }
    }

    /// Reject criteria that are malformed or meaningless for `kind`
    pub fn check(&self, kind: EntityKind) -> Result<()> {
        let mut v = Violations::new();

        if self.search.is_some() && search_columns(kind).is_empty() {
            not_applicable(&mut v, "search", kind);
        }
        if self.assignee.is_some() && !has_assignee(kind) {
            not_applicable(&mut v, "assignee", kind);
        }

        if let Some(status) = &self.status {
            let parsed = match kind {
                EntityKind::Contact => Some(status.parse::<ContactStatus>().map(|_| ())),
                EntityKind::Deal => Some(status.parse::<DealStatus>().map(|_| ())),
                EntityKind::Activity => Some(status.parse::<ActivityStatus>().map(|_| ())),
                _ => None,
            };
            match parsed {
                None => not_applicable(&mut v, "status", kind),
                Some(Err(message)) => v.push("status", message),
                Some(Ok(())) => {}
            }
        }

        if let Some(stage) = &self.stage {
            if kind != EntityKind::Deal {
                not_applicable(&mut v, "stage", kind);
            } else if let Err(message) = stage.parse::<DealStage>() {
                v.push("stage", message);
            }
        }

        if let Some(activity_type) = &self.activity_type {
            if kind != EntityKind::Activity {
                not_applicable(&mut v, "type", kind);
            } else if let Err(message) = activity_type.parse::<ActivityType>() {
                v.push("type", message);
            }
        }

        if let Some(priority) = &self.priority {
            if kind != EntityKind::Activity {
                not_applicable(&mut v, "priority", kind);
            } else if let Err(message) = priority.parse::<ActivityPriority>() {
                v.push("priority", message);
            }
        }

        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                v.push("to", "must not be earlier than from");
            }
        }

        if let Some(sort) = &self.sort {
            if sort_column(kind, &sort.field).is_none() {
                v.push(
                    "sort",
                    format!(
                        "cannot sort {} by '{}' (allowed: {})",
                        kind,
                        sort.field,
                        sortable_fields(kind).join(", ")
                    ),
                );
            }
        }

        if let Some(paging) = self.paging {
            if paging.limit < 1 || paging.limit > MAX_PAGE_SIZE {
                v.push("limit", format!("must be between 1 and {}", MAX_PAGE_SIZE));
            }
            if paging.offset < 0 {
                v.push("offset", "must not be negative");
            }
        }

        v.finish(())
    }

    /// `SELECT *` for `kind` with conditions, ordering and paging applied
    pub(crate) fn select_query(&self, kind: EntityKind) -> Result<QueryBuilder<'static, Sqlite>> {
        self.check(kind)?;

        let mut qb = QueryBuilder::new(format!("SELECT * FROM {}", kind.table()));
        self.push_conditions(kind, &mut qb);

        match self.sort.as_ref().and_then(|s| Some((sort_column(kind, &s.field)?, s))) {
            Some((column, sort)) => {
                let direction = if sort.descending { "DESC" } else { "ASC" };
                qb.push(format!(" ORDER BY {} {}, rowid ASC", column, direction));
            }
            None => {
                qb.push(" ORDER BY rowid ASC");
            }
        }

        if let Some(paging) = self.paging {
            qb.push(" LIMIT ").push_bind(paging.limit);
            qb.push(" OFFSET ").push_bind(paging.offset);
        }

        Ok(qb)
    }

    /// `SELECT COUNT(*)` for `kind` with conditions applied; paging is ignored
    pub(crate) fn count_query(&self, kind: EntityKind) -> Result<QueryBuilder<'static, Sqlite>> {
        self.check(kind)?;

        let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", kind.table()));
        self.push_conditions(kind, &mut qb);
        Ok(qb)
    }

    fn push_conditions(&self, kind: EntityKind, qb: &mut QueryBuilder<'static, Sqlite>) {
        let mut first = true;
        let mut and = |qb: &mut QueryBuilder<'static, Sqlite>| {
            qb.push(if first { " WHERE " } else { " AND " });
            first = false;
        };

        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", escape_like(search));
            and(qb);
            qb.push("(");
            for (i, column) in search_columns(kind).iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push(format!("{} LIKE ", column))
                    .push_bind(pattern.clone())
                    .push(" ESCAPE '\\'");
            }
            qb.push(")");
        }

        if let Some(assignee) = self.assignee {
            and(qb);
            qb.push("assigned_to = ").push_bind(assignee.to_string());
        }
        // Bind the stored spelling, not the submitted text
        if let Some(status) = &self.status {
            let status = match kind {
                EntityKind::Contact => canonical(status, |s: ContactStatus| s.as_str()),
                EntityKind::Deal => canonical(status, |s: DealStatus| s.as_str()),
                EntityKind::Activity => canonical(status, |s: ActivityStatus| s.as_str()),
                _ => status.trim().to_string(),
            };
            and(qb);
            qb.push("status = ").push_bind(status);
        }
        if let Some(stage) = &self.stage {
            and(qb);
            qb.push("stage = ")
                .push_bind(canonical(stage, |s: DealStage| s.as_str()));
        }
        if let Some(activity_type) = &self.activity_type {
            and(qb);
            qb.push("activity_type = ")
                .push_bind(canonical(activity_type, |t: ActivityType| t.as_str()));
        }
        if let Some(priority) = &self.priority {
            and(qb);
            qb.push("priority = ")
                .push_bind(canonical(priority, |p: ActivityPriority| p.as_str()));
        }

        let date_column = date_column(kind);
        if let Some(from) = self.from {
            and(qb);
            qb.push(format!("{} >= ", date_column)).push_bind(from);
        }
        if let Some(to) = self.to {
            and(qb);
            qb.push(format!("{} < ", date_column)).push_bind(to);
        }
    }
}

/// Text of the parsed choice; unparsable text is passed through trimmed
fn canonical<T: FromStr>(text: &str, spelling: impl Fn(T) -> &'static str) -> String {
    text.parse::<T>()
        .map(|choice| spelling(choice).to_string())
        .unwrap_or_else(|_| text.trim().to_string())
}

fn not_applicable(v: &mut Violations, field: &str, kind: EntityKind) {
    v.push(field, format!("does not apply to {}", kind));
}

fn has_assignee(kind: EntityKind) -> bool {
    matches!(
        kind,
        EntityKind::Company | EntityKind::Contact | EntityKind::Deal | EntityKind::Activity
    )
}

/// Text columns matched by `search`
fn search_columns(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Company => &["name", "industry", "email"],
        EntityKind::Contact => &["first_name", "last_name", "email"],
        EntityKind::Deal => &["name", "description"],
        EntityKind::Activity => &["subject", "description"],
        EntityKind::Product => &["name", "sku", "description"],
        EntityKind::DealProduct => &[],
    }
}

fn date_column(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Activity => "due_date",
        _ => "created_at",
    }
}

fn sortable_fields(kind: EntityKind) -> Vec<&'static str> {
    let specific: &[&str] = match kind {
        EntityKind::Company => &["name", "industry", "annual_revenue", "employee_count"],
        EntityKind::Contact => &["first_name", "last_name", "email", "status"],
        EntityKind::Deal => &[
            "name",
            "value",
            "stage",
            "probability",
            "status",
            "expected_close_date",
        ],
        EntityKind::Activity => &["type", "subject", "status", "priority", "due_date"],
        EntityKind::Product => &["name", "sku", "price"],
        EntityKind::DealProduct => &["quantity", "unit_price", "discount_percent"],
    };
    let mut fields = specific.to_vec();
    fields.extend(["created_at", "updated_at"]);
    fields
}

/// Whitelisted column for a sort field; never interpolates caller text
fn sort_column(kind: EntityKind, field: &str) -> Option<&'static str> {
    let found = sortable_fields(kind).into_iter().find(|f| *f == field)?;
    Some(match found {
        "type" => "activity_type",
        other => other,
    })
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn violations(err: Error) -> Violations {
        match err {
            Error::Validation(v) => v,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_inapplicable_criteria_rejected() {
        let filter = ListFilter {
            stage: Some("proposal".into()),
            priority: Some("high".into()),
            ..Default::default()
        };
        let v = violations(filter.check(EntityKind::Company).unwrap_err());
        assert_eq!(v.fields(), vec!["stage", "priority"]);
    }

    #[test]
    fn test_status_checked_against_kind_enum() {
        let filter = ListFilter {
            status: Some("won".into()),
            ..Default::default()
        };
        assert!(filter.check(EntityKind::Deal).is_ok());
        let v = violations(filter.check(EntityKind::Contact).unwrap_err());
        assert!(v.contains("status"));
    }

    #[test]
    fn test_search_not_applicable_to_line_items() {
        let v = violations(
            ListFilter::search("x")
                .check(EntityKind::DealProduct)
                .unwrap_err(),
        );
        assert_eq!(v.fields(), vec!["search"]);
    }

    #[test]
    fn test_sort_whitelist() {
        assert_eq!(sort_column(EntityKind::Activity, "type"), Some("activity_type"));
        assert_eq!(sort_column(EntityKind::Deal, "value"), Some("value"));
        assert_eq!(sort_column(EntityKind::Deal, "value; DROP TABLE deals"), None);
        assert_eq!(sort_column(EntityKind::Company, "created_at"), Some("created_at"));
    }

    #[test]
    fn test_reversed_range_and_bad_paging() {
        let now = crate::time::now();
        let filter = ListFilter {
            from: Some(now),
            to: Some(now - chrono::Duration::hours(1)),
            paging: Some(Paging {
                limit: 0,
                offset: -1,
            }),
            ..Default::default()
        };
        let v = violations(filter.check(EntityKind::Deal).unwrap_err());
        assert_eq!(v.fields(), vec!["to", "limit", "offset"]);
    }

    #[test]
    fn test_escape_like_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn test_select_sql_shape() {
        let filter = ListFilter {
            search: Some("acme".into()),
            sort: Some(SortSpec {
                field: "name".into(),
                descending: true,
            }),
            paging: Some(Paging {
                limit: 10,
                offset: 20,
            }),
            ..Default::default()
        };
        let qb = filter.select_query(EntityKind::Company).unwrap();
        let sql = qb.sql();
        assert!(sql.starts_with("SELECT * FROM companies WHERE (name LIKE ?"));
        assert!(sql.contains("ORDER BY name DESC, rowid ASC LIMIT ? OFFSET ?"));
    }
}
