//! Dashboard and sales-performance aggregations
//!
//! Sums are computed in SQL; ratios are derived in Rust so that empty
//! pipelines yield zero instead of dividing by zero. Assignee names come
//! from a LEFT JOIN, so rows assigned to a removed profile still count.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::CrmService;
use crate::db::{retry_on_unavailable, rows};
use crate::time::LocalWindows;
use crate::Result;

/// Raw deal sums for one scope
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DealTotals {
    pub total: i64,
    pub open: i64,
    pub open_value: f64,
    pub won: i64,
    pub won_value: f64,
    pub lost: i64,
    pub lost_value: f64,
}

impl DealTotals {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            total: row.try_get("total_deals")?,
            open: row.try_get("open_deals")?,
            open_value: row.try_get("open_value")?,
            won: row.try_get("won_deals")?,
            won_value: row.try_get("won_value")?,
            lost: row.try_get("lost_deals")?,
            lost_value: row.try_get("lost_value")?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PipelineMetrics {
    pub total_deals: i64,
    pub open_deals: i64,
    /// Sum of value over open deals
    pub pipeline_value: f64,
    pub won_deals: i64,
    pub won_value: f64,
    pub lost_deals: i64,
    pub lost_value: f64,
    /// Won value per won deal; 0 when nothing has been won
    pub avg_deal_size: f64,
    /// won / (won + lost); 0 when no deal has closed
    pub conversion_rate: f64,
}

impl From<DealTotals> for PipelineMetrics {
    fn from(t: DealTotals) -> Self {
        let avg_deal_size = if t.won > 0 {
            t.won_value / t.won as f64
        } else {
            0.0
        };
        let closed = t.won + t.lost;
        let conversion_rate = if closed > 0 {
            t.won as f64 / closed as f64
        } else {
            0.0
        };

        Self {
            total_deals: t.total,
            open_deals: t.open,
            pipeline_value: t.open_value,
            won_deals: t.won,
            won_value: t.won_value,
            lost_deals: t.lost,
            lost_value: t.lost_value,
            avg_deal_size,
            conversion_rate,
        }
    }
}

/// Activity counts for one scope; due windows count pending activities only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivityMetrics {
    pub total_activities: i64,
    pub pending_activities: i64,
    pub activities_due_today: i64,
    pub activities_due_this_week: i64,
}

impl ActivityMetrics {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            total_activities: row.try_get("total_activities")?,
            pending_activities: row.try_get("pending_activities")?,
            activities_due_today: row.try_get("due_today")?,
            activities_due_this_week: row.try_get("due_this_week")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_companies: i64,
    pub total_contacts: i64,
    #[serde(flatten)]
    pub pipeline: PipelineMetrics,
    #[serde(flatten)]
    pub activities: ActivityMetrics,
}

/// Roll-up for one assignee, or for everyone when `overall` is set
///
/// `assignee` is `None` both for the overall group and for the group of
/// unassigned rows; `overall` tells them apart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssigneePerformance {
    pub assignee: Option<Uuid>,
    pub assignee_name: Option<String>,
    pub overall: bool,
    #[serde(flatten)]
    pub pipeline: PipelineMetrics,
    #[serde(flatten)]
    pub activities: ActivityMetrics,
}

const DEAL_SUMS: &str = r#"
    COUNT(*) AS total_deals,
    COALESCE(SUM(CASE WHEN d.status = 'open' THEN 1 ELSE 0 END), 0) AS open_deals,
    CAST(COALESCE(SUM(CASE WHEN d.status = 'open' THEN d.value ELSE 0 END), 0) AS REAL) AS open_value,
    COALESCE(SUM(CASE WHEN d.status = 'won' THEN 1 ELSE 0 END), 0) AS won_deals,
    CAST(COALESCE(SUM(CASE WHEN d.status = 'won' THEN d.value ELSE 0 END), 0) AS REAL) AS won_value,
    COALESCE(SUM(CASE WHEN d.status = 'lost' THEN 1 ELSE 0 END), 0) AS lost_deals,
    CAST(COALESCE(SUM(CASE WHEN d.status = 'lost' THEN d.value ELSE 0 END), 0) AS REAL) AS lost_value
"#;

const ACTIVITY_SUMS: &str = r#"
    COUNT(*) AS total_activities,
    COALESCE(SUM(CASE WHEN a.status = 'pending' THEN 1 ELSE 0 END), 0) AS pending_activities,
    COALESCE(SUM(CASE WHEN a.status = 'pending' AND a.due_date >= ? AND a.due_date < ?
        THEN 1 ELSE 0 END), 0) AS due_today,
    COALESCE(SUM(CASE WHEN a.status = 'pending' AND a.due_date >= ? AND a.due_date < ?
        THEN 1 ELSE 0 END), 0) AS due_this_week
"#;

impl CrmService {
    /// Dashboard figures with due-date windows taken from the local clock
    pub async fn compute_dashboard_stats(&self) -> Result<DashboardStats> {
        self.compute_dashboard_stats_in(LocalWindows::at(&chrono::Local::now()))
            .await
    }

    /// Dashboard figures for explicit due-date windows
    pub async fn compute_dashboard_stats_in(&self, windows: LocalWindows) -> Result<DashboardStats> {
        retry_on_unavailable(self.retry_policy(), "dashboard_stats", || async move {
            let pool = self.pool();

            let total_companies: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM companies")
                .fetch_one(pool)
                .await?;
            let total_contacts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contacts")
                .fetch_one(pool)
                .await?;

            let deal_row = sqlx::query(&format!("SELECT {} FROM deals d", DEAL_SUMS))
                .fetch_one(pool)
                .await?;
            let activity_row = bind_windows(
                sqlx::query(&format!("SELECT {} FROM activities a", ACTIVITY_SUMS)),
                &windows,
            )
            .fetch_one(pool)
            .await?;

            Ok(DashboardStats {
                total_companies,
                total_contacts,
                pipeline: DealTotals::from_row(&deal_row)?.into(),
                activities: ActivityMetrics::from_row(&activity_row)?,
            })
        })
        .await
    }

    /// Pipeline and activity metrics, per assignee or as one overall group
    ///
    /// Groups are ordered by won value (highest first), then by open
    /// pipeline value.
    pub async fn compute_sales_performance(
        &self,
        group_by_assignee: bool,
    ) -> Result<Vec<AssigneePerformance>> {
        self.compute_sales_performance_in(group_by_assignee, LocalWindows::at(&chrono::Local::now()))
            .await
    }

    pub async fn compute_sales_performance_in(
        &self,
        group_by_assignee: bool,
        windows: LocalWindows,
    ) -> Result<Vec<AssigneePerformance>> {
        if !group_by_assignee {
            let stats = self.compute_dashboard_stats_in(windows).await?;
            return Ok(vec![AssigneePerformance {
                assignee: None,
                assignee_name: None,
                overall: true,
                pipeline: stats.pipeline,
                activities: stats.activities,
            }]);
        }

        let mut groups = retry_on_unavailable(self.retry_policy(), "sales_performance", || {
            async move {
                let pool = self.pool();
                let mut groups: BTreeMap<Option<Uuid>, AssigneePerformance> = BTreeMap::new();

                let deal_rows = sqlx::query(&format!(
                    r#"
                    SELECT d.assigned_to AS assignee, p.full_name AS assignee_name, {}
                    FROM deals d
                    LEFT JOIN profiles p ON p.guid = d.assigned_to
                    GROUP BY d.assigned_to
                    "#,
                    DEAL_SUMS
                ))
                .fetch_all(pool)
                .await?;
                for row in &deal_rows {
                    group_for(&mut groups, row)?.pipeline = DealTotals::from_row(row)?.into();
                }

                let activity_rows = bind_windows(
                    sqlx::query(&format!(
                        r#"
                        SELECT a.assigned_to AS assignee, p.full_name AS assignee_name, {}
                        FROM activities a
                        LEFT JOIN profiles p ON p.guid = a.assigned_to
                        GROUP BY a.assigned_to
                        "#,
                        ACTIVITY_SUMS
                    )),
                    &windows,
                )
                .fetch_all(pool)
                .await?;
                for row in &activity_rows {
                    group_for(&mut groups, row)?.activities = ActivityMetrics::from_row(row)?;
                }

                Ok(groups.into_values().collect::<Vec<_>>())
            }
        })
        .await?;

        groups.sort_by(|a, b| {
            b.pipeline
                .won_value
                .total_cmp(&a.pipeline.won_value)
                .then(b.pipeline.pipeline_value.total_cmp(&a.pipeline.pipeline_value))
        });
        Ok(groups)
    }
}

fn bind_windows<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    windows: &LocalWindows,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(windows.today.start)
        .bind(windows.today.end)
        .bind(windows.this_week.start)
        .bind(windows.this_week.end)
}

fn group_for<'m>(
    groups: &'m mut BTreeMap<Option<Uuid>, AssigneePerformance>,
    row: &SqliteRow,
) -> Result<&'m mut AssigneePerformance> {
    let assignee = rows::opt_guid(row, "assignee")?;
    let assignee_name: Option<String> = row.try_get("assignee_name")?;

    let group = groups.entry(assignee).or_insert_with(|| AssigneePerformance {
        assignee,
        assignee_name: None,
        overall: false,
        pipeline: PipelineMetrics::default(),
        activities: ActivityMetrics::default(),
    });
    if group.assignee_name.is_none() {
        group.assignee_name = assignee_name;
    }
    Ok(group)
}
