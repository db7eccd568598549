//! Admin dashboard aggregates over timezone-aware windows.

use chrono::{DateTime, Datelike, Duration, FixedOffset, TimeZone, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use crate::entities::order::{self, OrderStatus};
use crate::errors::ServiceError;

const IN_PROGRESS: &[OrderStatus] = &[OrderStatus::Paid, OrderStatus::Processing];
const REVENUE: &[OrderStatus] = &[
    OrderStatus::Paid,
    OrderStatus::Processing,
    OrderStatus::Shipped,
    OrderStatus::Completed,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StatsRange {
    Day,
    Week,
    Month,
    Year,
}

impl Default for StatsRange {
    fn default() -> Self {
        StatsRange::Week
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RevenueStats {
    pub total_cents: i64,
    pub orders: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardStats {
    pub range: StatsRange,
    pub range_label: String,
    pub orders: u64,
    pub in_progress: u64,
    pub shipped: u64,
    pub revenue: RevenueStats,
}

#[derive(Debug, FromQueryResult)]
struct RevenueRow {
    total_cents: Option<i64>,
}

pub struct StatsService {
    db: Arc<DatabaseConnection>,
    utc_offset_minutes: i32,
}

impl StatsService {
    pub fn new(db: Arc<DatabaseConnection>, utc_offset_minutes: i32) -> Self {
        Self {
            db,
            utc_offset_minutes,
        }
    }

    #[instrument(skip(self))]
    pub async fn dashboard(
        &self,
        range: StatsRange,
        year: Option<i32>,
    ) -> Result<DashboardStats, ServiceError> {
        let (start, end, range_label) = self.window(range, year, Utc::now())?;

        let in_window = order::Entity::find()
            .filter(order::Column::CreatedAt.gte(start))
            .filter(order::Column::CreatedAt.lt(end));

        let orders = in_window.clone().count(self.db.as_ref()).await?;
        let in_progress = in_window
            .clone()
            .filter(order::Column::Status.is_in(IN_PROGRESS.iter().copied()))
            .count(self.db.as_ref())
            .await?;
        let shipped = in_window
            .clone()
            .filter(order::Column::Status.eq(OrderStatus::Shipped))
            .count(self.db.as_ref())
            .await?;

        let revenue_query = in_window
            .clone()
            .filter(order::Column::Status.is_in(REVENUE.iter().copied()));
        let revenue_orders = revenue_query.clone().count(self.db.as_ref()).await?;
        let revenue_total = revenue_query
            .select_only()
            .column_as(order::Column::TotalCents.sum(), "total_cents")
            .into_model::<RevenueRow>()
            .one(self.db.as_ref())
            .await?
            .and_then(|row| row.total_cents)
            .unwrap_or(0);

        Ok(DashboardStats {
            range,
            range_label,
            orders,
            in_progress,
            shipped,
            revenue: RevenueStats {
                total_cents: revenue_total,
                orders: revenue_orders,
            },
        })
    }

    /// Years with at least one order, always including the current year.
    pub async fn order_years(&self) -> Result<Vec<i32>, ServiceError> {
        let offset = self.offset()?;
        let current_year = Utc::now().with_timezone(&offset).year();

        let oldest = order::Entity::find()
            .order_by_asc(order::Column::CreatedAt)
            .one(self.db.as_ref())
            .await?;
        let Some(oldest) = oldest else {
            return Ok(vec![current_year]);
        };

        let first_year = oldest.created_at.with_timezone(&offset).year();
        Ok((first_year.min(current_year)..=current_year).collect())
    }

    fn offset(&self) -> Result<FixedOffset, ServiceError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            ServiceError::InternalError(format!(
                "invalid stats UTC offset: {} minutes",
                self.utc_offset_minutes
            ))
        })
    }

    /// Resolves the half-open UTC window `[start, end)` for a range, with
    /// day boundaries in the configured offset.
    fn window(
        &self,
        range: StatsRange,
        year: Option<i32>,
        now: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>, String), ServiceError> {
        let offset = self.offset()?;
        let local_now = now.with_timezone(&offset);
        let today_start = offset
            .with_ymd_and_hms(local_now.year(), local_now.month(), local_now.day(), 0, 0, 0)
            .single()
            .ok_or_else(|| ServiceError::InternalError("day boundary resolution failed".into()))?;

        let (start, end, label) = match range {
            StatsRange::Day => (today_start.with_timezone(&Utc), now, "Today".to_string()),
            StatsRange::Week => (
                (today_start - Duration::days(6)).with_timezone(&Utc),
                now,
                "Last 7 days".to_string(),
            ),
            StatsRange::Month => (
                (today_start - Duration::days(29)).with_timezone(&Utc),
                now,
                "Last 30 days".to_string(),
            ),
            StatsRange::Year => {
                let y = match year {
                    Some(y) if (2000..=3000).contains(&y) => y,
                    Some(y) => {
                        return Err(ServiceError::ValidationError(format!(
                            "Year {} out of range",
                            y
                        )))
                    }
                    None => local_now.year(),
                };
                let start = offset
                    .with_ymd_and_hms(y, 1, 1, 0, 0, 0)
                    .single()
                    .ok_or_else(|| {
                        ServiceError::InternalError("year boundary resolution failed".into())
                    })?;
                let end = offset
                    .with_ymd_and_hms(y + 1, 1, 1, 0, 0, 0)
                    .single()
                    .ok_or_else(|| {
                        ServiceError::InternalError("year boundary resolution failed".into())
                    })?;
                (
                    start.with_timezone(&Utc),
                    end.with_timezone(&Utc),
                    format!("Year {}", y),
                )
            }
        };
        Ok((start, end, label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::DatabaseConnection;

    fn service(offset_minutes: i32) -> StatsService {
        StatsService::new(Arc::new(DatabaseConnection::Disconnected), offset_minutes)
    }

    #[test]
    fn day_window_starts_at_local_midnight() {
        let svc = service(60);
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let (start, end, _) = svc.window(StatsRange::Day, None, now).unwrap();
        // Local midnight at UTC+1 is 23:00 UTC of the previous day.
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 9, 23, 0, 0).unwrap());
        assert_eq!(end, now);
    }

    #[test]
    fn week_window_covers_seven_local_days() {
        let svc = service(0);
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 8, 30, 0).unwrap();
        let (start, _, _) = svc.window(StatsRange::Week, None, now).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap());
    }

    #[test]
    fn explicit_year_window_is_calendar_bounded() {
        let svc = service(60);
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let (start, end, label) = svc.window(StatsRange::Year, Some(2025), now).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 12, 31, 23, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 12, 31, 23, 0, 0).unwrap());
        assert_eq!(label, "Year 2025");
    }

    #[test]
    fn out_of_range_year_is_rejected() {
        let svc = service(0);
        let now = Utc::now();
        assert!(svc.window(StatsRange::Year, Some(1999), now).is_err());
    }
}
