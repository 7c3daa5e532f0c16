use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::error::Result;
use crate::services::repository::DirectoryRepository;
use crate::utils::time::{format_trend_label, today};

pub const TREND_DAYS: i64 = 7;

#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync + 'static {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        today()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_members: u64,
    pub today_present: u64,
    pub trend: Vec<TrendPoint>,
}

pub struct DashboardService<D, C = SystemClock> {
    directory: Arc<D>,
    clock: Arc<C>,
}

impl<D: DirectoryRepository> DashboardService<D, SystemClock> {
    pub fn new(directory: Arc<D>) -> Self {
        Self::with_clock(directory, SystemClock)
    }
}

impl<D: DirectoryRepository, C: Clock> DashboardService<D, C> {
    pub fn with_clock(directory: Arc<D>, clock: C) -> Self {
        Self {
            directory,
            clock: Arc::new(clock),
        }
    }

    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<DashboardStats> {
        let today = self.clock.today();
        let total_members = self.directory.count_members().await?;
        let today_present = self.directory.count_present(today).await?;
        let trend = self.trend(today).await;
        Ok(DashboardStats {
            total_members,
            today_present,
            trend,
        })
    }

    /// Present counts for the last week, oldest day first. A day whose
    /// count cannot be loaded shows as zero.
    pub async fn trend(&self, today: NaiveDate) -> Vec<TrendPoint> {
        let mut points = Vec::with_capacity(TREND_DAYS as usize);
        for offset in (0..TREND_DAYS).rev() {
            let date = today - Duration::days(offset);
            let count = match self.directory.count_present(date).await {
                Ok(count) => count,
                Err(e) => {
                    warn!(%date, error = %e, "trend count failed, counting as zero");
                    0
                }
            };
            points.push(TrendPoint {
                date,
                label: format_trend_label(date),
                count,
            });
        }
        points
    }
}
