//! The shift scheduler: opens and closes the working day on the Bali wall clock.
//!
//! Once a minute the scheduler re-reads the shift window from the store, so operators can edit it
//! at runtime and see the change take effect within a minute. Opening the shift sweeps stale
//! pre-shift orders into `timeout`; closing it announces the desk is asleep. Per-day flags keep
//! each action to once per calendar day, and a restart recomputes them from the clock so a mid-day
//! restart neither re-opens nor re-sweeps.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use log::*;
use tokio::sync::Mutex;
#[cfg(feature = "sqlite")]
use tokio::task::JoinHandle;

use crate::{
    audit::AuditEntry,
    db::traits::ExchangerDatabase,
    db_types::ShiftSettings,
    helpers::{bali_now, bali_now_naive},
    notify::Notifier,
};

#[cfg(feature = "sqlite")]
use crate::db::sqlite::SqliteDatabase;

/// Actor label the scheduler signs its audit entries with.
pub const SCHEDULER_ACTOR: &str = "@scheduler";

/// How far before shift start the sweep cutoff sits. Orders created earlier than this and still
/// unpaid when the desk opens are archived.
pub const SWEEP_LOOKBACK_HOURS: i64 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DayFlags {
    date: NaiveDate,
    opened: bool,
    closed: bool,
}

impl DayFlags {
    fn fresh(date: NaiveDate) -> Self {
        Self { date, opened: false, closed: false }
    }

    /// Aligns the flags with the wall clock at startup, using the same threshold predicates the
    /// tick triggers use: today's opening is done once the start time has passed, today's closing
    /// once the end time has passed on the night side of the window. For a window wrapping
    /// midnight this means an early-morning restart (before the end time) still fires that close,
    /// and the evening opening stays pending until the start time comes around.
    fn at_startup(now: DateTime<FixedOffset>, settings: Option<ShiftSettings>) -> Self {
        let date = now.date_naive();
        let t = now.time();
        let (opened, closed) = match settings {
            Some(s) => (t >= s.shift_start, t >= s.shift_end && s.is_night(t)),
            None => (false, false),
        };
        Self { date, opened, closed }
    }
}

/// The cutoff for the opening sweep: `SWEEP_LOOKBACK_HOURS` before today's shift start.
pub fn sweep_cutoff(shift_start: NaiveTime, today: NaiveDate) -> NaiveDateTime {
    today.and_time(shift_start) - Duration::hours(SWEEP_LOOKBACK_HOURS)
}

pub struct ShiftScheduler<B, N> {
    db: B,
    notifier: N,
    flags: Arc<Mutex<DayFlags>>,
}

impl<B: Clone, N: Clone> Clone for ShiftScheduler<B, N> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), notifier: self.notifier.clone(), flags: Arc::clone(&self.flags) }
    }
}

impl<B, N> ShiftScheduler<B, N>
where
    B: ExchangerDatabase,
    N: Notifier,
{
    pub fn new(db: B, notifier: N) -> Self {
        let flags = Arc::new(Mutex::new(DayFlags::fresh(bali_now().date_naive())));
        Self { db, notifier, flags }
    }

    /// Call once at startup, before the first tick.
    pub async fn recompute_flags(&self) -> Result<(), B::Error> {
        let now = bali_now();
        let settings = self.db.fetch_shift_settings().await?;
        let mut flags = self.flags.lock().await;
        *flags = DayFlags::at_startup(now, settings);
        debug!("🕰️ Shift flags recomputed: opened={}, closed={}", flags.opened, flags.closed);
        Ok(())
    }

    /// One scheduler step at the current wall clock.
    pub async fn tick(&self) -> Result<(), B::Error> {
        self.tick_at(bali_now()).await
    }

    /// One scheduler step at an explicit instant. Re-reads the shift window, resets the flags at
    /// midnight, and fires each daily action once the clock passes its time and it has not run
    /// today. The open fires once `t >= shift_start`; the close once `t >= shift_end` on the night
    /// side of the window, so a window wrapping midnight closes in the morning and opens in the
    /// evening without either firing at the date rollover.
    pub async fn tick_at(&self, now: DateTime<FixedOffset>) -> Result<(), B::Error> {
        let Some(settings) = self.db.fetch_shift_settings().await? else {
            return Ok(());
        };
        let mut flags = self.flags.lock().await;
        if flags.date != now.date_naive() {
            *flags = DayFlags::fresh(now.date_naive());
        }
        let t = now.time();
        if !flags.opened && t >= settings.shift_start {
            self.open_shift(now, &settings).await?;
            flags.opened = true;
        }
        if !flags.closed && t >= settings.shift_end && settings.is_night(t) {
            self.close_shift().await?;
            flags.closed = true;
        }
        Ok(())
    }

    /// Opens the shift immediately, regardless of the clock. The day's open flag is set so the
    /// scheduled opening does not run a second time; the close flag is cleared so the desk can be
    /// closed again later.
    pub async fn force_open(&self) -> Result<(), B::Error> {
        let now = bali_now();
        let Some(settings) = self.db.fetch_shift_settings().await? else {
            warn!("🕰️ Cannot force the shift open: no shift window is configured");
            return Ok(());
        };
        let mut flags = self.flags.lock().await;
        self.open_shift(now, &settings).await?;
        flags.opened = true;
        flags.closed = false;
        Ok(())
    }

    /// Closes the shift immediately, regardless of the clock.
    pub async fn force_close(&self) -> Result<(), B::Error> {
        let mut flags = self.flags.lock().await;
        self.close_shift().await?;
        flags.opened = true;
        flags.closed = true;
        Ok(())
    }

    async fn open_shift(&self, now: DateTime<FixedOffset>, settings: &ShiftSettings) -> Result<(), B::Error> {
        info!("🕰️ Opening the shift");
        let cutoff = sweep_cutoff(settings.shift_start, now.date_naive());
        let entry = AuditEntry::new(bali_now_naive(), SCHEDULER_ACTOR, "timeout", "-");
        let swept = self.db.sweep_stale(cutoff, &entry, bali_now_naive()).await?;
        if swept.count() > 0 {
            info!("🕰️ {} stale orders archived by the opening sweep", swept.count());
            let numbers =
                swept.swept.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
            self.notifier
                .notify_admins(&format!("🕰️ Opening sweep archived {} orders: {numbers}", swept.count()))
                .await;
        }
        let rates = self.db.fetch_actual_rates().await?;
        let message = match rates {
            Some(r) => format!("🟢 The desk is open. Today's base rate: {}", r.main_rate),
            None => "🟢 The desk is open.".to_string(),
        };
        self.notifier.broadcast_to_groups(&message).await;
        self.notifier
            .notify_admins("🟢 Shift opened. Check yesterday's payouts are reconciled before billing.")
            .await;
        Ok(())
    }

    async fn close_shift(&self) -> Result<(), B::Error> {
        info!("🕰️ Closing the shift");
        self.notifier
            .broadcast_to_groups("🔴 The desk is closed. Requests sent now are recorded for the morning.")
            .await;
        self.notifier
            .notify_admins("🔴 Shift closed. Bill the remaining accepted orders and confirm the transfer totals.")
            .await;
        Ok(())
    }
}

/// Starts the shift scheduler. Do not await the returned JoinHandle, as it runs indefinitely.
#[cfg(feature = "sqlite")]
pub fn start_shift_scheduler<N>(scheduler: ShiftScheduler<SqliteDatabase, N>) -> JoinHandle<()>
where N: Notifier + Send + Sync + 'static {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(60));
        info!("🕰️ Shift scheduler started");
        if let Err(e) = scheduler.recompute_flags().await {
            error!("🕰️ Could not recompute shift flags at startup: {e}");
        }
        loop {
            timer.tick().await;
            if let Err(e) = scheduler.tick().await {
                error!("🕰️ Error running the shift scheduler step: {e}");
            }
        }
    })
}
