// src/schedule.rs
//! Daily schedule: fire a generation when the local wall clock hits one of the
//! configured `(hour, minute)` slots.
//!
//! The slot math is pure (`check_slot`, `next_slot`); `ScheduleController` owns the
//! recurring tokio task and the spec it was armed with.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime, Timelike};
use metrics::counter;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::PipelineError;
use crate::ingest::types::SourceKind;
use crate::pipeline::{GenerationRecord, GenerationRequest};

pub const DEFAULT_CHECK_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("at least one hour must be selected")]
    NoHours,
    #[error("hour {0} out of range 0-23")]
    HourOutOfRange(u8),
    #[error("minute {0} out of range 0-59")]
    MinuteOutOfRange(u8),
    #[error("scheduled runs need an RSS feed URL")]
    NotAFeed,
}

/// Hours of the day plus one minute-of-hour. Always valid once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleSpec {
    hours: BTreeSet<u8>,
    minute: u8,
}

impl ScheduleSpec {
    pub fn new(hours: impl IntoIterator<Item = u8>, minute: u8) -> Result<Self, ScheduleError> {
        let hours: BTreeSet<u8> = hours.into_iter().collect();
        if hours.is_empty() {
            return Err(ScheduleError::NoHours);
        }
        if let Some(&h) = hours.iter().find(|h| **h > 23) {
            return Err(ScheduleError::HourOutOfRange(h));
        }
        if minute > 59 {
            return Err(ScheduleError::MinuteOutOfRange(minute));
        }
        Ok(Self { hours, minute })
    }

    pub fn hours(&self) -> &BTreeSet<u8> {
        &self.hours
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

/// Time until the next slot, floored to whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotDelta {
    pub hours: i64,
    pub minutes: i64,
}

impl fmt::Display for SlotDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h{}m", self.hours, self.minutes)
    }
}

impl Serialize for SlotDelta {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotCheck {
    Fire,
    Wait(SlotDelta),
}

/// Exact match only: the current hour is selected and the minute equals the target.
pub fn check_slot(spec: &ScheduleSpec, now: NaiveDateTime) -> SlotCheck {
    if spec.hours.contains(&(now.hour() as u8)) && now.minute() == u32::from(spec.minute) {
        SlotCheck::Fire
    } else {
        SlotCheck::Wait(next_slot(spec, now))
    }
}

/// Earliest slot strictly after `now`, today or tomorrow.
pub fn next_slot(spec: &ScheduleSpec, now: NaiveDateTime) -> SlotDelta {
    let today = now.date();
    let at = |h: u8| NaiveTime::from_hms_opt(u32::from(h), u32::from(spec.minute), 0);

    let next = spec
        .hours
        .iter()
        .filter_map(|h| at(*h).map(|t| today.and_time(t)))
        .find(|slot| *slot > now)
        .or_else(|| {
            let first = at(*spec.hours.iter().next()?)?;
            Some(today.succ_opt()?.and_time(first))
        });

    let total_minutes = next
        .map(|slot| (slot - now).num_minutes())
        .unwrap_or_else(|| ChronoDuration::days(1).num_minutes());
    SlotDelta {
        hours: total_minutes / 60,
        minutes: total_minutes % 60,
    }
}

/// Local wall-clock seam.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// What a fired slot runs. Implemented by the pipeline; faked in tests.
#[async_trait]
pub trait GenerationTrigger: Send + Sync {
    async fn trigger(&self, request: GenerationRequest) -> Result<GenerationRecord, PipelineError>;
}

struct Armed {
    spec: ScheduleSpec,
    request: GenerationRequest,
    handle: JoinHandle<()>,
    next_rx: watch::Receiver<Option<SlotDelta>>,
}

pub struct ScheduleController {
    trigger: Arc<dyn GenerationTrigger>,
    clock: Arc<dyn Clock>,
    period: Duration,
    armed: Option<Armed>,
}

impl ScheduleController {
    pub fn new(trigger: Arc<dyn GenerationTrigger>) -> Self {
        Self {
            trigger,
            clock: Arc::new(LocalClock),
            period: DEFAULT_CHECK_PERIOD,
            armed: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// (Re)arm with `spec`. Any running schedule is cancelled first, so a rejected
    /// request leaves the controller disarmed. Must be called inside a tokio runtime.
    pub fn arm(&mut self, spec: ScheduleSpec, request: GenerationRequest) -> Result<(), ScheduleError> {
        self.disarm();
        if request.target.kind() != SourceKind::Feed {
            return Err(ScheduleError::NotAFeed);
        }

        let (next_tx, next_rx) = watch::channel(None);
        let handle = tokio::spawn(run_schedule(
            spec.clone(),
            request.clone(),
            self.trigger.clone(),
            self.clock.clone(),
            self.period,
            next_tx,
        ));

        tracing::info!(
            target: "schedule",
            hours = ?spec.hours,
            minute = spec.minute,
            url = request.target.url(),
            "schedule armed"
        );
        self.armed = Some(Armed {
            spec,
            request,
            handle,
            next_rx,
        });
        Ok(())
    }

    /// Idempotent. Aborts the recurring task; a generation it already spawned keeps running.
    pub fn disarm(&mut self) {
        if let Some(a) = self.armed.take() {
            a.handle.abort();
            tracing::info!(target: "schedule", "schedule disarmed");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    pub fn spec(&self) -> Option<&ScheduleSpec> {
        self.armed.as_ref().map(|a| &a.spec)
    }

    pub fn request(&self) -> Option<&GenerationRequest> {
        self.armed.as_ref().map(|a| &a.request)
    }

    /// Delta reported by the most recent check; `None` right after firing or when disarmed.
    pub fn next_slot(&self) -> Option<SlotDelta> {
        self.armed.as_ref().and_then(|a| *a.next_rx.borrow())
    }
}

impl Drop for ScheduleController {
    fn drop(&mut self) {
        self.disarm();
    }
}

async fn run_schedule(
    spec: ScheduleSpec,
    request: GenerationRequest,
    trigger: Arc<dyn GenerationTrigger>,
    clock: Arc<dyn Clock>,
    period: Duration,
    next_tx: watch::Sender<Option<SlotDelta>>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // one run per slot, even if two checks land inside the same minute
    let mut last_fired: Option<NaiveDateTime> = None;

    loop {
        // first tick completes immediately
        ticker.tick().await;
        counter!("schedule_checks_total").increment(1);

        let now = clock.now();
        match check_slot(&spec, now) {
            SlotCheck::Fire => {
                let slot = now.with_second(0).and_then(|t| t.with_nanosecond(0));
                if slot.is_some() && slot == last_fired {
                    continue;
                }
                last_fired = slot;
                next_tx.send_replace(None);

                tracing::info!(target: "schedule", hour = now.hour(), minute = now.minute(), "slot reached, triggering generation");
                let trigger = trigger.clone();
                let req = request.clone();
                tokio::spawn(async move {
                    match trigger.trigger(req).await {
                        Ok(rec) => {
                            tracing::info!(target: "schedule", filename = %rec.filename, "scheduled generation finished")
                        }
                        Err(PipelineError::GenerationInProgress) => {
                            tracing::warn!(target: "schedule", "generation already running; slot skipped")
                        }
                        Err(e) => tracing::error!(target: "schedule", error = %e, "scheduled generation failed"),
                    }
                });
            }
            SlotCheck::Wait(delta) => {
                tracing::debug!(target: "schedule", next = %delta, "waiting for next slot");
                next_tx.send_replace(Some(delta));
            }
        }
    }
}
