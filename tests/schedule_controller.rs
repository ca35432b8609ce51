// tests/schedule_controller.rs
//
// Controller lifecycle against a fake wall clock and a counting trigger.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use news_audio_generator::pipeline::{GenerationRecord, GenerationRequest};
use news_audio_generator::schedule::{
    Clock, GenerationTrigger, ScheduleController, ScheduleError, ScheduleSpec,
};
use news_audio_generator::PipelineError;

struct FakeClock(Mutex<NaiveDateTime>);

impl FakeClock {
    fn at(h: u32, m: u32) -> Arc<Self> {
        Arc::new(Self(Mutex::new(time(h, m))))
    }

    fn set(&self, h: u32, m: u32) {
        *self.0.lock().unwrap() = time(h, m);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap()
    }
}

fn time(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 10)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

#[derive(Default)]
struct CountingTrigger(AtomicUsize);

#[async_trait]
impl GenerationTrigger for CountingTrigger {
    async fn trigger(&self, _req: GenerationRequest) -> Result<GenerationRecord, PipelineError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Err(PipelineError::InvalidRequest("counted".into()))
    }
}

fn feed_request() -> GenerationRequest {
    GenerationRequest::from_urls(Some("https://x.test/rss"), None, "v1", 60, false).unwrap()
}

fn controller(clock: Arc<FakeClock>, trigger: Arc<CountingTrigger>) -> ScheduleController {
    ScheduleController::new(trigger)
        .with_clock(clock)
        .with_period(Duration::from_millis(10))
}

fn spec() -> ScheduleSpec {
    ScheduleSpec::new([9, 18], 30).unwrap()
}

#[tokio::test]
async fn before_slot_reports_next_delta_and_does_not_fire() {
    let trig = Arc::new(CountingTrigger::default());
    let mut ctl = controller(FakeClock::at(9, 15), trig.clone());
    ctl.arm(spec(), feed_request()).unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(ctl.next_slot().map(|d| d.to_string()).as_deref(), Some("0h15m"));
    assert_eq!(trig.0.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn matching_minute_fires_exactly_once() {
    let trig = Arc::new(CountingTrigger::default());
    let mut ctl = controller(FakeClock::at(9, 30), trig.clone());
    ctl.arm(spec(), feed_request()).unwrap();

    // many checks land inside the same wall-clock minute
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(trig.0.load(Ordering::SeqCst), 1);
    assert_eq!(ctl.next_slot(), None);
}

#[tokio::test]
async fn one_minute_late_waits_for_evening_slot() {
    let trig = Arc::new(CountingTrigger::default());
    let mut ctl = controller(FakeClock::at(9, 31), trig.clone());
    ctl.arm(spec(), feed_request()).unwrap();

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(ctl.next_slot().map(|d| d.to_string()).as_deref(), Some("8h59m"));
    assert_eq!(trig.0.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn disarm_stops_checks() {
    let clock = FakeClock::at(9, 15);
    let trig = Arc::new(CountingTrigger::default());
    let mut ctl = controller(clock.clone(), trig.clone());
    ctl.arm(spec(), feed_request()).unwrap();
    assert!(ctl.is_armed());

    ctl.disarm();
    ctl.disarm(); // idempotent
    assert!(!ctl.is_armed());
    assert!(ctl.spec().is_none());

    clock.set(9, 30);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(trig.0.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn page_target_is_rejected_and_previous_schedule_cancelled() {
    let trig = Arc::new(CountingTrigger::default());
    let mut ctl = controller(FakeClock::at(9, 15), trig);
    ctl.arm(spec(), feed_request()).unwrap();

    let page = GenerationRequest::from_urls(None, Some("https://x.test/a"), "v1", 60, false).unwrap();
    assert_eq!(ctl.arm(spec(), page), Err(ScheduleError::NotAFeed));
    assert!(!ctl.is_armed());
}

#[tokio::test]
async fn rearm_replaces_spec() {
    let clock = FakeClock::at(9, 15);
    let trig = Arc::new(CountingTrigger::default());
    let mut ctl = controller(clock.clone(), trig.clone());
    ctl.arm(spec(), feed_request()).unwrap();

    let evening = ScheduleSpec::new([20], 0).unwrap();
    ctl.arm(evening.clone(), feed_request()).unwrap();
    assert_eq!(ctl.spec(), Some(&evening));

    // old 09:30 slot no longer fires
    clock.set(9, 30);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(trig.0.load(Ordering::SeqCst), 0);
    assert_eq!(ctl.next_slot().map(|d| d.to_string()).as_deref(), Some("10h30m"));
}

#[tokio::test]
async fn dropping_controller_aborts_task() {
    let clock = FakeClock::at(9, 15);
    let trig = Arc::new(CountingTrigger::default());
    {
        let mut ctl = controller(clock.clone(), trig.clone());
        ctl.arm(spec(), feed_request()).unwrap();
    }
    clock.set(9, 30);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(trig.0.load(Ordering::SeqCst), 0);
}
