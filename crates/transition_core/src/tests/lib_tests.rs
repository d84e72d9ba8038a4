use std::{sync::Mutex as StdMutex, time::Duration};

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::json;
use tokio::time::sleep;

use super::*;

#[derive(Default)]
struct CallLog {
    calls: StdMutex<Vec<String>>,
}

impl CallLog {
    fn record(&self, name: &str, hook: &str) {
        self.calls
            .lock()
            .expect("call log")
            .push(format!("{name}:{hook}"));
    }

    fn snapshot(&self) -> Vec<String> {
        self.calls.lock().expect("call log").clone()
    }

    fn contains(&self, entry: &str) -> bool {
        self.snapshot().iter().any(|call| call == entry)
    }
}

struct RecordingView {
    name: String,
    log: Arc<CallLog>,
    hook_delay: Duration,
    fail_hook: Option<&'static str>,
}

impl RecordingView {
    async fn touch(&self, hook: &'static str) -> Result<()> {
        if !self.hook_delay.is_zero() {
            sleep(self.hook_delay).await;
        }
        self.log.record(&self.name, hook);
        if self.fail_hook == Some(hook) {
            return Err(anyhow!("{hook} rejected"));
        }
        Ok(())
    }
}

#[async_trait]
impl View for RecordingView {
    async fn will_appear(&self) -> Result<()> {
        self.touch("will_appear").await
    }
    async fn did_appear(&self) -> Result<()> {
        self.touch("did_appear").await
    }
    async fn will_enter(&self) -> Result<()> {
        self.touch("will_enter").await
    }
    async fn did_enter(&self) -> Result<()> {
        self.touch("did_enter").await
    }
    async fn will_leave(&self) -> Result<()> {
        self.touch("will_leave").await
    }
    async fn did_leave(&self) -> Result<()> {
        self.touch("did_leave").await
    }
    async fn same_will_enter(&self) -> Result<()> {
        self.touch("same_will_enter").await
    }
    async fn same_did_enter(&self) -> Result<()> {
        self.touch("same_did_enter").await
    }
    async fn same_will_leave(&self) -> Result<()> {
        self.touch("same_will_leave").await
    }
    async fn same_did_leave(&self) -> Result<()> {
        self.touch("same_did_leave").await
    }
}

fn recording_factory(
    log: &Arc<CallLog>,
    hook_delay: Duration,
    fail_hook: Option<&'static str>,
) -> impl Fn(&RouteMatch) -> Arc<dyn View> + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |matched| {
        Arc::new(RecordingView {
            name: matched.url.clone(),
            log: Arc::clone(&log),
            hook_delay,
            fail_hook,
        }) as Arc<dyn View>
    }
}

fn recording_route(key: &str, pattern: &str, log: &Arc<CallLog>) -> RouteDefinition {
    RouteDefinition::new(key, pattern, recording_factory(log, Duration::ZERO, None))
        .expect("route pattern")
}

fn basic_routes(log: &Arc<CallLog>) -> RouteSet {
    RouteSet::new(vec![
        recording_route("home", "/", log),
        recording_route("user", "/user/:id", log),
    ])
}

fn drain_events(rx: &mut broadcast::Receiver<TransitionEvent>) -> Vec<TransitionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn appear_runs_only_for_the_first_navigation() {
    let log = Arc::new(CallLog::default());
    let orchestrator = TransitionOrchestrator::new(basic_routes(&log), SwitchOptions::default());

    let outcome = orchestrator.navigate("/").await.expect("first navigation");
    assert_eq!(outcome, NavigationOutcome::Completed);
    assert_eq!(log.snapshot(), vec!["/:will_appear", "/:did_appear"]);

    orchestrator.navigate("/user/1").await.expect("second navigation");
    let appears = log
        .snapshot()
        .iter()
        .filter(|call| call.contains("appear"))
        .count();
    assert_eq!(appears, 2, "appear pair never runs again");
}

#[tokio::test]
async fn full_transition_runs_leave_then_enter() {
    let log = Arc::new(CallLog::default());
    let orchestrator = TransitionOrchestrator::new(basic_routes(&log), SwitchOptions::default());

    orchestrator.navigate("/").await.expect("mount");
    let outcome = orchestrator.navigate("/user/1").await.expect("transition");
    assert_eq!(outcome, NavigationOutcome::Completed);

    let calls = log.snapshot();
    assert_eq!(
        calls[2..],
        [
            "/:will_leave",
            "/:did_leave",
            "/user/1:will_enter",
            "/user/1:did_enter",
        ]
    );

    let current = orchestrator.current_slot().await.expect("current");
    assert_eq!(current.key, RouteKey::new("user"));
    assert_eq!(current.location.path, "/user/1");
    assert!(orchestrator.is_idle().await);
}

#[tokio::test]
async fn same_route_transition_uses_only_same_variants() {
    let log = Arc::new(CallLog::default());
    let orchestrator = TransitionOrchestrator::new(basic_routes(&log), SwitchOptions::default());

    orchestrator.navigate("/").await.expect("mount");
    orchestrator.navigate("/user/1").await.expect("full");
    orchestrator.navigate("/user/2").await.expect("same route");

    let calls = log.snapshot();
    assert_eq!(
        calls[6..],
        [
            "/user/1:same_will_leave",
            "/user/1:same_did_leave",
            "/user/2:same_will_enter",
            "/user/2:same_did_enter",
        ]
    );
}

#[tokio::test]
async fn unchanged_navigation_is_ignored() {
    let log = Arc::new(CallLog::default());
    let orchestrator = TransitionOrchestrator::new(basic_routes(&log), SwitchOptions::default());

    orchestrator.navigate("/").await.expect("mount");
    orchestrator.navigate("/user/1").await.expect("full");
    let before = log.snapshot();

    let mut rx = orchestrator.subscribe_events();
    let outcome = orchestrator.navigate("/user/1").await.expect("repeat");

    assert_eq!(outcome, NavigationOutcome::Ignored);
    assert_eq!(log.snapshot(), before);
    assert!(drain_events(&mut rx).is_empty());
}

#[tokio::test]
async fn resolution_failure_is_fatal_and_runs_nothing() {
    let log = Arc::new(CallLog::default());
    let orchestrator = TransitionOrchestrator::new(basic_routes(&log), SwitchOptions::default());
    let mut rx = orchestrator.subscribe_events();

    let err = orchestrator
        .navigate("/does-not-exist")
        .await
        .expect_err("no fallback registered");
    assert_eq!(
        err,
        ResolveError::NoRouteMatched {
            path: "/does-not-exist".to_string()
        }
    );
    assert!(log.snapshot().is_empty());
    assert!(drain_events(&mut rx).is_empty());
    assert!(orchestrator.current_slot().await.is_none());
}

#[tokio::test]
async fn patternless_route_catches_unmatched_paths() {
    let log = Arc::new(CallLog::default());
    let routes = RouteSet::new(vec![
        recording_route("home", "/", &log),
        RouteDefinition::fallback("not-found", recording_factory(&log, Duration::ZERO, None)),
    ]);
    let orchestrator = TransitionOrchestrator::new(routes, SwitchOptions::default());

    orchestrator.navigate("/").await.expect("mount");
    orchestrator.navigate("/missing").await.expect("fallback");

    let current = orchestrator.current_slot().await.expect("current");
    assert_eq!(current.key, RouteKey::new("not-found"));
    assert_eq!(current.matched.pattern, None);
}

#[tokio::test]
async fn race_discards_superseded_fetch_and_swaps_to_newest_target() {
    let log = Arc::new(CallLog::default());
    let fetch_log = Arc::clone(&log);
    let user = recording_route("user", "/user/:id", &log).with_fetch(move |matched, _notifier| {
        let log = Arc::clone(&fetch_log);
        async move {
            log.record(&matched.url, "fetch_start");
            sleep(Duration::from_millis(80)).await;
            log.record(&matched.url, "fetch_end");
            Ok(())
        }
    });
    let routes = RouteSet::new(vec![recording_route("home", "/", &log), user]);
    let orchestrator = TransitionOrchestrator::new(routes, SwitchOptions::default());

    orchestrator.navigate("/").await.expect("mount");
    orchestrator.navigate("/user/1").await.expect("full");

    let superseded = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.navigate("/user/2").await })
    };
    sleep(Duration::from_millis(20)).await;

    assert!(orchestrator.is_fetch_pending().await);
    assert!(orchestrator.next_slot().await.is_none());

    let outcome = orchestrator.navigate("/user/3").await.expect("newest");
    assert_eq!(outcome, NavigationOutcome::Completed);
    assert_eq!(
        superseded.await.expect("join").expect("resolves"),
        NavigationOutcome::Superseded
    );

    let current = orchestrator.current_slot().await.expect("current");
    assert_eq!(current.location.path, "/user/3");
    assert!(orchestrator.is_idle().await);

    // Both fetches fired, but the superseded one's settlement was discarded:
    // no hook of the /user/2 transition ever ran.
    assert!(log.contains("/user/2:fetch_start"));
    assert!(log.contains("/user/3:fetch_start"));
    assert!(!log.contains("/user/2:same_will_enter"));
    assert!(!log.contains("/user/1:same_will_leave"));
    assert!(log.contains("/user/3:same_will_enter"));
    assert!(log.contains("/user/3:same_did_enter"));
}

#[tokio::test]
async fn parallel_mode_overlaps_departure_and_arrival() {
    let log = Arc::new(CallLog::default());
    let routes = RouteSet::new(vec![
        RouteDefinition::new(
            "home",
            "/",
            recording_factory(&log, Duration::from_millis(40), None),
        )
        .expect("home"),
        RouteDefinition::new(
            "user",
            "/user/:id",
            recording_factory(&log, Duration::from_millis(40), None),
        )
        .expect("user"),
    ]);
    let orchestrator = TransitionOrchestrator::new(routes, SwitchOptions { parallel: true });
    let mut rx = orchestrator.subscribe_events();

    orchestrator.navigate("/").await.expect("mount");

    let transition = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.navigate("/user/1").await })
    };
    sleep(Duration::from_millis(20)).await;

    // During the overlap both slots are mounted.
    assert!(orchestrator.next_slot().await.is_some());
    assert!(orchestrator.is_leave_pending().await);

    let outcome = transition.await.expect("join").expect("transition");
    assert_eq!(outcome, NavigationOutcome::Completed);
    assert!(orchestrator.next_slot().await.is_none());
    assert!(!orchestrator.is_leave_pending().await);

    let calls = log.snapshot();
    for hook in [
        "/:will_leave",
        "/:did_leave",
        "/user/1:will_enter",
        "/user/1:did_enter",
    ] {
        assert!(calls.iter().any(|call| call == hook), "missing {hook}");
    }

    // Arrival started before departure finished: the sub-flows overlapped.
    // The last enter-start is the transition's (the first belongs to the
    // appear pair of the initial mount).
    let events = drain_events(&mut rx);
    let enter_start = events
        .iter()
        .rposition(|event| matches!(event, TransitionEvent::EnterStart { .. }))
        .expect("enter start");
    let leave_finish = events
        .iter()
        .position(|event| matches!(event, TransitionEvent::LeaveFinish { .. }))
        .expect("leave finish");
    assert!(enter_start < leave_finish);

    let current = orchestrator.current_slot().await.expect("current");
    assert_eq!(current.location.path, "/user/1");
}

#[tokio::test]
async fn hook_failure_is_swallowed_and_reported() {
    let log = Arc::new(CallLog::default());
    let routes = RouteSet::new(vec![
        recording_route("home", "/", &log),
        RouteDefinition::new(
            "user",
            "/user/:id",
            recording_factory(&log, Duration::ZERO, Some("will_enter")),
        )
        .expect("user"),
    ]);
    let orchestrator = TransitionOrchestrator::new(routes, SwitchOptions::default());
    let mut rx = orchestrator.subscribe_events();

    orchestrator.navigate("/").await.expect("mount");
    let outcome = orchestrator.navigate("/user/1").await.expect("transition");
    assert_eq!(outcome, NavigationOutcome::Completed);

    // The failed hook did not stall the pipeline.
    assert!(log.contains("/user/1:did_enter"));

    let events = drain_events(&mut rx);
    assert!(events.iter().any(|event| matches!(
        event,
        TransitionEvent::PhaseFailed { phase: Phase::Enter, reason } if reason.contains("will_enter")
    )));
}

#[tokio::test]
async fn fetch_failure_is_swallowed_and_reported() {
    let log = Arc::new(CallLog::default());
    let user = recording_route("user", "/user/:id", &log)
        .with_fetch(|_matched, _notifier| async { Err(anyhow!("backend unavailable")) });
    let routes = RouteSet::new(vec![recording_route("home", "/", &log), user]);
    let orchestrator = TransitionOrchestrator::new(routes, SwitchOptions::default());
    let mut rx = orchestrator.subscribe_events();

    orchestrator.navigate("/").await.expect("mount");
    let outcome = orchestrator.navigate("/user/1").await.expect("transition");
    assert_eq!(outcome, NavigationOutcome::Completed);
    assert!(log.contains("/user/1:will_enter"));

    let events = drain_events(&mut rx);
    assert!(events.iter().any(|event| matches!(
        event,
        TransitionEvent::PhaseFailed { phase: Phase::Fetch, reason } if reason.contains("backend")
    )));
}

#[tokio::test]
async fn fetch_notifier_forwards_payloads_to_the_event_channel() {
    let log = Arc::new(CallLog::default());
    let user = recording_route("user", "/user/:id", &log).with_fetch(|matched, notifier| async move {
        notifier.notify(json!({ "loaded": matched.url }));
        Ok(())
    });
    let routes = RouteSet::new(vec![recording_route("home", "/", &log), user]);
    let orchestrator = TransitionOrchestrator::new(routes, SwitchOptions::default());
    let mut rx = orchestrator.subscribe_events();

    orchestrator.navigate("/").await.expect("mount");
    orchestrator.navigate("/user/7").await.expect("transition");

    let events = drain_events(&mut rx);
    assert!(events.iter().any(|event| matches!(
        event,
        TransitionEvent::FetchNotice { payload } if payload["loaded"] == "/user/7"
    )));
}

#[tokio::test]
async fn preload_runs_before_fetch() {
    let log = Arc::new(CallLog::default());
    let preload_log = Arc::clone(&log);
    let fetch_log = Arc::clone(&log);
    let user = recording_route("user", "/user/:id", &log)
        .with_preload(move || {
            let log = Arc::clone(&preload_log);
            async move {
                log.record("user", "preload");
                Ok(())
            }
        })
        .with_fetch(move |_matched, _notifier| {
            let log = Arc::clone(&fetch_log);
            async move {
                log.record("user", "fetch");
                Ok(())
            }
        });
    let routes = RouteSet::new(vec![recording_route("home", "/", &log), user]);
    let orchestrator = TransitionOrchestrator::new(routes, SwitchOptions::default());

    orchestrator.navigate("/").await.expect("mount");
    orchestrator.navigate("/user/1").await.expect("transition");

    let calls = log.snapshot();
    let preload = calls.iter().position(|call| call == "user:preload").expect("preload ran");
    let fetch = calls.iter().position(|call| call == "user:fetch").expect("fetch ran");
    assert!(preload < fetch);
}

#[tokio::test]
async fn hook_override_takes_precedence_over_view_method() {
    let log = Arc::new(CallLog::default());
    let override_log = Arc::clone(&log);
    let overrides = HookOverrides::new().with(
        Hook::WillEnter,
        Arc::new(move |_view| {
            let log = Arc::clone(&override_log);
            Box::pin(async move {
                log.record("override", "will_enter");
                Ok(())
            })
        }),
    );
    let orchestrator =
        TransitionOrchestrator::new_with_overrides(basic_routes(&log), SwitchOptions::default(), overrides);

    orchestrator.navigate("/").await.expect("mount");
    orchestrator.navigate("/user/1").await.expect("transition");

    assert!(log.contains("override:will_enter"));
    assert!(!log.contains("/user/1:will_enter"));
    assert!(log.contains("/user/1:did_enter"));
}

#[tokio::test]
async fn events_carry_the_same_route_flag() {
    let log = Arc::new(CallLog::default());
    let orchestrator = TransitionOrchestrator::new(basic_routes(&log), SwitchOptions::default());

    orchestrator.navigate("/").await.expect("mount");
    orchestrator.navigate("/user/1").await.expect("full");

    let mut rx = orchestrator.subscribe_events();
    orchestrator.navigate("/user/2").await.expect("same route");

    let events = drain_events(&mut rx);
    assert!(!events.is_empty());
    for event in &events {
        match event {
            TransitionEvent::TransitionStart { same_route, .. }
            | TransitionEvent::EnterStart { same_route }
            | TransitionEvent::EnterFinish { same_route }
            | TransitionEvent::LeaveStart { same_route }
            | TransitionEvent::LeaveFinish { same_route } => assert!(*same_route),
            TransitionEvent::PhaseFailed { .. } | TransitionEvent::FetchNotice { .. } => {}
        }
    }
}

#[tokio::test]
async fn transition_start_carries_route_meta() {
    let log = Arc::new(CallLog::default());
    let user = RouteDefinition::new(
        "user",
        "/user/:id",
        recording_factory(&log, Duration::ZERO, None),
    )
    .expect("user")
    .with_meta(json!({ "section": "profile" }));
    let routes = RouteSet::new(vec![recording_route("home", "/", &log), user]);
    let orchestrator = TransitionOrchestrator::new(routes, SwitchOptions::default());

    orchestrator.navigate("/").await.expect("mount");
    let mut rx = orchestrator.subscribe_events();
    orchestrator.navigate("/user/1").await.expect("transition");

    let events = drain_events(&mut rx);
    let meta = events
        .iter()
        .find_map(|event| match event {
            TransitionEvent::TransitionStart { key, meta, .. } if *key == RouteKey::new("user") => {
                meta.clone()
            }
            _ => None,
        })
        .expect("meta on transition start");
    assert_eq!(meta["section"], "profile");
}
