use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use serde_json::json;
use shared::events::TransitionIndicator;
use tokio::time::sleep;
use tracing::info;
use transition_core::{
    RouteDefinition, RouteSet, SwitchOptions, TransitionOrchestrator, View,
};

mod config;

use config::load_settings;

#[derive(Parser, Debug)]
struct Cli {
    /// Run departure and arrival concurrently instead of sequentially.
    #[arg(long)]
    parallel: bool,
}

/// A view that logs its lifecycle and holds each hook briefly, standing in
/// for real mount/unmount effects.
struct DemoView {
    label: String,
    hold: Duration,
}

impl DemoView {
    async fn step(&self, hook: &str) -> Result<()> {
        info!(view = %self.label, hook, "view lifecycle");
        sleep(self.hold).await;
        Ok(())
    }
}

#[async_trait]
impl View for DemoView {
    async fn will_appear(&self) -> Result<()> {
        self.step("will_appear").await
    }
    async fn did_appear(&self) -> Result<()> {
        self.step("did_appear").await
    }
    async fn will_enter(&self) -> Result<()> {
        self.step("will_enter").await
    }
    async fn did_enter(&self) -> Result<()> {
        self.step("did_enter").await
    }
    async fn will_leave(&self) -> Result<()> {
        self.step("will_leave").await
    }
    async fn did_leave(&self) -> Result<()> {
        self.step("did_leave").await
    }
    async fn same_will_enter(&self) -> Result<()> {
        self.step("same_will_enter").await
    }
    async fn same_did_enter(&self) -> Result<()> {
        self.step("same_did_enter").await
    }
    async fn same_will_leave(&self) -> Result<()> {
        self.step("same_will_leave").await
    }
    async fn same_did_leave(&self) -> Result<()> {
        self.step("same_did_leave").await
    }
}

fn demo_routes(hold: Duration) -> Result<RouteSet> {
    let home = RouteDefinition::new("home", "/", move |matched| {
        Arc::new(DemoView {
            label: matched.url.clone(),
            hold,
        }) as Arc<dyn View>
    })?
    .with_meta(json!({ "section": "landing" }));

    let user = RouteDefinition::new("user", "/user/:id", move |matched| {
        Arc::new(DemoView {
            label: matched.url.clone(),
            hold,
        }) as Arc<dyn View>
    })?
    .with_meta(json!({ "section": "profile" }))
    .with_preload(|| async { Ok(()) })
    .with_fetch(move |matched, notifier| async move {
        sleep(hold * 2).await;
        notifier.notify(json!({ "loaded": matched.url }));
        Ok(())
    });

    let not_found = RouteDefinition::fallback("not-found", move |matched| {
        Arc::new(DemoView {
            label: format!("404 {}", matched.url),
            hold,
        }) as Arc<dyn View>
    });

    Ok(RouteSet::new(vec![home, user, not_found]))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let cli = Cli::parse();
    let settings = load_settings();
    let parallel = cli.parallel || settings.parallel;
    let hold = Duration::from_millis(settings.step_delay_ms);

    info!(parallel, initial_path = %settings.initial_path, "starting transition tour");

    let orchestrator = TransitionOrchestrator::new(demo_routes(hold)?, SwitchOptions { parallel });

    let mut rx = orchestrator.subscribe_events();
    tokio::spawn(async move {
        let mut indicator = TransitionIndicator::default();
        while let Ok(event) = rx.recv().await {
            indicator.apply(&event);
            info!(?event, is_active = indicator.is_active, "transition event");
        }
    });

    // Initial mount: appear pair only.
    orchestrator.navigate(settings.initial_path.as_str()).await?;

    // Full transition home -> user, gated on the user fetch.
    let outcome = orchestrator.navigate("/user/1").await?;
    info!(?outcome, "full transition finished");

    // Same route, parameters changed: lighter lifecycle variant.
    let outcome = orchestrator.navigate("/user/2").await?;
    info!(?outcome, "same-route transition finished");

    // Supersede a pending fetch: /user/4 wins, /user/3 is abandoned.
    let racing = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.navigate("/user/3").await })
    };
    sleep(hold).await;
    let newest = orchestrator.navigate("/user/4").await?;
    let raced = racing.await??;
    info!(?raced, ?newest, "race resolved in favor of the newest navigation");

    // Unknown path falls back to the pattern-less route.
    orchestrator.navigate("/missing").await?;

    if let Some(current) = orchestrator.current_slot().await {
        info!(
            key = %current.key,
            path = %current.location.path,
            "tour finished"
        );
    }

    Ok(())
}
