use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;

/// The lifecycle a mounted view may take part in. Every hook defaults to a
/// no-op, so a view implements only the phases it cares about and the
/// invoker never has to probe for a missing method.
#[async_trait]
pub trait View: Send + Sync {
    async fn will_appear(&self) -> Result<()> {
        Ok(())
    }
    async fn did_appear(&self) -> Result<()> {
        Ok(())
    }
    async fn will_enter(&self) -> Result<()> {
        Ok(())
    }
    async fn did_enter(&self) -> Result<()> {
        Ok(())
    }
    async fn will_leave(&self) -> Result<()> {
        Ok(())
    }
    async fn did_leave(&self) -> Result<()> {
        Ok(())
    }
    async fn same_will_enter(&self) -> Result<()> {
        Ok(())
    }
    async fn same_did_enter(&self) -> Result<()> {
        Ok(())
    }
    async fn same_will_leave(&self) -> Result<()> {
        Ok(())
    }
    async fn same_did_leave(&self) -> Result<()> {
        Ok(())
    }
}

/// Named lifecycle hooks, used to address overrides and dispatch onto a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    WillAppear,
    DidAppear,
    WillEnter,
    DidEnter,
    WillLeave,
    DidLeave,
    SameWillEnter,
    SameDidEnter,
    SameWillLeave,
    SameDidLeave,
}

impl Hook {
    pub fn name(self) -> &'static str {
        match self {
            Hook::WillAppear => "will_appear",
            Hook::DidAppear => "did_appear",
            Hook::WillEnter => "will_enter",
            Hook::DidEnter => "did_enter",
            Hook::WillLeave => "will_leave",
            Hook::DidLeave => "did_leave",
            Hook::SameWillEnter => "same_will_enter",
            Hook::SameDidEnter => "same_did_enter",
            Hook::SameWillLeave => "same_will_leave",
            Hook::SameDidLeave => "same_did_leave",
        }
    }

    /// The will/did pair for an arrival, picking the same-route variant when
    /// only route parameters changed.
    pub fn enter_pair(same_route: bool) -> (Hook, Hook) {
        if same_route {
            (Hook::SameWillEnter, Hook::SameDidEnter)
        } else {
            (Hook::WillEnter, Hook::DidEnter)
        }
    }

    /// The will/did pair for a departure.
    pub fn leave_pair(same_route: bool) -> (Hook, Hook) {
        if same_route {
            (Hook::SameWillLeave, Hook::SameDidLeave)
        } else {
            (Hook::WillLeave, Hook::DidLeave)
        }
    }

    pub fn appear_pair() -> (Hook, Hook) {
        (Hook::WillAppear, Hook::DidAppear)
    }
}

pub type HookFn = Arc<dyn Fn(Arc<dyn View>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Caller-supplied per-hook overrides, resolved once at construction. An
/// override takes precedence over the view's own implementation.
#[derive(Clone, Default)]
pub struct HookOverrides {
    overrides: HashMap<Hook, HookFn>,
}

impl HookOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, hook: Hook, hook_fn: HookFn) -> Self {
        self.overrides.insert(hook, hook_fn);
        self
    }

    fn get(&self, hook: Hook) -> Option<&HookFn> {
        self.overrides.get(&hook)
    }
}

/// Resolves and invokes lifecycle hooks: explicit override first, then the
/// view's own method (which defaults to a no-op). The returned future always
/// settles; it never mutates orchestrator state.
pub struct LifecycleInvoker {
    overrides: HookOverrides,
}

impl LifecycleInvoker {
    pub fn new(overrides: HookOverrides) -> Self {
        Self { overrides }
    }

    pub async fn invoke(&self, view: &Arc<dyn View>, hook: Hook) -> Result<()> {
        if let Some(hook_fn) = self.overrides.get(hook) {
            return hook_fn(Arc::clone(view)).await;
        }

        match hook {
            Hook::WillAppear => view.will_appear().await,
            Hook::DidAppear => view.did_appear().await,
            Hook::WillEnter => view.will_enter().await,
            Hook::DidEnter => view.did_enter().await,
            Hook::WillLeave => view.will_leave().await,
            Hook::DidLeave => view.did_leave().await,
            Hook::SameWillEnter => view.same_will_enter().await,
            Hook::SameDidEnter => view.same_did_enter().await,
            Hook::SameWillLeave => view.same_will_leave().await,
            Hook::SameDidLeave => view.same_did_leave().await,
        }
    }
}
