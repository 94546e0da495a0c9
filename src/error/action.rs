//! Recovery actions offered alongside an [`AppError`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use super::message::AppError;
use super::taxonomy::ErrorKind;

/// Async callback invoked when the user picks an action.
pub type ActionFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as an [`ActionFn`].
pub fn action_fn<F, Fut>(f: F) -> ActionFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// What an action does, independent of its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Retry,
    Login,
    Refresh,
    GoBack,
    Acknowledge,
}

impl ActionKind {
    fn label(self) -> &'static str {
        match self {
            Self::Retry => "다시 시도",
            Self::Login => "다시 로그인",
            Self::Refresh => "새로고침",
            Self::GoBack => "돌아가기",
            Self::Acknowledge => "확인",
        }
    }
}

/// A single offerable recovery action. Built per display, never stored.
#[derive(Clone)]
pub struct ErrorAction {
    pub kind: ActionKind,
    pub label: String,
    pub invoke: ActionFn,
    pub is_primary: bool,
}

impl fmt::Debug for ErrorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorAction")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("is_primary", &self.is_primary)
            .finish()
    }
}

impl ErrorAction {
    fn new(kind: ActionKind, invoke: ActionFn, is_primary: bool) -> Self {
        Self {
            kind,
            label: kind.label().to_string(),
            invoke,
            is_primary,
        }
    }

    /// Run the action's callback.
    pub async fn run(&self) {
        (self.invoke)().await;
    }
}

/// Recovery callbacks the calling screen can provide.
#[derive(Clone, Default)]
pub struct RecoveryCallbacks {
    pub on_retry: Option<ActionFn>,
    pub on_login: Option<ActionFn>,
    pub on_refresh: Option<ActionFn>,
    pub on_go_back: Option<ActionFn>,
}

impl RecoveryCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(mut self, f: ActionFn) -> Self {
        self.on_retry = Some(f);
        self
    }

    pub fn with_login(mut self, f: ActionFn) -> Self {
        self.on_login = Some(f);
        self
    }

    pub fn with_refresh(mut self, f: ActionFn) -> Self {
        self.on_refresh = Some(f);
        self
    }

    pub fn with_go_back(mut self, f: ActionFn) -> Self {
        self.on_go_back = Some(f);
        self
    }
}

/// Build the ordered list of actions to offer for `error`.
///
/// Never returns an empty list: with nothing applicable, a single no-op
/// "acknowledge" action is produced.
pub fn generate_actions(error: &AppError, callbacks: &RecoveryCallbacks) -> Vec<ErrorAction> {
    let mut actions = Vec::new();

    if let (true, Some(f)) = (error.retryable, &callbacks.on_retry) {
        actions.push(ErrorAction::new(ActionKind::Retry, f.clone(), true));
    }
    if let (ErrorKind::Auth, Some(f)) = (error.kind, &callbacks.on_login) {
        actions.push(ErrorAction::new(ActionKind::Login, f.clone(), true));
    }
    if let (ErrorKind::Network, Some(f)) = (error.kind, &callbacks.on_refresh) {
        actions.push(ErrorAction::new(ActionKind::Refresh, f.clone(), false));
    }
    if let Some(f) = &callbacks.on_go_back {
        actions.push(ErrorAction::new(ActionKind::GoBack, f.clone(), false));
    }

    if actions.is_empty() {
        actions.push(ErrorAction::new(
            ActionKind::Acknowledge,
            action_fn(|| async {}),
            true,
        ));
    }
    actions
}
