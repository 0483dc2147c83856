//! One-shot lazy authentication handle.
//!
//! Wraps the identity arguments, the auth manager, and a one-time
//! initializer behind a latch so concurrent consumers race safely: the
//! first `get` runs authentication, everyone else waits and observes the
//! same context. The handle moves `Pending → Initializing → Ready`, or
//! terminally `Disabled` when auth was explicitly turned off or scanning
//! found no auth-requiring patterns.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{AuthContext, AuthManager};

/// How an invocation asked for authentication.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthRequest {
    /// No flag given: authenticate the default identity when patterns
    /// demand it.
    #[default]
    Auto,
    /// `--identity NAME`: authenticate immediately, bypassing the scan.
    Explicit(Vec<String>),
    /// `--identity=false` (or a boolean-like variant): never authenticate,
    /// including any configured default.
    Disabled,
}

impl AuthRequest {
    /// Parse the repeated `--identity` flag values.
    ///
    /// `false`, `off`, `no`, and `0` disable auth outright; any other value
    /// names an identity.
    pub fn from_flags(values: &[String]) -> Self {
        if values.is_empty() {
            return Self::Auto;
        }
        if values.iter().any(|v| matches!(v.as_str(), "false" | "off" | "no" | "0")) {
            return Self::Disabled;
        }
        Self::Explicit(values.to_vec())
    }
}

/// Lazily-initialized authentication context.
pub struct LazyAuthHandle {
    request: AuthRequest,
    manager: Arc<dyn AuthManager>,
    /// Whether the scoped raw config contains auth-requiring patterns.
    patterns_present: bool,
    cell: OnceCell<Option<Arc<AuthContext>>>,
}

impl LazyAuthHandle {
    /// Build a handle for one invocation.
    pub fn new(request: AuthRequest, manager: Arc<dyn AuthManager>, patterns_present: bool) -> Self {
        Self { request, manager, patterns_present, cell: OnceCell::new() }
    }

    /// A handle that will never authenticate.
    pub fn disabled(manager: Arc<dyn AuthManager>) -> Self {
        Self::new(AuthRequest::Disabled, manager, false)
    }

    /// Whether `get` would perform (or has performed) authentication.
    pub fn is_enabled(&self) -> bool {
        match &self.request {
            AuthRequest::Disabled => false,
            AuthRequest::Explicit(_) => true,
            AuthRequest::Auto => self.patterns_present,
        }
    }

    /// The context, authenticating on first access.
    ///
    /// Returns `None` when the handle is disabled or nothing requires
    /// auth. Concurrent callers block on the latch and observe the single
    /// initialization.
    pub async fn get(&self) -> Result<Option<Arc<AuthContext>>> {
        let result = self
            .cell
            .get_or_try_init(|| async {
                match &self.request {
                    AuthRequest::Disabled => {
                        debug!("authentication disabled for this invocation");
                        Ok::<_, anyhow::Error>(None)
                    }
                    AuthRequest::Auto if !self.patterns_present => {
                        debug!("no auth-requiring patterns in scope; skipping authentication");
                        Ok(None)
                    }
                    AuthRequest::Auto => {
                        let Some(identity) = self.manager.default_identity() else {
                            return Ok(None);
                        };
                        let mut ctx = AuthContext::new();
                        self.manager.authenticate(&identity, &mut ctx).await?;
                        Ok(Some(Arc::new(ctx)))
                    }
                    AuthRequest::Explicit(identities) => {
                        let mut ctx = AuthContext::new();
                        for identity in identities {
                            self.manager.authenticate(identity, &mut ctx).await?;
                        }
                        Ok(Some(Arc::new(ctx)))
                    }
                }
            })
            .await?;
        Ok(result.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ProviderCredentials;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts authenticate calls; the lazy-auth correctness tests hinge on
    /// this staying at zero or one.
    struct CountingManager {
        calls: AtomicUsize,
        default: Option<String>,
    }

    impl AuthManager for CountingManager {
        fn authenticate<'a>(
            &'a self,
            identity: &'a str,
            ctx: &'a mut AuthContext,
        ) -> BoxFuture<'a, Result<()>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                ctx.insert(identity, ProviderCredentials::Github { token: "t".into() });
                Ok(())
            })
        }

        fn default_identity(&self) -> Option<String> {
            self.default.clone()
        }
    }

    fn manager(default: Option<&str>) -> Arc<CountingManager> {
        Arc::new(CountingManager {
            calls: AtomicUsize::new(0),
            default: default.map(ToString::to_string),
        })
    }

    #[tokio::test]
    async fn no_patterns_means_no_auth_call_even_with_default() {
        let mgr = manager(Some("deploy"));
        let handle = LazyAuthHandle::new(AuthRequest::Auto, mgr.clone(), false);
        assert!(handle.get().await.unwrap().is_none());
        assert_eq!(mgr.calls.load(Ordering::SeqCst), 0);
        assert!(!handle.is_enabled());
    }

    #[tokio::test]
    async fn patterns_present_authenticates_default_once() {
        let mgr = manager(Some("deploy"));
        let handle = LazyAuthHandle::new(AuthRequest::Auto, mgr.clone(), true);
        let ctx = handle.get().await.unwrap().unwrap();
        assert_eq!(ctx.identities(), ["deploy"]);
        handle.get().await.unwrap();
        assert_eq!(mgr.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn explicit_identity_bypasses_the_scan() {
        let mgr = manager(None);
        let handle = LazyAuthHandle::new(
            AuthRequest::Explicit(vec!["ops".to_string()]),
            mgr.clone(),
            false,
        );
        let ctx = handle.get().await.unwrap().unwrap();
        assert_eq!(ctx.identities(), ["ops"]);
    }

    #[tokio::test]
    async fn disabled_wins_over_everything() {
        let mgr = manager(Some("deploy"));
        let handle = LazyAuthHandle::new(AuthRequest::Disabled, mgr.clone(), true);
        assert!(handle.get().await.unwrap().is_none());
        assert_eq!(mgr.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_readers_share_one_initialization() {
        let mgr = manager(Some("deploy"));
        let handle =
            Arc::new(LazyAuthHandle::new(AuthRequest::Auto, mgr.clone(), true));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                tokio::spawn(async move { handle.get().await.unwrap() })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_some());
        }
        assert_eq!(mgr.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn flag_parsing_recognizes_boolean_disable() {
        assert_eq!(AuthRequest::from_flags(&[]), AuthRequest::Auto);
        assert_eq!(AuthRequest::from_flags(&["false".into()]), AuthRequest::Disabled);
        assert_eq!(
            AuthRequest::from_flags(&["deploy".into()]),
            AuthRequest::Explicit(vec!["deploy".into()])
        );
    }
}
