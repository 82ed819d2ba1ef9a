use crate::error::{Result, SocketError};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Trait for resolving the connection URL asynchronously
///
/// Called before every connection attempt (including reconnections), so
/// it can hand out a fresh endpoint, token or region each time.
///
/// # Example
/// ```ignore
/// struct Discovery {
///     registry: RegistryClient,
/// }
///
/// #[async_trait::async_trait]
/// impl AsyncAddress for Discovery {
///     async fn resolve(&self) -> Result<String> {
///         let node = self.registry.pick_node().await?;
///         Ok(format!("wss://{}/feed", node))
///     }
/// }
/// ```
#[async_trait]
pub trait AsyncAddress: Send + Sync {
    async fn resolve(&self) -> Result<String>;
}

type SyncAddressFn = dyn Fn() -> Result<String> + Send + Sync;

/// Where the scheduler gets the URL for the next attempt
#[derive(Clone)]
pub enum AddressProvider {
    /// Fixed URL
    Literal(String),
    /// Computed synchronously per attempt
    Sync(Arc<SyncAddressFn>),
    /// Resolved asynchronously per attempt
    Async(Arc<dyn AsyncAddress>),
}

impl AddressProvider {
    pub fn literal(url: impl Into<String>) -> Self {
        AddressProvider::Literal(url.into())
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> Result<String> + Send + Sync + 'static,
    {
        AddressProvider::Sync(Arc::new(f))
    }

    pub fn from_async(resolver: impl AsyncAddress + 'static) -> Self {
        AddressProvider::Async(Arc::new(resolver))
    }

    /// Resolve without suspending, if this provider can.
    ///
    /// Returns `None` for async providers.
    pub fn resolve_now(&self) -> Option<Result<String>> {
        match self {
            AddressProvider::Literal(url) => Some(Ok(url.clone())),
            AddressProvider::Sync(f) => Some(f()),
            AddressProvider::Async(_) => None,
        }
    }

    /// Resolve, suspending for async providers
    pub async fn resolve(&self) -> Result<String> {
        match self {
            AddressProvider::Async(resolver) => resolver.resolve().await,
            other => other
                .resolve_now()
                .unwrap_or_else(|| Err(SocketError::AddressResolution("unresolvable".into()))),
        }
    }
}

impl fmt::Debug for AddressProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressProvider::Literal(url) => f.debug_tuple("Literal").field(url).finish(),
            AddressProvider::Sync(_) => f.write_str("Sync(..)"),
            AddressProvider::Async(_) => f.write_str("Async(..)"),
        }
    }
}

impl From<&str> for AddressProvider {
    fn from(value: &str) -> Self {
        AddressProvider::literal(value)
    }
}

impl From<String> for AddressProvider {
    fn from(value: String) -> Self {
        AddressProvider::Literal(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Rotating {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AsyncAddress for Rotating {
        async fn resolve(&self) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("ws://node-{}", n))
        }
    }

    #[test]
    fn test_literal_and_sync_resolve_now() {
        let literal = AddressProvider::from("ws://localhost:8080");
        assert_eq!(literal.resolve_now().unwrap().unwrap(), "ws://localhost:8080");

        let sync = AddressProvider::from_fn(|| Ok("ws://computed".to_string()));
        assert_eq!(sync.resolve_now().unwrap().unwrap(), "ws://computed");
    }

    #[tokio::test]
    async fn test_async_provider_resolves_per_call() {
        let provider = AddressProvider::from_async(Rotating {
            calls: AtomicUsize::new(0),
        });
        assert!(provider.resolve_now().is_none());
        assert_eq!(provider.resolve().await.unwrap(), "ws://node-0");
        assert_eq!(provider.resolve().await.unwrap(), "ws://node-1");
    }
}
