pub mod states;

use crate::batcher::DebouncedBatcher;
use crate::client::ResilientClient;
use crate::config::{ConnectionOptions, RetryPolicy};
use crate::connection::{Connection, HostEvent};
use crate::scheduler::ReconnectingSocket;
use crate::traits::*;
use crate::tungstenite::TungsteniteConnector;
use crossbeam_channel::Sender;
use states::*;
use std::thread::JoinHandle;
use std::time::Duration;

/// Produces the handler once the host channel exists
type HandlerFactory<H> =
    Box<dyn FnOnce(Sender<HostEvent>) -> Result<(H, Option<JoinHandle<()>>)> + Send>;

/// Type-state builder for [`ResilientClient`]
///
/// The type system enforces that an address and a handler are set before
/// the client can be built. Everything else has defaults.
pub struct ResilientClientBuilder<A, Hs, H, C>
where
    A: AddressState,
    Hs: HandlerState,
{
    _state: TypeState<A, Hs>,
    address: Option<AddressProvider>,
    handler: Option<HandlerFactory<H>>,
    connector: C,
    policy: RetryPolicy,
    options: ConnectionOptions,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    subscriptions: Vec<(String, WsMessage)>,
}

impl ResilientClientBuilder<NoAddress, NoHandler, NoOpHandler, TungsteniteConnector> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            address: None,
            handler: None,
            connector: TungsteniteConnector,
            policy: RetryPolicy::default(),
            options: ConnectionOptions::default(),
            reconnect_strategy: None,
            subscriptions: Vec::new(),
        }
    }
}

impl Default for ResilientClientBuilder<NoAddress, NoHandler, NoOpHandler, TungsteniteConnector> {
    fn default() -> Self {
        Self::new()
    }
}

// Address setting
impl<Hs, H, C> ResilientClientBuilder<NoAddress, Hs, H, C>
where
    Hs: HandlerState,
{
    /// Use a provider resolved before every attempt
    pub fn address(self, address: AddressProvider) -> ResilientClientBuilder<HasAddress, Hs, H, C> {
        ResilientClientBuilder {
            _state: TypeState::new(),
            address: Some(address),
            handler: self.handler,
            connector: self.connector,
            policy: self.policy,
            options: self.options,
            reconnect_strategy: self.reconnect_strategy,
            subscriptions: self.subscriptions,
        }
    }

    /// Fixed URL
    pub fn url(self, url: impl Into<String>) -> ResilientClientBuilder<HasAddress, Hs, H, C> {
        self.address(AddressProvider::literal(url))
    }

    /// URL computed per attempt
    pub fn url_fn<F>(self, f: F) -> ResilientClientBuilder<HasAddress, Hs, H, C>
    where
        F: Fn() -> Result<String> + Send + Sync + 'static,
    {
        self.address(AddressProvider::from_fn(f))
    }

    /// URL resolved asynchronously per attempt
    pub fn url_async(
        self,
        resolver: impl AsyncAddress + 'static,
    ) -> ResilientClientBuilder<HasAddress, Hs, H, C> {
        self.address(AddressProvider::from_async(resolver))
    }
}

// Handler setting
impl<A, C> ResilientClientBuilder<A, NoHandler, NoOpHandler, C>
where
    A: AddressState,
{
    /// Deliver messages to `handler` on the connection task
    pub fn handler<H>(self, handler: H) -> ResilientClientBuilder<A, HasHandler, H, C>
    where
        H: MessageHandler,
    {
        self.handler_factory(Box::new(move |_| Ok((handler, None))))
    }

    /// Post delivered messages to the host in debounced batches
    pub fn batched(
        self,
        window: Duration,
    ) -> ResilientClientBuilder<A, HasHandler, DebouncedBatcher, C> {
        self.handler_factory(Box::new(move |host_tx| {
            let (batcher, thread) = DebouncedBatcher::spawn(window, host_tx)?;
            Ok((batcher, Some(thread)))
        }))
    }

    fn handler_factory<H>(
        self,
        factory: HandlerFactory<H>,
    ) -> ResilientClientBuilder<A, HasHandler, H, C> {
        ResilientClientBuilder {
            _state: TypeState::new(),
            address: self.address,
            handler: Some(factory),
            connector: self.connector,
            policy: self.policy,
            options: self.options,
            reconnect_strategy: self.reconnect_strategy,
            subscriptions: self.subscriptions,
        }
    }
}

// Optional settings
impl<A, Hs, H, C> ResilientClientBuilder<A, Hs, H, C>
where
    A: AddressState,
    Hs: HandlerState,
{
    /// Replace the default transport
    pub fn connector<C2: Connector>(self, connector: C2) -> ResilientClientBuilder<A, Hs, H, C2> {
        ResilientClientBuilder {
            _state: TypeState::new(),
            address: self.address,
            handler: self.handler,
            connector,
            policy: self.policy,
            options: self.options,
            reconnect_strategy: self.reconnect_strategy,
            subscriptions: self.subscriptions,
        }
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn connection_id(mut self, id: impl Into<String>) -> Self {
        self.options.connection_id = id.into();
        self
    }

    pub fn defer_updates(mut self, defer: bool) -> Self {
        self.options.defer_updates = defer;
        self
    }

    pub fn start_closed(mut self, start_closed: bool) -> Self {
        self.policy.start_closed = start_closed;
        self
    }

    /// Override the backoff derived from the retry policy
    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect_strategy = Some(Box::new(strategy));
        self
    }

    /// Register a payload sent after every open, ahead of queued sends
    pub fn subscription(mut self, id: impl Into<String>, payload: impl Into<WsMessage>) -> Self {
        self.subscriptions.push((id.into(), payload.into()));
        self
    }
}

impl<H, C> ResilientClientBuilder<HasAddress, HasHandler, H, C>
where
    H: MessageHandler,
    C: Connector,
{
    /// Validate the configuration and start the connection task
    pub async fn build(self) -> Result<ResilientClient> {
        let address = self
            .address
            .ok_or_else(|| SocketError::Configuration("address must be set".into()))?;
        let make_handler = self
            .handler
            .ok_or_else(|| SocketError::Configuration("handler must be set".into()))?;

        self.policy.validate()?;
        let strategy = match self.reconnect_strategy {
            Some(strategy) => strategy,
            None => Box::new(self.policy.strategy()),
        };

        let (host_tx, host_rx) = crossbeam_channel::unbounded();
        let (handler, handler_thread) = make_handler(host_tx.clone())?;

        let (transport_tx, transport_rx) = tokio::sync::mpsc::unbounded_channel();
        let (resolved_tx, resolved_rx) = tokio::sync::mpsc::unbounded_channel();

        let socket = ReconnectingSocket::new(
            self.connector,
            address,
            self.policy,
            strategy,
            transport_tx,
            resolved_tx,
        )
        .with_protocols(self.options.protocols.clone())
        .with_binary_mode(self.options.binary_mode);

        let mut connection = Connection::new(socket, handler, self.options, host_tx);
        for (id, payload) in self.subscriptions {
            connection.subscribe(id, payload);
        }

        let mut client = ResilientClient::spawn(connection, transport_rx, resolved_rx, host_rx);
        client.handler_handles.extend(handler_thread);

        Ok(client)
    }
}
