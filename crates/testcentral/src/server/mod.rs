//! GATT server controller
//!
//! [`GattServer`] is a cheap handle onto a worker task that owns the server
//! state. Start, stop, manual notifications and subscriber-count changes are
//! all queued on one channel and applied in order, so transitions never race
//! and no subscription update is lost while a start or stop is in flight.

pub mod tracker;

#[cfg(test)]
mod tests;

pub use tracker::SubscriptionTracker;

use crate::clock::TickClock;
use crate::config::PeripheralConfig;
use crate::error::{Error, Result};
use crate::gatt::{
    profile, CharacteristicHandle, CharacteristicHandlers, RegisteredService, SubscriptionHandler,
};
use crate::transport::{AdvertisementOptions, Transport, TransportError, TransportResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 16;

/// Advertising state of the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    Advertising,
}

/// Notifications about work the server did in the background
#[derive(Debug, Clone)]
pub enum ServerEvent {
    StateChanged(ServerState),
    /// A start requested through [`GattServer::toggle`] failed
    StartFailed(Arc<Error>),
    /// A stop requested through [`GattServer::toggle`] failed
    StopFailed(Arc<Error>),
}

/// Snapshot of the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerStatus {
    pub state: ServerState,
    /// Advertising session number, if advertising
    pub session: Option<u64>,
    pub subscribers: usize,
    pub notifying: bool,
}

type Reply<T> = oneshot::Sender<Result<T>>;

/// The state the latest start/stop request aims for.
///
/// `generation` counts requests, so a failed start only rolls back
/// `advertising` when no later request was made.
#[derive(Debug, Default)]
struct Intent {
    advertising: bool,
    generation: u64,
}

enum Command {
    Start {
        generation: u64,
        reply: Option<Reply<()>>,
    },
    Stop(Option<Reply<()>>),
    Notify(Vec<u8>, Reply<()>),
    Subscribers { session: u64, count: usize },
    Status(oneshot::Sender<ServerStatus>),
}

/// Handle to a running GATT server
pub struct GattServer {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ServerState>,
    events: broadcast::Sender<ServerEvent>,
    intent: Arc<Mutex<Intent>>,
}

impl GattServer {
    /// Creates the server and spawns its worker on the current tokio runtime.
    ///
    /// The server starts [`ServerState::Idle`].
    pub fn new<T: Transport>(transport: Arc<T>, config: &PeripheralConfig) -> Result<Self> {
        config.validate()?;
        let clock = Arc::new(TickClock::new());
        let handlers = Arc::new(CharacteristicHandlers::new(
            clock.clone(),
            &config.device_name,
            &config.device_id,
        )?);

        let (commands, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ServerState::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let intent = Arc::new(Mutex::new(Intent::default()));

        let worker = Worker {
            tracker: SubscriptionTracker::new(transport.clone(), clock, config.notify_period()),
            transport,
            handlers,
            options: AdvertisementOptions {
                local_name: config.local_name.clone(),
                service_uuids: vec![profile::SERVICE_UUID],
            },
            session: None,
            next_session: 1,
            commands: commands.downgrade(),
            state: state_tx,
            events: events.clone(),
            intent: intent.clone(),
        };
        tokio::spawn(worker.run(rx));

        Ok(Self {
            commands,
            state,
            events,
            intent,
        })
    }

    /// Flips the server between idle and advertising without waiting.
    ///
    /// Returns `true` if a start was requested and `false` if a stop was,
    /// so a caller can update its UI immediately. Failures of the transition
    /// are published as [`ServerEvent`]s.
    pub fn toggle(&self) -> bool {
        let mut intent = self.intent.lock();
        let starting = !intent.advertising;
        if self.transition(&mut intent, starting, None).is_err() {
            warn!("toggle ignored, server worker has shut down");
        }
        starting
    }

    /// Registers the service and starts advertising. No-op if already
    /// advertising.
    pub async fn start(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.transition(&mut self.intent.lock(), true, Some(reply))?;
        response.await.map_err(|_| Error::Shutdown)?
    }

    /// Stops the heartbeat, removes the service and stops advertising.
    /// No-op if idle.
    pub async fn stop(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.transition(&mut self.intent.lock(), false, Some(reply))?;
        response.await.map_err(|_| Error::Shutdown)?
    }

    /// Records a new intent and queues the matching command while the intent
    /// is locked, so queue order and generation order agree.
    fn transition(
        &self,
        intent: &mut Intent,
        advertising: bool,
        reply: Option<Reply<()>>,
    ) -> Result<()> {
        intent.advertising = advertising;
        intent.generation += 1;
        let command = if advertising {
            Command::Start {
                generation: intent.generation,
                reply,
            }
        } else {
            Command::Stop(reply)
        };
        self.commands.send(command).map_err(|_| Error::Shutdown)
    }

    /// Sends one notification on the notify characteristic, whether or not
    /// anyone is subscribed.
    pub async fn notify_once(&self, payload: &[u8]) -> Result<()> {
        let payload = payload.to_vec();
        self.request(|reply| Command::Notify(payload, reply)).await?
    }

    /// Current state as of the last completed transition
    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Waits until the server reaches `target`
    pub async fn wait_for_state(&self, target: ServerState) -> Result<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| *s == target)
            .await
            .map_err(|_| Error::Shutdown)?;
        Ok(())
    }

    /// Snapshot taken after every previously queued request was handled
    pub async fn status(&self) -> Result<ServerStatus> {
        self.request(Command::Status).await
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    async fn request<R>(&self, command: impl FnOnce(oneshot::Sender<R>) -> Command) -> Result<R> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| Error::Shutdown)?;
        response.await.map_err(|_| Error::Shutdown)
    }
}

struct Session {
    id: u64,
    service: RegisteredService,
    notify: CharacteristicHandle,
}

struct Worker<T> {
    transport: Arc<T>,
    handlers: Arc<CharacteristicHandlers>,
    tracker: SubscriptionTracker<T>,
    options: AdvertisementOptions,
    session: Option<Session>,
    next_session: u64,
    /// Weak so that the transport's callbacks do not keep the worker alive
    commands: mpsc::WeakUnboundedSender<Command>,
    state: watch::Sender<ServerState>,
    events: broadcast::Sender<ServerEvent>,
    intent: Arc<Mutex<Intent>>,
}

impl<T: Transport> Worker<T> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            self.handle(command).await;
        }

        // Every handle is gone
        if let Err(err) = self.stop().await {
            warn!(error = %err, "failed to stop GATT server on shutdown");
        }
        debug!("GATT server worker finished");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Start { generation, reply } => {
                let result = self.start(generation).await;
                self.respond(reply, result, ServerEvent::StartFailed);
            }
            Command::Stop(reply) => {
                let result = self.stop().await;
                self.respond(reply, result, ServerEvent::StopFailed);
            }
            Command::Notify(payload, reply) => {
                let _ = reply.send(self.notify(&payload).await);
            }
            Command::Subscribers { session, count } => {
                self.subscribers_changed(session, count).await;
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn respond(
        &self,
        reply: Option<Reply<()>>,
        result: Result<()>,
        on_error: fn(Arc<Error>) -> ServerEvent,
    ) {
        match reply {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => {
                if let Err(err) = result {
                    let _ = self.events.send(on_error(Arc::new(err)));
                }
            }
        }
    }

    async fn start(&mut self, generation: u64) -> Result<()> {
        if self.session.is_some() {
            debug!("already advertising");
            return Ok(());
        }

        let id = self.next_session;
        self.next_session += 1;

        match self.register_and_advertise(id).await {
            Ok(session) => {
                info!(
                    session = id,
                    service = %session.service.uuid,
                    name = %self.options.local_name,
                    "advertising started"
                );
                self.session = Some(session);
                self.set_state(ServerState::Advertising);
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "failed to start GATT server");
                {
                    // Roll back unless a later request has set the intent
                    let mut intent = self.intent.lock();
                    if intent.generation == generation {
                        intent.advertising = false;
                    }
                }
                // Do not leave a half-registered service behind
                if let Err(err) = self.transport.clear_services().await {
                    warn!(error = %err, "failed to clear services after failed start");
                }
                Err(Error::ServerStart(err))
            }
        }
    }

    async fn register_and_advertise(&self, id: u64) -> TransportResult<Session> {
        self.transport.clear_services().await?;

        let definition = profile::service_definition(&self.handlers, self.subscription_handler(id));
        let service = self.transport.add_service(definition).await?;
        let notify = *service
            .characteristic(&profile::NOTIFY_UUID)
            .ok_or_else(|| {
                TransportError::Registration("notify characteristic was not registered".into())
            })?;

        self.transport.start_advertising(&self.options).await?;
        Ok(Session {
            id,
            service,
            notify,
        })
    }

    /// Routes subscriber counts for session `id` back onto the command queue
    fn subscription_handler(&self, id: u64) -> SubscriptionHandler {
        let commands = self.commands.clone();
        Arc::new(move |count| match commands.upgrade() {
            Some(commands) => {
                let _ = commands.send(Command::Subscribers { session: id, count });
            }
            None => debug!(session = id, count, "subscription change after shutdown"),
        })
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            debug!("already idle");
            return Ok(());
        };

        // Cancel first so the heartbeat never outlives its characteristic,
        // even if the transport calls below fail.
        self.tracker.reset().await;
        self.set_state(ServerState::Idle);

        let cleared = self.transport.clear_services().await;
        let stopped = self.transport.stop_advertising().await;
        info!(session = session.id, "advertising stopped");
        cleared.and(stopped).map_err(Error::from)
    }

    async fn notify(&self, payload: &[u8]) -> Result<()> {
        let session = self.session.as_ref().ok_or(Error::NotRegistered)?;
        self.transport.notify(&session.notify, payload).await?;
        debug!(len = payload.len(), "manual notification sent");
        Ok(())
    }

    async fn subscribers_changed(&mut self, session: u64, count: usize) {
        let notify = match &self.session {
            Some(current) if current.id == session => current.notify,
            _ => {
                debug!(session, count, "ignoring subscription change from a stale session");
                return;
            }
        };
        let result = self.tracker.on_subscribers_changed(&notify, count).await;
        if let Err(err) = &result {
            error!(error = %err, "subscription tracker invariant violated");
        }
        debug_assert!(
            result.is_ok(),
            "subscription tracker invariant violated: {result:?}"
        );
    }

    fn status(&self) -> ServerStatus {
        ServerStatus {
            state: *self.state.borrow(),
            session: self.session.as_ref().map(|s| s.id),
            subscribers: self.tracker.subscribers(),
            notifying: self.tracker.is_notifying(),
        }
    }

    fn set_state(&self, state: ServerState) {
        self.state.send_replace(state);
        let _ = self.events.send(ServerEvent::StateChanged(state));
    }
}
