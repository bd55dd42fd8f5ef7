//! Connection client for the push edge service.
//!
//! [`BasicClient`] is a cheap front for a background connection task that owns
//! the single websocket. The task multiplexes caller commands, inbound frames
//! and its timers (heartbeat, heartbeat timeout, reconnect, response deadlines)
//! in one `select!` loop, so every piece of mutable connection state has a
//! single owner.

use std::{
    collections::HashMap,
    fmt,
    future::{Future, pending},
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use futures_util::SinkExt;
use serde_json::Value;
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{Instant, sleep_until, timeout},
};

use crate::{
    config::Config,
    error::PubSubError,
    net::{
        connection::{self, WsSink, WsSource},
        framing::{read_packet, write_packet},
    },
    protocol::packet::{IncomingPacket, MessageData, OutgoingPacket},
    state::{connection::ConnectionState, retry::FibonacciBackoff},
    util::nonce::generate_nonce,
};

const CLOSE_GRACE: Duration = Duration::from_secs(1);

pub type MessageHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

type Reply = oneshot::Sender<Result<(), PubSubError>>;
type OpenFuture = Pin<Box<dyn Future<Output = Result<(WsSink, WsSource), PubSubError>> + Send>>;

enum Command {
    Connect(Reply),
    Listen { topics: Vec<String>, auth_token: Option<String>, reply: Reply },
    Unlisten { topics: Vec<String>, reply: Reply },
    Disconnect(oneshot::Sender<()>),
}

pub struct BasicClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    handlers: Arc<Mutex<Vec<MessageHandler>>>,
}

impl fmt::Debug for BasicClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicClient").field("state", &*self.state.borrow()).finish_non_exhaustive()
    }
}

impl BasicClient {
    /// Spawns the connection task; must be called from within a tokio runtime.
    /// Nothing is dialed until [`BasicClient::connect`].
    pub fn new(config: Config) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let handlers: Arc<Mutex<Vec<MessageHandler>>> = Arc::new(Mutex::new(Vec::new()));

        let task = ConnectionTask::new(config, state_tx, Arc::clone(&handlers));
        tokio::spawn(task.run(command_rx));

        Self { commands, state, handlers }
    }

    /// Resolves once connected. Only the very first connection attempt can fail;
    /// afterwards drops are recovered in the background.
    pub async fn connect(&self) -> Result<(), PubSubError> {
        self.request(Command::Connect).await
    }

    pub async fn listen(&self, topics: Vec<String>, auth_token: Option<String>) -> Result<(), PubSubError> {
        self.request(|reply| Command::Listen { topics, auth_token, reply }).await
    }

    pub async fn unlisten(&self, topics: Vec<String>) -> Result<(), PubSubError> {
        self.request(|reply| Command::Unlisten { topics, reply }).await
    }

    /// Closes the link without scheduling a reconnect. Pending requests fail with
    /// [`PubSubError::Disconnected`].
    pub async fn disconnect(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Disconnect(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Registers a handler called with `(topic, payload)` for every MESSAGE frame,
    /// in registration order. Handlers run on the connection task and must not block.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner).push(Arc::new(handler));
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    async fn request<F>(&self, make: F) -> Result<(), PubSubError>
    where
        F: FnOnce(Reply) -> Command,
    {
        let (tx, rx) = oneshot::channel();
        self.commands.send(make(tx)).map_err(|_| PubSubError::TaskStopped)?;
        rx.await.map_err(|_| PubSubError::TaskStopped)?
    }
}

struct Link {
    sink: WsSink,
    source: WsSource,
}

struct Pending {
    packet: OutgoingPacket,
    // None for re-subscriptions issued by the task itself
    reply: Option<Reply>,
    deadline: Option<Instant>,
}

struct ConnectionTask {
    config: Config,
    state: watch::Sender<ConnectionState>,
    handlers: Arc<Mutex<Vec<MessageHandler>>>,
    link: Option<Link>,
    opening: Option<OpenFuture>,
    connect_waiters: Vec<Reply>,
    has_connected: bool,
    manually_disconnected: bool,
    backoff: FibonacciBackoff,
    retry_at: Option<Instant>,
    next_ping_at: Option<Instant>,
    pong_deadline: Option<Instant>,
    pending: HashMap<String, Pending>,
    /// Acknowledged topics and the token they were listened with.
    topics: HashMap<String, Option<String>>,
}

impl ConnectionTask {
    fn new(
        config: Config,
        state: watch::Sender<ConnectionState>,
        handlers: Arc<Mutex<Vec<MessageHandler>>>,
    ) -> Self {
        let backoff = FibonacciBackoff::new(config.max_retry_delay);
        Self {
            config,
            state,
            handlers,
            link: None,
            opening: None,
            connect_waiters: Vec::new(),
            has_connected: false,
            manually_disconnected: false,
            backoff,
            retry_at: None,
            next_ping_at: None,
            pong_deadline: None,
            pending: HashMap::new(),
            topics: HashMap::new(),
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let response_deadline = self.pending.values().filter_map(|p| p.deadline).min();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        tracing::debug!("Client handle dropped, stopping connection task");
                        self.disconnect().await;
                        return;
                    }
                },
                opened = poll_opening(&mut self.opening) => {
                    self.opening = None;
                    self.handle_opened(opened).await;
                }
                packet = read_link(&mut self.link) => match packet {
                    Ok(packet) => self.dispatch(packet).await,
                    Err(error) => {
                        tracing::warn!(%error, "Connection lost");
                        self.handle_link_lost();
                    }
                },
                () = sleep_until_opt(self.next_ping_at) => self.send_ping().await,
                () = sleep_until_opt(self.pong_deadline) => {
                    tracing::warn!(timeout = ?self.config.heartbeat_timeout, "No PONG received, presuming connection dead");
                    self.link = None;
                    self.handle_link_lost();
                }
                () = sleep_until_opt(self.retry_at) => {
                    tracing::info!("Reconnecting");
                    self.start_opening();
                }
                () = sleep_until_opt(response_deadline) => self.expire_pending(),
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(reply) => match self.current_state() {
                ConnectionState::Connected => {
                    let _ = reply.send(Ok(()));
                }
                ConnectionState::Connecting => self.connect_waiters.push(reply),
                ConnectionState::Disconnected => {
                    self.manually_disconnected = false;
                    self.connect_waiters.push(reply);
                    self.start_opening();
                }
            },
            Command::Listen { topics, auth_token, reply } => {
                let nonce = self.fresh_nonce();
                let packet = OutgoingPacket::mk_listen(nonce.clone(), topics, auth_token);
                self.submit(nonce, packet, Some(reply)).await;
            }
            Command::Unlisten { topics, reply } => {
                let nonce = self.fresh_nonce();
                let packet = OutgoingPacket::mk_unlisten(nonce.clone(), topics);
                self.submit(nonce, packet, Some(reply)).await;
            }
            Command::Disconnect(done) => {
                self.disconnect().await;
                let _ = done.send(());
            }
        }
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Connection state changed");
        }
    }

    fn fresh_nonce(&self) -> String {
        loop {
            let nonce = generate_nonce();
            if !self.pending.contains_key(&nonce) {
                return nonce;
            }
        }
    }

    fn start_opening(&mut self) {
        self.retry_at = None;
        self.set_state(ConnectionState::Connecting);
        let endpoint = self.config.endpoint.clone();
        self.opening = Some(Box::pin(async move { connection::open(&endpoint).await }));
    }

    async fn handle_opened(&mut self, opened: Result<(WsSink, WsSource), PubSubError>) {
        match opened {
            Ok((sink, source)) => {
                tracing::info!(endpoint = %self.config.endpoint, "Connected");
                self.link = Some(Link { sink, source });
                self.has_connected = true;
                self.backoff.reset();
                self.retry_at = None;
                self.set_state(ConnectionState::Connected);
                for waiter in self.connect_waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
                self.next_ping_at = Some(Instant::now() + self.config.heartbeat_interval);
                self.pong_deadline = None;
                self.restore_subscriptions().await;
            }
            Err(error) if self.has_connected => {
                tracing::warn!(%error, "Reconnect attempt failed");
                self.schedule_retry();
            }
            Err(error) => {
                tracing::warn!(%error, "Initial connection failed");
                self.set_state(ConnectionState::Disconnected);
                let message = error.to_string();
                for waiter in self.connect_waiters.drain(..) {
                    let _ = waiter.send(Err(PubSubError::ConnectFailed(message.clone())));
                }
                self.fail_all_pending(|| PubSubError::ConnectFailed(message.clone()));
            }
        }
    }

    /// Replays state onto a fresh link: acknowledged topics are listened again
    /// (one LISTEN per token), requests the old link never answered are re-sent.
    /// Topics stay in the confirmed set until they are unlistened, so a replay
    /// that goes unanswered is attempted again on the next link.
    async fn restore_subscriptions(&mut self) {
        // a fresh link holds no subscriptions, so outstanding unlistens are already satisfied
        let unlistens: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| is_unlisten(&p.packet))
            .map(|(nonce, _)| nonce.clone())
            .collect();
        for nonce in unlistens {
            if let Some(pending) = self.pending.remove(&nonce) {
                self.apply_confirmed(&pending.packet);
                if let Some(reply) = pending.reply {
                    let _ = reply.send(Ok(()));
                }
            }
        }

        // replays issued for the previous link are superseded by the one below
        self.pending.retain(|_, p| p.reply.is_some());
        let mut resend: Vec<OutgoingPacket> = self.pending.values().map(|p| p.packet.clone()).collect();

        let mut by_token: HashMap<Option<String>, Vec<String>> = HashMap::new();
        for (topic, token) in &self.topics {
            by_token.entry(token.clone()).or_default().push(topic.clone());
        }
        for (token, topics) in by_token {
            tracing::debug!(count = topics.len(), "Re-listening topics");
            let nonce = self.fresh_nonce();
            let packet = OutgoingPacket::mk_listen(nonce.clone(), topics, token);
            let deadline = self.response_deadline();
            self.pending.insert(nonce, Pending { packet: packet.clone(), reply: None, deadline });
            resend.push(packet);
        }

        for packet in resend {
            if !self.send_packet(&packet).await {
                return;
            }
        }
    }

    fn response_deadline(&self) -> Option<Instant> {
        self.config.response_timeout.map(|t| Instant::now() + t)
    }

    async fn submit(&mut self, nonce: String, packet: OutgoingPacket, reply: Option<Reply>) {
        let deadline = self.response_deadline();
        self.pending.insert(nonce, Pending { packet: packet.clone(), reply, deadline });
        // without a link the request waits in `pending` and goes out on the next connect
        if self.link.is_some() {
            self.send_packet(&packet).await;
        }
    }

    /// Returns false if the link was lost while writing.
    async fn send_packet(&mut self, packet: &OutgoingPacket) -> bool {
        let Some(link) = self.link.as_mut() else {
            return false;
        };
        match write_packet(&mut link.sink, packet).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, "Write failed, dropping connection");
                self.link = None;
                self.handle_link_lost();
                false
            }
        }
    }

    async fn send_ping(&mut self) {
        let now = Instant::now();
        self.next_ping_at = Some(now + self.config.heartbeat_interval);
        if self.send_packet(&OutgoingPacket::Ping).await {
            self.pong_deadline = Some(now + self.config.heartbeat_timeout);
        }
    }

    async fn dispatch(&mut self, packet: IncomingPacket) {
        match packet {
            IncomingPacket::Pong => {
                tracing::trace!("PONG received");
                self.pong_deadline = None;
            }
            IncomingPacket::Reconnect => {
                tracing::info!("Server requested reconnect");
                self.close_link().await;
                self.start_opening();
            }
            IncomingPacket::Response { nonce, error } => self.resolve(&nonce, error),
            IncomingPacket::Message { data } => self.deliver(&data),
            IncomingPacket::Unknown => {
                tracing::debug!("Received unexpected packet type, ignoring");
            }
        }
    }

    fn resolve(&mut self, nonce: &str, error: String) {
        let Some(pending) = self.pending.remove(nonce) else {
            tracing::debug!(%nonce, "RESPONSE for unknown nonce, ignoring");
            return;
        };
        let result = if error.is_empty() { Ok(()) } else { Err(PubSubError::Rejected(error)) };
        if result.is_ok() || is_unlisten(&pending.packet) {
            self.apply_confirmed(&pending.packet);
        }
        match pending.reply {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => {
                if let Err(error) = result {
                    tracing::warn!(%error, "Re-subscription rejected, retrying on next connection");
                }
            }
        }
    }

    fn apply_confirmed(&mut self, packet: &OutgoingPacket) {
        match packet {
            OutgoingPacket::Listen { data, .. } => {
                for topic in &data.topics {
                    self.topics.insert(topic.clone(), data.auth_token.clone());
                }
            }
            OutgoingPacket::Unlisten { data, .. } => {
                for topic in &data.topics {
                    self.topics.remove(topic);
                }
            }
            OutgoingPacket::Ping => {}
        }
    }

    fn deliver(&self, data: &MessageData) {
        let payload: Value = match serde_json::from_str(&data.message) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::debug!(topic = %data.topic, %error, "Dropping message with undecodable payload");
                return;
            }
        };
        let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner).clone();
        for handler in &handlers {
            handler(&data.topic, &payload);
        }
    }

    fn expire_pending(&mut self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline.is_some_and(|d| d <= now))
            .map(|(nonce, _)| nonce.clone())
            .collect();
        let waited = self.config.response_timeout.unwrap_or_default();
        for nonce in expired {
            if let Some(pending) = self.pending.remove(&nonce) {
                tracing::warn!(%nonce, "No RESPONSE in time");
                if is_unlisten(&pending.packet) {
                    self.apply_confirmed(&pending.packet);
                }
                if let Some(reply) = pending.reply {
                    let _ = reply.send(Err(PubSubError::ResponseTimeout(waited)));
                }
            }
        }
    }

    /// A failed unlisten still drops its topics from the replay set.
    fn fail_all_pending<F>(&mut self, error: F)
    where
        F: Fn() -> PubSubError,
    {
        for (_, pending) in std::mem::take(&mut self.pending) {
            if is_unlisten(&pending.packet) {
                self.apply_confirmed(&pending.packet);
            }
            if let Some(reply) = pending.reply {
                let _ = reply.send(Err(error()));
            }
        }
    }

    /// Any link loss other than a manual disconnect goes through the backoff.
    fn handle_link_lost(&mut self) {
        self.link = None;
        self.next_ping_at = None;
        self.pong_deadline = None;
        if self.manually_disconnected {
            self.set_state(ConnectionState::Disconnected);
            return;
        }
        self.set_state(ConnectionState::Connecting);
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        let delay = self.backoff.next_delay();
        tracing::info!(delay_secs = delay.as_secs(), "Scheduling reconnect");
        self.retry_at = Some(Instant::now() + delay);
    }

    async fn close_link(&mut self) {
        self.next_ping_at = None;
        self.pong_deadline = None;
        if let Some(mut link) = self.link.take() {
            if timeout(CLOSE_GRACE, link.sink.close()).await.is_err() {
                tracing::debug!("Close handshake timed out");
            }
        }
    }

    async fn disconnect(&mut self) {
        // flag first so the close below is never taken for a failure
        self.manually_disconnected = true;
        self.retry_at = None;
        self.opening = None;
        self.close_link().await;
        self.set_state(ConnectionState::Disconnected);
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(PubSubError::Disconnected));
        }
        self.fail_all_pending(|| PubSubError::Disconnected);
        tracing::info!("Disconnected");
    }
}

fn is_unlisten(packet: &OutgoingPacket) -> bool {
    matches!(packet, OutgoingPacket::Unlisten { .. })
}

async fn poll_opening(opening: &mut Option<OpenFuture>) -> Result<(WsSink, WsSource), PubSubError> {
    match opening {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn read_link(link: &mut Option<Link>) -> Result<IncomingPacket, PubSubError> {
    match link {
        Some(link) => read_packet(&mut link.source).await,
        None => pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
