//! An IRC client library. One `Client` manages one long-lived connection: user commands go in,
//! a stream of events comes out, and the client keeps a consistent view of the joined channels
//! in between.
//!
//! All session state lives in a single spawned task that serializes user API calls and server
//! messages; the `Client` handle is a cheap clone that talks to it over a channel.

mod ext;
mod handlers;
mod isupport;
mod roster;
mod state;
mod stream;

pub use libminnow_wire as wire;

pub use ext::{Extension, ExtensionOutcome};
pub use roster::{Channel, Roster};
pub use state::{SessionInfo, WhoEntry};
pub use stream::TlsError;

use handlers::Handlers;
use state::State;
use stream::{Stream, StreamError};

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt, WriteHalf};
use tokio::sync::{mpsc, oneshot};

#[macro_use]
extern crate log;

//
// Public API
//

/// Client construction options.
pub struct ClientInfo {
    /// Answer server PINGs automatically.
    pub autoping: bool,

    /// Emit diagnostic events for malformed frames.
    pub debug: bool,

    /// Subscribers registered before the client task starts.
    pub event_handlers: Vec<mpsc::Sender<Event>>,

    /// Extensions consulted, in order, on messages the client does not handle itself.
    pub extensions: Vec<Box<dyn Extension>>,
}

impl Default for ClientInfo {
    fn default() -> ClientInfo {
        ClientInfo {
            autoping: true,
            debug: false,
            event_handlers: Vec::new(),
            extensions: Vec::new(),
        }
    }
}

/// IRC client events. Delivered to every registered subscriber over its channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The transport is up.
    Connected { server: String, port: u16 },
    /// The server accepted our registration (RPL_WELCOME).
    LoggedIn,
    /// The connection is gone.
    Disconnected,
    /// Somebody joined a channel. `who` is `None` when it was us.
    Joined { chan: String, who: Option<String> },
    /// Somebody left a channel. `who` is `None` when it was us.
    Parted { chan: String, who: Option<String> },
    TopicChanged { chan: String, topic: String },
    /// A nick changed. `old` is `None` when it was ours.
    NickChanged { old: Option<String>, new: String },
    /// A MODE change in the `[target, op, arg]` shape.
    Mode { target: String, op: String, arg: String },
    /// We were invited to a channel.
    Invited { by: String, chan: String },
    /// Somebody was kicked. `who` is `None` when it was us.
    Kicked { chan: String, by: String, who: Option<String> },
    /// A PRIVMSG or NOTICE. `to` is `None` when it was addressed directly to us.
    Received { text: String, from: String, to: Option<String> },
    /// A channel message that contains our nick.
    Mentioned { text: String, from: String, to: String },
    /// A CTCP ACTION ("/me").
    Me { text: String, from: String, chan: String },
    /// The accumulated rows of a WHO query, in arrival order.
    Who { chan: String, entries: Vec<WhoEntry> },
    /// A message with no transition of its own that no extension claimed.
    Unrecognized { cmd: String, msg: wire::Msg },
    /// A malformed-frame report. Only emitted in debug mode.
    WireError(String),
}

/// Errors surfaced by `Client` operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The operation needs a connection and there is none.
    #[error("not connected")]
    NotConnected,

    /// The operation needs a registered session; call `logon` first.
    #[error("not logged in")]
    NotLoggedIn,

    /// `logon` was already completed on this connection.
    #[error("already logged on")]
    AlreadyLoggedOn,

    /// A roster query named a channel we are not in.
    #[error("no such channel")]
    NotFound,

    #[error("transport error")]
    Transport(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(TlsError),

    /// The client task is gone, after `stop` or a fatal transport error.
    #[error("client stopped")]
    Stopped,
}

impl From<StreamError> for ClientError {
    fn from(err: StreamError) -> ClientError {
        match err {
            StreamError::Io(err) => ClientError::Transport(err),
            StreamError::Tls(err) => ClientError::Tls(err),
        }
    }
}

/// IRC client handle. Clones share the underlying connection task.
#[derive(Clone)]
pub struct Client {
    /// Channel to send commands to the connection task.
    msg_chan: mpsc::Sender<Cmd>,
}

impl Client {
    /// Create a new client. Spawns the connection task on the current tokio runtime. The client
    /// starts out disconnected; call [`Client::connect`] to open a transport.
    pub fn new(info: ClientInfo) -> Client {
        let (snd_cmd, rcv_cmd) = mpsc::channel::<Cmd>(100);
        tokio::spawn(main_loop(info, rcv_cmd));
        Client { msg_chan: snd_cmd }
    }

    /// Connect to the given server, replacing any existing connection. Blocks until the
    /// transport is up (there is no connect timeout beyond the operating system's own).
    pub async fn connect(&self, server: &str, port: u16, tls: bool) -> Result<(), ClientError> {
        let server = server.to_owned();
        self.request(|reply| Cmd::Connect { server, port, tls, reply }).await
    }

    /// Register with the server: sends PASS, NICK and USER.
    pub async fn logon(
        &self,
        pass: &str,
        nick: &str,
        user: &str,
        realname: &str,
    ) -> Result<(), ClientError> {
        let (pass, nick, user, realname) = (
            pass.to_owned(),
            nick.to_owned(),
            user.to_owned(),
            realname.to_owned(),
        );
        self.request(|reply| Cmd::Logon { pass, nick, user, realname, reply }).await
    }

    /// Send a PRIVMSG.
    pub async fn privmsg(&self, target: &str, msg: &str) -> Result<(), ClientError> {
        self.send_line(wire::privmsg(target, msg)).await
    }

    /// Send a NOTICE.
    pub async fn notice(&self, target: &str, msg: &str) -> Result<(), ClientError> {
        self.send_line(wire::notice(target, msg)).await
    }

    /// Send a CTCP query, framed in a NOTICE.
    pub async fn ctcp(&self, target: &str, msg: &str) -> Result<(), ClientError> {
        self.send_line(wire::ctcp(target, msg)).await
    }

    /// Send a CTCP ACTION ("/me").
    pub async fn me(&self, chan: &str, msg: &str) -> Result<(), ClientError> {
        self.send_line(wire::action(chan, msg)).await
    }

    /// Ask for a new nick. This may fail server-side (ERR_NICKNAMEINUSE), so the session nick
    /// only changes when the server confirms with a NICK message.
    pub async fn nick(&self, new_nick: &str) -> Result<(), ClientError> {
        self.send_line(wire::nick(new_nick)).await
    }

    /// Join a channel, with an optional key.
    pub async fn join(&self, chan: &str, key: Option<&str>) -> Result<(), ClientError> {
        self.send_line(wire::join(chan, key)).await
    }

    /// Leave a channel.
    pub async fn part(&self, chan: &str, reason: Option<&str>) -> Result<(), ClientError> {
        self.send_line(wire::part(chan, reason)).await
    }

    pub async fn kick(
        &self,
        chan: &str,
        nick: &str,
        reason: Option<&str>,
    ) -> Result<(), ClientError> {
        self.send_line(wire::kick(chan, nick, reason)).await
    }

    pub async fn invite(&self, nick: &str, chan: &str) -> Result<(), ClientError> {
        self.send_line(wire::invite(nick, chan)).await
    }

    pub async fn mode(
        &self,
        target: &str,
        flags: &str,
        args: Option<&str>,
    ) -> Result<(), ClientError> {
        self.send_line(wire::mode(target, flags, args)).await
    }

    /// Ask for the names in a channel. The replies update the roster.
    pub async fn names(&self, chan: &str) -> Result<(), ClientError> {
        self.send_line(wire::names(chan)).await
    }

    /// Ask WHO a channel. The rows come back in a single [`Event::Who`].
    pub async fn who(&self, chan: &str) -> Result<(), ClientError> {
        self.send_line(wire::who(chan)).await
    }

    /// Send a raw command. The "\r\n" suffix is added by this method.
    pub async fn raw_msg(&self, msg: &str) -> Result<(), ClientError> {
        self.send_line(wire::raw(msg)).await
    }

    /// Send a QUIT to the server (when connected) and drop the transport. The client keeps
    /// running and can `connect` again.
    pub async fn quit(&self, reason: Option<&str>) -> Result<(), ClientError> {
        let reason = reason.map(str::to_owned);
        self.request(|reply| Cmd::Quit { reason, reply }).await
    }

    /// Like `quit`, but also terminates the connection task. Every call after this returns
    /// [`ClientError::Stopped`].
    pub async fn stop(&self) -> Result<(), ClientError> {
        self.request(|reply| Cmd::Stop { reply }).await
    }

    /// Subscribe to events. Registering the sender of an already-subscribed channel again is a
    /// no-op. A subscriber is dropped automatically when its receiver is gone.
    pub async fn add_handler(&self, snd: mpsc::Sender<Event>) -> Result<(), ClientError> {
        self.request(|reply| Cmd::Admin(AdminCmd::AddHandler { snd, reply })).await
    }

    pub async fn remove_handler(&self, snd: mpsc::Sender<Event>) -> Result<(), ClientError> {
        self.request(|reply| Cmd::Admin(AdminCmd::RemoveHandler { snd, reply })).await
    }

    /// A snapshot of the observable session state.
    pub async fn state(&self) -> Result<SessionInfo, ClientError> {
        self.request(|reply| Cmd::Admin(AdminCmd::GetState { reply })).await
    }

    pub async fn is_connected(&self) -> Result<bool, ClientError> {
        Ok(self.state().await?.connected)
    }

    pub async fn is_logged_on(&self) -> Result<bool, ClientError> {
        Ok(self.state().await?.logged_on)
    }

    /// Names of the channels we are in.
    pub async fn channels(&self) -> Result<Vec<String>, ClientError> {
        self.request(|reply| Cmd::Admin(AdminCmd::GetChannels { reply })).await
    }

    /// Nicks in a channel.
    pub async fn channel_users(&self, chan: &str) -> Result<Vec<String>, ClientError> {
        let chan = chan.to_owned();
        self.request(|reply| Cmd::Admin(AdminCmd::GetChanUsers { chan, reply })).await
    }

    /// Topic of a channel; empty when none has been seen.
    pub async fn channel_topic(&self, chan: &str) -> Result<String, ClientError> {
        let chan = chan.to_owned();
        self.request(|reply| Cmd::Admin(AdminCmd::GetChanTopic { chan, reply })).await
    }

    /// Channel type from RPL_NAMEREPLY; `None` until one has been seen.
    pub async fn channel_type(&self, chan: &str) -> Result<Option<char>, ClientError> {
        let chan = chan.to_owned();
        self.request(|reply| Cmd::Admin(AdminCmd::GetChanType { chan, reply })).await
    }

    pub async fn channel_has_user(&self, chan: &str, nick: &str) -> Result<bool, ClientError> {
        let (chan, nick) = (chan.to_owned(), nick.to_owned());
        self.request(|reply| Cmd::Admin(AdminCmd::HasChanUser { chan, nick, reply })).await
    }

    async fn send_line(&self, line: String) -> Result<(), ClientError> {
        self.request(|reply| Cmd::Msg { line, reply }).await
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Cmd) -> Result<T, ClientError> {
        let (reply, rcv_reply) = oneshot::channel();
        self.msg_chan
            .send(make(reply))
            .await
            .map_err(|_| ClientError::Stopped)?;
        match rcv_reply.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Stopped),
        }
    }
}

//
// End of public API
//

type Reply<T> = oneshot::Sender<Result<T, ClientError>>;

#[derive(Debug)]
enum Cmd {
    /// Open a transport, replacing the current one if any.
    Connect {
        server: String,
        port: u16,
        tls: bool,
        reply: Reply<()>,
    },
    /// Send the registration sequence and remember the credentials.
    Logon {
        pass: String,
        nick: String,
        user: String,
        realname: String,
        reply: Reply<()>,
    },
    /// Send this IRC message to the server. Needs to be a complete line including the trailing
    /// "\r\n".
    Msg { line: String, reply: Reply<()> },
    /// Close the connection but keep the task alive.
    Quit {
        reason: Option<String>,
        reply: Reply<()>,
    },
    /// Close the connection and terminate the task.
    Stop { reply: Reply<()> },
    /// Commands that are admissible in every phase.
    Admin(AdminCmd),
}

#[derive(Debug)]
enum AdminCmd {
    AddHandler {
        snd: mpsc::Sender<Event>,
        reply: Reply<()>,
    },
    RemoveHandler {
        snd: mpsc::Sender<Event>,
        reply: Reply<()>,
    },
    GetState {
        reply: Reply<SessionInfo>,
    },
    GetChannels {
        reply: Reply<Vec<String>>,
    },
    GetChanUsers {
        chan: String,
        reply: Reply<Vec<String>>,
    },
    GetChanTopic {
        chan: String,
        reply: Reply<String>,
    },
    GetChanType {
        chan: String,
        reply: Reply<Option<char>>,
    },
    HasChanUser {
        chan: String,
        nick: String,
        reply: Reply<bool>,
    },
}

/// What ended the connected phase.
enum ConnExit {
    /// The connection is gone; go back to waiting for a `connect`.
    Idle,
    /// A new connection replaces the current one.
    Reconnect(Stream),
    /// Terminate the task.
    Stop,
}

async fn main_loop(info: ClientInfo, mut rcv_cmd: mpsc::Receiver<Cmd>) {
    let ClientInfo {
        autoping,
        debug,
        event_handlers,
        extensions,
    } = info;
    let mut handlers = Handlers::new(event_handlers);
    let mut state = State::new(autoping, debug, extensions);
    let mut next_conn: Option<Stream> = None;

    loop {
        let stream = match next_conn.take() {
            Some(stream) => stream,
            None => match idle(&mut rcv_cmd, &mut state, &mut handlers).await {
                Some(stream) => stream,
                None => return,
            },
        };
        match connected(stream, &mut rcv_cmd, &mut state, &mut handlers).await {
            ConnExit::Idle => {}
            ConnExit::Reconnect(stream) => next_conn = Some(stream),
            ConnExit::Stop => return,
        }
    }
}

/// Serve commands while there is no transport. Returns the new stream after a successful
/// `connect`, or `None` when the task should stop.
async fn idle(
    rcv_cmd: &mut mpsc::Receiver<Cmd>,
    state: &mut State,
    handlers: &mut Handlers,
) -> Option<Stream> {
    loop {
        let cmd = match rcv_cmd.recv().await {
            Some(cmd) => cmd,
            // All `Client` handles are gone
            None => return None,
        };
        match cmd {
            Cmd::Connect {
                server,
                port,
                tls,
                reply,
            } => match try_connect(&server, port, tls, state, handlers).await {
                Ok(stream) => {
                    let _ = reply.send(Ok(()));
                    return Some(stream);
                }
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            },
            // Nothing to close
            Cmd::Quit { reply, .. } => {
                let _ = reply.send(Ok(()));
            }
            Cmd::Stop { reply } => {
                let _ = reply.send(Ok(()));
                return None;
            }
            Cmd::Logon { reply, .. } | Cmd::Msg { reply, .. } => {
                let _ = reply.send(Err(ClientError::NotConnected));
            }
            Cmd::Admin(cmd) => serve_admin(cmd, state, handlers),
        }
    }
}

/// The connected phase: serve the command mailbox and the socket until one of them ends the
/// connection.
async fn connected(
    stream: Stream,
    rcv_cmd: &mut mpsc::Receiver<Cmd>,
    state: &mut State,
    handlers: &mut Handlers,
) -> ConnExit {
    let (mut read_half, mut write_half) = tokio::io::split(stream);
    let mut parse_buf: Vec<u8> = Vec::with_capacity(1024);
    let mut out: Vec<String> = Vec::new();

    loop {
        let mut read_buf: [u8; 1024] = [0; 1024];

        tokio::select! {
            cmd = rcv_cmd.recv() => {
                let cmd = match cmd {
                    Some(cmd) => cmd,
                    None => {
                        // All `Client` handles are gone; say goodbye and stop.
                        let _ = write_half.write_all(wire::quit(None).as_bytes()).await;
                        return ConnExit::Stop;
                    }
                };
                match cmd {
                    Cmd::Connect { server, port, tls, reply } => {
                        // The current transport is replaced; it closes when the halves drop.
                        state.on_disconnected();
                        match try_connect(&server, port, tls, state, handlers).await {
                            Ok(stream) => {
                                let _ = reply.send(Ok(()));
                                return ConnExit::Reconnect(stream);
                            }
                            Err(err) => {
                                let _ = reply.send(Err(err));
                                return ConnExit::Idle;
                            }
                        }
                    }
                    Cmd::Logon { pass, nick, user, realname, reply } => {
                        if state.is_logged_on() {
                            let _ = reply.send(Err(ClientError::AlreadyLoggedOn));
                        } else {
                            state.logon(&pass, &nick, &user, &realname, &mut out);
                            match flush(&mut write_half, &mut out).await {
                                Ok(()) => {
                                    let _ = reply.send(Ok(()));
                                }
                                Err(err) => {
                                    let _ = reply.send(Err(ClientError::Transport(err)));
                                    return fatal(state, handlers);
                                }
                            }
                        }
                    }
                    Cmd::Msg { line, reply } => {
                        if !state.is_logged_on() {
                            let _ = reply.send(Err(ClientError::NotLoggedIn));
                        } else {
                            match write_half.write_all(line.as_bytes()).await {
                                Ok(()) => {
                                    let _ = reply.send(Ok(()));
                                }
                                Err(err) => {
                                    let _ = reply.send(Err(ClientError::Transport(err)));
                                    return fatal(state, handlers);
                                }
                            }
                        }
                    }
                    Cmd::Quit { reason, reply } => {
                        let _ = write_half.write_all(wire::quit(reason.as_deref()).as_bytes()).await;
                        state.on_disconnected();
                        handlers.emit(Event::Disconnected);
                        let _ = reply.send(Ok(()));
                        return ConnExit::Idle;
                    }
                    Cmd::Stop { reply } => {
                        let _ = write_half.write_all(wire::quit(None).as_bytes()).await;
                        state.on_disconnected();
                        handlers.emit(Event::Disconnected);
                        let _ = reply.send(Ok(()));
                        return ConnExit::Stop;
                    }
                    Cmd::Admin(cmd) => serve_admin(cmd, state, handlers),
                }
            }
            bytes = read_half.read(&mut read_buf) => {
                match bytes {
                    Err(io_err) => {
                        error!("error when reading from socket: {:?}", io_err);
                        return fatal(state, handlers);
                    }
                    Ok(0) => {
                        debug!("connection closed by the remote end");
                        state.on_disconnected();
                        handlers.emit(Event::Disconnected);
                        return ConnExit::Idle;
                    }
                    Ok(bytes) => {
                        parse_buf.extend_from_slice(&read_buf[0..bytes]);
                        while let Some(msg) = wire::parse_irc_msg(&mut parse_buf) {
                            match msg {
                                Err(err) => warn!("dropping unparsable line: {}", err),
                                Ok(msg) => {
                                    debug!("parsed msg: {:?}", msg);
                                    state.update(msg, handlers, &mut out);
                                }
                            }
                            if let Err(io_err) = flush(&mut write_half, &mut out).await {
                                error!("error when writing to socket: {:?}", io_err);
                                return fatal(state, handlers);
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn try_connect(
    server: &str,
    port: u16,
    tls: bool,
    state: &mut State,
    handlers: &mut Handlers,
) -> Result<Stream, ClientError> {
    debug!("connecting to {}:{} (tls: {})", server, port, tls);
    let stream = Stream::connect(server, port, tls).await?;
    state.on_connected(server, port, tls);
    handlers.emit(Event::Connected {
        server: server.to_owned(),
        port,
    });
    Ok(stream)
}

/// Serve a command that is admissible in every phase.
fn serve_admin(cmd: AdminCmd, state: &mut State, handlers: &mut Handlers) {
    match cmd {
        AdminCmd::AddHandler { snd, reply } => {
            handlers.add(snd);
            let _ = reply.send(Ok(()));
        }
        AdminCmd::RemoveHandler { snd, reply } => {
            handlers.remove(&snd);
            let _ = reply.send(Ok(()));
        }
        AdminCmd::GetState { reply } => {
            let _ = reply.send(Ok(state.snapshot()));
        }
        AdminCmd::GetChannels { reply } => {
            let _ = reply.send(Ok(state.roster().channels()));
        }
        AdminCmd::GetChanUsers { chan, reply } => {
            let _ = reply.send(state.roster().users(&chan).ok_or(ClientError::NotFound));
        }
        AdminCmd::GetChanTopic { chan, reply } => {
            let _ = reply.send(
                state
                    .roster()
                    .get(&chan)
                    .map(|chan| chan.topic().to_owned())
                    .ok_or(ClientError::NotFound),
            );
        }
        AdminCmd::GetChanType { chan, reply } => {
            let _ = reply.send(
                state
                    .roster()
                    .get(&chan)
                    .map(Channel::chan_type)
                    .ok_or(ClientError::NotFound),
            );
        }
        AdminCmd::HasChanUser { chan, nick, reply } => {
            let _ = reply.send(
                state
                    .roster()
                    .has_user(&chan, &nick)
                    .ok_or(ClientError::NotFound),
            );
        }
    }
}

/// Transport failure in steady state: clean up and terminate the task.
fn fatal(state: &mut State, handlers: &mut Handlers) -> ConnExit {
    state.on_disconnected();
    handlers.emit(Event::Disconnected);
    ConnExit::Stop
}

async fn flush(
    write_half: &mut WriteHalf<Stream>,
    out: &mut Vec<String>,
) -> Result<(), std::io::Error> {
    for line in out.drain(..) {
        write_half.write_all(line.as_bytes()).await?;
    }
    Ok(())
}
