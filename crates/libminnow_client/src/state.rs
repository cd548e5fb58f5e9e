//! The per-connection session state: connection flags, credentials, server capabilities, the
//! channel roster and WHO buffers, and the dispatch of parsed server messages into events.

use crate::ext::{Extension, Extensions};
use crate::handlers::Handlers;
use crate::isupport::{self, Token};
use crate::roster::{normalize, Roster};
use crate::Event;

use libminnow_wire as wire;

use std::collections::HashMap;
use std::time::SystemTime;

/// Channel name prefixes assumed until RPL_ISUPPORT says otherwise.
const DEFAULT_CHAN_PREFIXES: &str = "#&";

/// Nick rank prefixes assumed until RPL_ISUPPORT says otherwise.
const DEFAULT_USER_PREFIXES: &str = "@+";

/// A single RPL_WHOREPLY row. Rows are buffered per channel and handed out in one `Who` event
/// when RPL_ENDOFWHO arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhoEntry {
    pub nick: String,
    pub user: String,
    /// Real name, from the trailing "<hops> <realname>" argument.
    pub name: String,
    pub host: String,
    pub server: String,
    pub hops: u32,
    /// Whether the mode column carried an '@'.
    pub operator: bool,
}

/// A snapshot of the observable session state.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub server: String,
    pub port: u16,
    pub tls: bool,
    pub nick: String,
    pub user: String,
    pub realname: String,
    pub connected: bool,
    pub logged_on: bool,
    pub autoping: bool,
    pub debug: bool,
    /// Set when the first RPL_WELCOME of the session arrives.
    pub login_time: Option<SystemTime>,
    /// Network name from ISUPPORT, empty until advertised.
    pub network: String,
    pub chan_prefixes: String,
    pub user_prefixes: String,
}

pub(crate) struct State {
    server: String,
    port: u16,
    tls: bool,

    nick: String,
    user: String,
    realname: String,
    pass: String,

    connected: bool,
    logged_on: bool,
    autoping: bool,
    debug: bool,
    login_time: Option<SystemTime>,

    network: String,
    chan_prefixes: String,
    user_prefixes: String,

    roster: Roster,

    /// RPL_WHOREPLY rows per (normalized) channel, waiting for RPL_ENDOFWHO.
    who_buffers: HashMap<String, Vec<WhoEntry>>,

    extensions: Extensions,
}

impl State {
    pub(crate) fn new(autoping: bool, debug: bool, extensions: Vec<Box<dyn Extension>>) -> State {
        State {
            server: String::new(),
            port: 0,
            tls: false,
            nick: String::new(),
            user: String::new(),
            realname: String::new(),
            pass: String::new(),
            connected: false,
            logged_on: false,
            autoping,
            debug,
            login_time: None,
            network: String::new(),
            chan_prefixes: DEFAULT_CHAN_PREFIXES.to_owned(),
            user_prefixes: DEFAULT_USER_PREFIXES.to_owned(),
            roster: Roster::new(),
            who_buffers: HashMap::new(),
            extensions: Extensions::new(extensions),
        }
    }

    pub(crate) fn is_logged_on(&self) -> bool {
        self.logged_on
    }

    pub(crate) fn roster(&self) -> &Roster {
        &self.roster
    }

    pub(crate) fn on_connected(&mut self, server: &str, port: u16, tls: bool) {
        self.server = server.to_owned();
        self.port = port;
        self.tls = tls;
        self.connected = true;
    }

    /// Forget the connection: flags down, roster and WHO buffers cleared.
    pub(crate) fn on_disconnected(&mut self) {
        debug!("session reset, {} channel(s) dropped", self.roster.channels().len());
        self.connected = false;
        self.logged_on = false;
        self.roster.reset();
        self.who_buffers.clear();
    }

    /// Store credentials and queue the registration sequence.
    pub(crate) fn logon(
        &mut self,
        pass: &str,
        nick: &str,
        user: &str,
        realname: &str,
        out: &mut Vec<String>,
    ) {
        self.pass = pass.to_owned();
        self.nick = nick.to_owned();
        self.user = user.to_owned();
        self.realname = realname.to_owned();
        out.push(wire::pass(pass));
        out.push(wire::nick(nick));
        out.push(wire::user(user, realname));
    }

    pub(crate) fn snapshot(&self) -> SessionInfo {
        SessionInfo {
            server: self.server.clone(),
            port: self.port,
            tls: self.tls,
            nick: self.nick.clone(),
            user: self.user.clone(),
            realname: self.realname.clone(),
            connected: self.connected,
            logged_on: self.logged_on,
            autoping: self.autoping,
            debug: self.debug,
            login_time: self.login_time,
            network: self.network.clone(),
            chan_prefixes: self.chan_prefixes.clone(),
            user_prefixes: self.user_prefixes.clone(),
        }
    }

    /// Apply one parsed server message: update the session, emit events, and append any lines to
    /// send back (PONGs) to `out`.
    pub(crate) fn update(
        &mut self,
        msg: wire::Msg,
        handlers: &mut Handlers,
        out: &mut Vec<String>,
    ) {
        let from: Option<String> = msg
            .pfx
            .as_ref()
            .and_then(wire::Pfx::nick)
            .map(str::to_owned);
        let is_self = from.as_deref() == Some(self.nick.as_str());

        match msg.cmd {
            // PING: send PONG, echoing the origin when there is one. No event.
            wire::Cmd::PING { ref origin } if self.autoping => {
                out.push(match origin {
                    Some(origin) => wire::pong_to(&self.nick, origin),
                    None => wire::pong(&self.nick),
                });
                return;
            }

            // RPL_WELCOME: registration went through.
            wire::Cmd::Reply { num: 1, .. } if !self.logged_on => {
                self.logged_on = true;
                self.login_time = Some(SystemTime::now());
                handlers.emit(Event::LoggedIn);
                return;
            }

            // RPL_ISUPPORT: the server tells us how to interpret the rest of the session.
            wire::Cmd::Reply { num: 5, ref params } => {
                for token in isupport::parse_tokens(params) {
                    match token {
                        Token::Network(name) => self.network = name.to_owned(),
                        Token::ChanTypes(chars) => self.chan_prefixes = chars.to_owned(),
                        Token::UserPrefixes(chars) => self.user_prefixes = chars.to_owned(),
                    }
                }
                return;
            }

            // RPL_TOPIC: args are [nick, chan, topic] or [chan, topic].
            wire::Cmd::Reply {
                num: 332,
                ref params,
            } if params.len() >= 2 => {
                let topic = &params[params.len() - 1];
                let chan = &params[params.len() - 2];
                self.roster.set_topic(chan, topic);
                handlers.emit(Event::TopicChanged {
                    chan: chan.clone(),
                    topic: topic.clone(),
                });
                return;
            }

            wire::Cmd::TOPIC {
                ref chan,
                ref topic,
            } => {
                self.roster.set_topic(chan, topic);
                handlers.emit(Event::TopicChanged {
                    chan: chan.clone(),
                    topic: topic.clone(),
                });
                return;
            }

            // RPL_NAMEREPLY: args are [nick, type, chan, names] or [type, chan, names]. The join
            // event already fired, so no event here.
            wire::Cmd::Reply {
                num: 353,
                ref params,
            } if params.len() >= 3 => {
                let names = &params[params.len() - 1];
                let chan = &params[params.len() - 2];
                self.roster
                    .users_join(chan, names.split_whitespace(), &self.user_prefixes);
                if let Some(ty) = params[params.len() - 3].chars().next() {
                    self.roster.set_type(chan, ty);
                }
                return;
            }

            // RPL_WHOREPLY: buffer the row until RPL_ENDOFWHO. No event.
            wire::Cmd::Reply {
                num: 352,
                ref params,
            } if params.len() >= 8 => {
                let chan = &params[1];
                let (hops, name) = match params[7].split_once(' ') {
                    Some((hops, name)) => (hops, name),
                    None => (params[7].as_str(), ""),
                };
                let entry = WhoEntry {
                    nick: params[5].clone(),
                    user: params[2].clone(),
                    name: name.to_owned(),
                    host: params[3].clone(),
                    server: params[4].clone(),
                    hops: hops.parse().unwrap_or(0),
                    operator: params[6].contains('@'),
                };
                self.who_buffers
                    .entry(normalize(chan))
                    .or_default()
                    .push(entry);
                return;
            }

            // RPL_ENDOFWHO: flush the buffered rows in arrival order.
            wire::Cmd::Reply {
                num: 315,
                ref params,
            } if params.len() >= 2 => {
                let chan = &params[params.len() - 2];
                let entries = self.who_buffers.remove(&normalize(chan)).unwrap_or_default();
                handlers.emit(Event::Who {
                    chan: chan.clone(),
                    entries,
                });
                return;
            }

            wire::Cmd::JOIN { ref chan } => {
                let who = match from {
                    Some(ref who) => who,
                    None => return,
                };
                if is_self {
                    self.roster.join(chan);
                    handlers.emit(Event::Joined {
                        chan: chan.clone(),
                        who: None,
                    });
                } else {
                    self.roster.user_join(chan, who);
                    handlers.emit(Event::Joined {
                        chan: chan.clone(),
                        who: Some(who.clone()),
                    });
                }
                return;
            }

            wire::Cmd::PART { ref chan, .. } => {
                let who = match from {
                    Some(ref who) => who,
                    None => return,
                };
                if is_self {
                    self.roster.part(chan);
                    handlers.emit(Event::Parted {
                        chan: chan.clone(),
                        who: None,
                    });
                } else {
                    self.roster.user_part(chan, who);
                    handlers.emit(Event::Parted {
                        chan: chan.clone(),
                        who: Some(who.clone()),
                    });
                }
                return;
            }

            wire::Cmd::NICK { nick: ref new_nick } => {
                let old = match from {
                    Some(ref old) => old,
                    None => return,
                };
                if is_self {
                    self.nick = new_nick.clone();
                    handlers.emit(Event::NickChanged {
                        old: None,
                        new: new_nick.clone(),
                    });
                } else {
                    self.roster.user_rename(old, new_nick);
                    handlers.emit(Event::NickChanged {
                        old: Some(old.clone()),
                        new: new_nick.clone(),
                    });
                }
                return;
            }

            // MODE in the [target, op, user] shape. The roster is not changed; rank bookkeeping
            // from modes is out of scope.
            wire::Cmd::MODE {
                ref target,
                ref params,
            } if params.len() == 2 => {
                handlers.emit(Event::Mode {
                    target: target.clone(),
                    op: params[0].clone(),
                    arg: params[1].clone(),
                });
                return;
            }

            wire::Cmd::INVITE { ref nick, ref chan } if *nick == self.nick => {
                let by = match from {
                    Some(ref by) => by.clone(),
                    None => return,
                };
                handlers.emit(Event::Invited {
                    by,
                    chan: chan.clone(),
                });
                return;
            }

            wire::Cmd::KICK {
                ref chan, ref nick, ..
            } => {
                let by = from.clone().unwrap_or_default();
                if *nick == self.nick {
                    self.roster.part(chan);
                    handlers.emit(Event::Kicked {
                        chan: chan.clone(),
                        by,
                        who: None,
                    });
                } else {
                    self.roster.user_part(chan, nick);
                    handlers.emit(Event::Kicked {
                        chan: chan.clone(),
                        by,
                        who: Some(nick.clone()),
                    });
                }
                return;
            }

            wire::Cmd::PRIVMSG {
                ref target,
                msg: ref text,
                ref ctcp,
                ..
            } => {
                let sender = from.clone().unwrap_or_default();
                match ctcp {
                    Some(wire::Ctcp::Invalid) => {
                        warn!("dropping malformed CTCP frame: {:?}", msg.raw);
                        if self.debug {
                            handlers.emit(Event::WireError(format!(
                                "malformed CTCP frame: {:?}",
                                msg.raw
                            )));
                        }
                    }
                    Some(wire::Ctcp::Action) => {
                        handlers.emit(Event::Me {
                            text: text.clone(),
                            from: sender,
                            chan: target.clone(),
                        });
                    }
                    // Plain messages and other CTCP queries are delivered as received text
                    _ => {
                        if *target == self.nick {
                            handlers.emit(Event::Received {
                                text: text.clone(),
                                from: sender,
                                to: None,
                            });
                        } else {
                            handlers.emit(Event::Received {
                                text: text.clone(),
                                from: sender.clone(),
                                to: Some(target.clone()),
                            });
                            if !self.nick.is_empty() && text.contains(&self.nick) {
                                handlers.emit(Event::Mentioned {
                                    text: text.clone(),
                                    from: sender,
                                    to: target.clone(),
                                });
                            }
                        }
                    }
                }
                return;
            }

            _ => {}
        }

        self.unmatched(msg, handlers);
    }

    /// A message with no transition of its own: offer it to the extensions, and failing that,
    /// surface it as an event.
    fn unmatched(&mut self, msg: wire::Msg, handlers: &mut Handlers) {
        if self.extensions.run(&msg, &mut self.roster) {
            return;
        }
        handlers.emit(Event::Unrecognized {
            cmd: msg.cmd.name(),
            msg,
        });
    }
}
