//! IRC wire protocol message parsers and generators. Incomplete; new messages are added as
//! needed.
//!
//! This library is for implementing clients rather than servers or services, and does not support
//! the IRC message format in full generality.

pub fn pass(pass: &str) -> String {
    format!("PASS {}\r\n", pass)
}

pub fn nick(arg: &str) -> String {
    format!("NICK {}\r\n", arg)
}

pub fn user(user: &str, realname: &str) -> String {
    format!("USER {} 0 * :{}\r\n", user, realname)
}

pub fn join(chan: &str, key: Option<&str>) -> String {
    match key {
        None => format!("JOIN {}\r\n", chan),
        Some(key) => format!("JOIN {} {}\r\n", chan, key),
    }
}

pub fn part(chan: &str, reason: Option<&str>) -> String {
    match reason {
        None => format!("PART {}\r\n", chan),
        Some(reason) => format!("PART {} :{}\r\n", chan, reason),
    }
}

pub fn privmsg(msgtarget: &str, msg: &str) -> String {
    // IRC messages need to be shorter than 512 bytes (see RFC 1459 or 2812). This should be dealt
    // with at call sites as we can't know how the caller wants to split long messages.
    assert!(msgtarget.len() + msg.len() + 12 <= 512);
    format!("PRIVMSG {} :{}\r\n", msgtarget, msg)
}

pub fn notice(msgtarget: &str, msg: &str) -> String {
    assert!(msgtarget.len() + msg.len() + 11 <= 512); // See comments in `privmsg`
    format!("NOTICE {} :{}\r\n", msgtarget, msg)
}

pub fn action(msgtarget: &str, msg: &str) -> String {
    assert!(msgtarget.len() + msg.len() + 21 <= 512); // See comments in `privmsg`
    format!("PRIVMSG {} :\x01ACTION {}\x01\r\n", msgtarget, msg)
}

pub fn ctcp(msgtarget: &str, msg: &str) -> String {
    assert!(msgtarget.len() + msg.len() + 13 <= 512); // See comments in `privmsg`
    format!("NOTICE {} :\x01{}\x01\r\n", msgtarget, msg)
}

pub fn kick(chan: &str, nick: &str, msg: Option<&str>) -> String {
    match msg {
        None => format!("KICK {} {}\r\n", chan, nick),
        Some(msg) => format!("KICK {} {} :{}\r\n", chan, nick, msg),
    }
}

pub fn names(chan: &str) -> String {
    format!("NAMES {}\r\n", chan)
}

pub fn who(chan: &str) -> String {
    format!("WHO {}\r\n", chan)
}

pub fn mode(target: &str, flags: &str, args: Option<&str>) -> String {
    match args {
        None => format!("MODE {} {}\r\n", target, flags),
        Some(args) => format!("MODE {} {} {}\r\n", target, flags, args),
    }
}

pub fn invite(nick: &str, chan: &str) -> String {
    format!("INVITE {} {}\r\n", nick, chan)
}

pub fn quit(reason: Option<&str>) -> String {
    match reason {
        None => "QUIT\r\n".to_string(),
        Some(reason) => format!("QUIT :{}\r\n", reason),
    }
}

pub fn raw(cmd: &str) -> String {
    format!("{}\r\n", cmd)
}

/// One-argument PONG, used when the PING that solicited it carried no origin.
pub fn pong(arg: &str) -> String {
    format!("PONG :{}\r\n", arg)
}

/// Two-argument PONG, echoing the origin of the PING back to the server.
pub fn pong_to(nick: &str, origin: &str) -> String {
    format!("PONG {} :{}\r\n", nick, origin)
}

/// Sender of a message ("prefix" in the RFC): `<servername> | <nick> [ '!' <user> ] [ '@' <host> ]`.
///
/// From RFC 2812:
///
/// > If the prefix is missing from the message, it is assumed to have originated from the
/// > connection from which it was received from.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Pfx {
    /// Sender is a server.
    Server(String),

    /// Sender is a nick.
    User {
        /// Nick of the sender
        nick: String,
        /// `user` part, when present
        user: Option<String>,
        /// `host` part, when present
        host: Option<String>,
    },

    /// Sender could be a server or a nick, it's unclear. According to the RFC if we have
    /// something like "localhost" which doesn't have '!', '@', or a character that 'servername'
    /// can have but 'nickname' cannot, we can't tell whether the sender is a server or a nick.
    Ambiguous(String),
}

impl Pfx {
    /// The nick of the sender, when the sender is (or may be) a user.
    pub fn nick(&self) -> Option<&str> {
        match self {
            Pfx::User { nick, .. } | Pfx::Ambiguous(nick) => Some(nick),
            Pfx::Server(_) => None,
        }
    }
}

// RFC 2812 section 2.3.1
fn parse_pfx(pfx: &str) -> Pfx {
    match pfx.find('!') {
        Some(excl) => {
            let nick = &pfx[..excl];
            let rest = &pfx[excl + 1..];
            match rest.find('@') {
                Some(at) => Pfx::User {
                    nick: nick.to_owned(),
                    user: Some(rest[..at].to_owned()),
                    host: Some(rest[at + 1..].to_owned()),
                },
                None => Pfx::User {
                    nick: nick.to_owned(),
                    user: Some(rest.to_owned()),
                    host: None,
                },
            }
        }
        None => match pfx.find('@') {
            Some(at) => Pfx::User {
                nick: pfx[..at].to_owned(),
                user: None,
                host: Some(pfx[at + 1..].to_owned()),
            },
            None => {
                // Chars that nicks can have but servernames cannot
                match pfx.find(&['[', ']', '\\', '`', '_', '^', '{', '|', '}'][..]) {
                    Some(_) => Pfx::User {
                        nick: pfx.to_owned(),
                        user: None,
                        host: None,
                    },
                    None => {
                        // Nicks can't have '.'
                        match pfx.find('.') {
                            Some(_) => Pfx::Server(pfx.to_owned()),
                            None => Pfx::Ambiguous(pfx.to_owned()),
                        }
                    }
                }
            }
        },
    }
}

/// A client-to-client protocol frame found in a PRIVMSG or NOTICE trailing argument. See
/// <https://defs.ircdocs.horse/defs/ctcp.html>. The payload of the frame replaces the message
/// text; `Invalid` marks a frame that opens with 0x01 but never closes.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Ctcp {
    Action,
    Other,
    Invalid,
}

/// An IRC message.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Msg {
    /// Sender of the message. According to RFC 2812 it's optional:
    ///
    /// > If the prefix is missing from the message, it is assumed to have originated from the
    /// > connection from which it was received from.
    pub pfx: Option<Pfx>,
    pub cmd: Cmd,
    /// The line as received, without the trailing "\r\n".
    pub raw: String,
}

/// An IRC command or reply.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Cmd {
    /// A PRIVMSG or NOTICE. Check `is_notice` field.
    PRIVMSG {
        target: String,
        msg: String,
        is_notice: bool,
        ctcp: Option<Ctcp>,
    },

    JOIN {
        chan: String,
    },

    PART {
        chan: String,
        msg: Option<String>,
    },

    NICK {
        nick: String,
    },

    TOPIC {
        chan: String,
        topic: String,
    },

    PING {
        origin: Option<String>,
    },

    INVITE {
        nick: String,
        chan: String,
    },

    KICK {
        chan: String,
        nick: String,
        msg: Option<String>,
    },

    MODE {
        target: String,
        params: Vec<String>,
    },

    /// Numeric replies are kept generic as there are just too many replies and we probably only
    /// need to handle a small subset of them.
    Reply {
        num: u16,
        params: Vec<String>,
    },

    /// An IRC message other than the ones listed above.
    Other {
        cmd: String,
        params: Vec<String>,
    },
}

impl Cmd {
    /// The verb of the command as it appeared on the wire. Numerics keep their three-digit form.
    pub fn name(&self) -> String {
        match self {
            Cmd::PRIVMSG {
                is_notice: false, ..
            } => "PRIVMSG".to_owned(),
            Cmd::PRIVMSG {
                is_notice: true, ..
            } => "NOTICE".to_owned(),
            Cmd::JOIN { .. } => "JOIN".to_owned(),
            Cmd::PART { .. } => "PART".to_owned(),
            Cmd::NICK { .. } => "NICK".to_owned(),
            Cmd::TOPIC { .. } => "TOPIC".to_owned(),
            Cmd::PING { .. } => "PING".to_owned(),
            Cmd::INVITE { .. } => "INVITE".to_owned(),
            Cmd::KICK { .. } => "KICK".to_owned(),
            Cmd::MODE { .. } => "MODE".to_owned(),
            Cmd::Reply { num, .. } => format!("{:03}", num),
            Cmd::Other { cmd, .. } => cmd.clone(),
        }
    }
}

/// An intermediate type used during parsing.
enum MsgType<'a> {
    Cmd(&'a str),
    Num(u16),
}

static CRLF: [u8; 2] = [b'\r', b'\n'];

/// Try to read an IRC message off a buffer. Drops the line from the buffer when a full line is
/// available, whether or not it parses. Otherwise the buffer is left unchanged.
pub fn parse_irc_msg(buf: &mut Vec<u8>) -> Option<Result<Msg, String>> {
    // Find "\r\n" separator. We can't do this *after* generating the lossy UTF-8, as that may
    // have a different size than the original buffer after inserting "REPLACEMENT CHARACTER"s.
    let crlf_idx = match buf.windows(2).position(|sub| sub == CRLF) {
        None => return None,
        Some(i) => i,
    };

    let line: String = String::from_utf8_lossy(&buf[0..crlf_idx]).to_string();
    let ret = parse_line(&line);
    buf.drain(0..crlf_idx + 2);

    Some(ret)
}

/// Parse a single message. `line` must not contain the "\r\n" suffix.
pub fn parse_line(line: &str) -> Result<Msg, String> {
    let raw = line.to_owned();
    let mut msg = line;

    let pfx: Option<Pfx> = if let Some(':') = msg.chars().next() {
        let ws_idx = msg
            .find(' ')
            .ok_or_else(|| format!("Can't find prefix terminator (' ') in msg: {:?}", msg))?;
        let pfx = &msg[1..ws_idx]; // consume ':'
        msg = &msg[ws_idx + 1..]; // consume ' '
        Some(parse_pfx(pfx))
    } else {
        None
    };

    let msg_ty: MsgType = {
        // The command may be the last token of the line (e.g. a parameterless QUIT)
        let ws_idx = msg.find(' ').unwrap_or(msg.len());
        let cmd = &msg[..ws_idx];
        if cmd.is_empty() {
            return Err(format!("Missing command in msg: {:?}", raw));
        }
        msg = msg.get(ws_idx + 1..).unwrap_or("");
        match parse_reply_num(cmd) {
            Some(num) => MsgType::Num(num),
            None => MsgType::Cmd(cmd),
        }
    };

    let params = parse_params(msg);
    let cmd = match msg_ty {
        MsgType::Cmd("PRIVMSG") | MsgType::Cmd("NOTICE") if params.len() == 2 => {
            let is_notice = matches!(msg_ty, MsgType::Cmd("NOTICE"));
            let target = params[0];
            let mut text = params[1];

            let mut ctcp: Option<Ctcp> = None;
            if let Some(inner) = text.strip_prefix('\x01') {
                match inner.strip_suffix('\x01') {
                    Some(payload) => match payload.strip_prefix("ACTION ") {
                        Some(act) => {
                            ctcp = Some(Ctcp::Action);
                            text = act;
                        }
                        None => {
                            ctcp = Some(Ctcp::Other);
                            text = payload;
                        }
                    },
                    // Opening delimiter without a closing one
                    None => ctcp = Some(Ctcp::Invalid),
                }
            }

            Cmd::PRIVMSG {
                target: target.to_owned(),
                msg: text.to_owned(),
                is_notice,
                ctcp,
            }
        }
        MsgType::Cmd("JOIN") if params.len() == 1 => Cmd::JOIN {
            chan: params[0].to_owned(),
        },
        MsgType::Cmd("PART") if params.len() == 1 || params.len() == 2 => Cmd::PART {
            chan: params[0].to_owned(),
            msg: params.get(1).map(|s| (*s).to_owned()),
        },
        MsgType::Cmd("NICK") if params.len() == 1 => Cmd::NICK {
            nick: params[0].to_owned(),
        },
        MsgType::Cmd("TOPIC") if params.len() == 2 => Cmd::TOPIC {
            chan: params[0].to_owned(),
            topic: params[1].to_owned(),
        },
        MsgType::Cmd("PING") if params.len() <= 1 => Cmd::PING {
            origin: params.first().map(|s| (*s).to_owned()),
        },
        MsgType::Cmd("INVITE") if params.len() == 2 => Cmd::INVITE {
            nick: params[0].to_owned(),
            chan: params[1].to_owned(),
        },
        MsgType::Cmd("KICK") if params.len() == 2 || params.len() == 3 => Cmd::KICK {
            chan: params[0].to_owned(),
            nick: params[1].to_owned(),
            msg: params.get(2).map(|s| (*s).to_owned()),
        },
        MsgType::Cmd("MODE") if !params.is_empty() => Cmd::MODE {
            target: params[0].to_owned(),
            params: params[1..].iter().map(|s| (*s).to_owned()).collect(),
        },
        MsgType::Num(num) => Cmd::Reply {
            num,
            params: params.into_iter().map(str::to_owned).collect(),
        },
        MsgType::Cmd(cmd) => Cmd::Other {
            cmd: cmd.to_owned(),
            params: params.into_iter().map(str::to_owned).collect(),
        },
    };

    Ok(Msg { pfx, cmd, raw })
}

fn parse_reply_num(cmd: &str) -> Option<u16> {
    // Reply numbers are exactly three ASCII digits; anything else is a verb.
    if cmd.len() == 3 && cmd.bytes().all(|b| b.is_ascii_digit()) {
        cmd.parse::<u16>().ok()
    } else {
        None
    }
}

fn parse_params(mut rest: &str) -> Vec<&str> {
    let mut ret: Vec<&str> = Vec::new();
    loop {
        if rest.is_empty() {
            return ret;
        }
        // A ':' at the start of a parameter marks the trailing argument, which runs to the end
        // of the line. A ':' inside a parameter (e.g. "CHANLIMIT=#:120") has no meaning.
        if let Some(trailing) = rest.strip_prefix(':') {
            ret.push(trailing);
            return ret;
        }
        match rest.find(' ') {
            None => {
                ret.push(rest);
                return ret;
            }
            Some(ws_idx) => {
                ret.push(&rest[..ws_idx]);
                rest = &rest[ws_idx + 1..];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_params() {
        assert_eq!(parse_params("p1 p2 p3"), vec!["p1", "p2", "p3"]);
        let v: Vec<&str> = vec![];
        assert_eq!(parse_params(""), v);
        assert_eq!(parse_params(":foo bar baz "), vec!["foo bar baz "]);
        assert_eq!(parse_params(":"), vec![""]);
        // ':' inside a parameter does not start the trailing argument
        assert_eq!(
            parse_params("bob CHANLIMIT=#:120 :are supported"),
            vec!["bob", "CHANLIMIT=#:120", "are supported"]
        );
    }

    #[test]
    fn test_privmsg_parsing() {
        let raw = ":nick!~nick@unaffiliated/nick PRIVMSG minnow :a b c";
        assert_eq!(
            parse_line(raw),
            Ok(Msg {
                pfx: Some(Pfx::User {
                    nick: "nick".to_owned(),
                    user: Some("~nick".to_owned()),
                    host: Some("unaffiliated/nick".to_owned()),
                }),
                cmd: Cmd::PRIVMSG {
                    target: "minnow".to_owned(),
                    msg: "a b c".to_owned(),
                    is_notice: false,
                    ctcp: None,
                },
                raw: raw.to_owned(),
            })
        );
    }

    #[test]
    fn test_notice_parsing() {
        let raw = ":barjavel.freenode.net NOTICE * :*** Looking up your hostname...";
        assert_eq!(
            parse_line(raw),
            Ok(Msg {
                pfx: Some(Pfx::Server("barjavel.freenode.net".to_owned())),
                cmd: Cmd::PRIVMSG {
                    target: "*".to_owned(),
                    msg: "*** Looking up your hostname...".to_owned(),
                    is_notice: true,
                    ctcp: None,
                },
                raw: raw.to_owned(),
            })
        );
    }

    #[test]
    fn test_numeric_parsing() {
        let mut buf = vec![];
        write!(
            &mut buf,
            ":barjavel.freenode.net 001 minnow :Welcome to the freenode Internet Relay Chat Network minnow\r\n"
        ).unwrap();
        write!(
            &mut buf,
            ":barjavel.freenode.net 002 minnow :Your host is barjavel.freenode.net[123.123.123.123/8001], \
             running version ircd-seven-1.1.4\r\n"
        ).unwrap();
        write!(
            &mut buf,
            ":barjavel.freenode.net 004 minnow_test barjavel.freenode.net \
             ircd-seven-1.1.4 DOQRSZaghilopswz \
             CFILMPQSbcefgijklmnopqrstvz bkloveqjfI\r\n"
        )
        .unwrap();
        write!(
            &mut buf,
            ":barjavel.freenode.net 005 minnow_test CHANTYPES=# EXCEPTS INVEX \
             CHANMODES=eIbq,k,flj,CFLMPQScgimnprstz CHANLIMIT=#:120 PREFIX=(ov)@+ \
             MAXLIST=bqeI:100 MODES=4 NETWORK=freenode STATUSMSG=@+ CALLERID=g \
             CASEMAPPING=rfc1459 :are supported by this server\r\n"
        )
        .unwrap();

        let mut msgs = vec![];
        while let Some(msg) = parse_irc_msg(&mut buf) {
            msgs.push(msg.unwrap());
        }

        assert_eq!(msgs.len(), 4);
        assert!(matches!(msgs[0].cmd, Cmd::Reply { num: 1, .. }));
        match &msgs[3].cmd {
            Cmd::Reply { num: 5, params } => {
                // The trailing argument stays one parameter despite its spaces
                assert_eq!(params.last().unwrap(), "are supported by this server");
                assert!(params.iter().any(|p| p == "PREFIX=(ov)@+"));
            }
            cmd => panic!("unexpected cmd: {:?}", cmd),
        }
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn test_part_parsing() {
        let raw = ":minnow!~minnow@123.123.123.123 PART #haskell";
        assert_eq!(
            parse_line(raw),
            Ok(Msg {
                pfx: Some(Pfx::User {
                    nick: "minnow".to_owned(),
                    user: Some("~minnow".to_owned()),
                    host: Some("123.123.123.123".to_owned()),
                }),
                cmd: Cmd::PART {
                    chan: "#haskell".to_owned(),
                    msg: None,
                },
                raw: raw.to_owned(),
            })
        );
    }

    #[test]
    fn test_join_parsing() {
        let mut buf = vec![];
        write!(&mut buf, ":minnow!~minnow@192.168.0.1 JOIN #haskell\r\n").unwrap();
        let msg = parse_irc_msg(&mut buf).unwrap().unwrap();
        assert_eq!(
            msg.cmd,
            Cmd::JOIN {
                chan: "#haskell".to_owned(),
            }
        );
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn test_ping_parsing() {
        assert_eq!(
            parse_line("PING :tolsun.oulu.fi").map(|msg| msg.cmd),
            Ok(Cmd::PING {
                origin: Some("tolsun.oulu.fi".to_owned()),
            })
        );
        assert_eq!(
            parse_line("PING").map(|msg| msg.cmd),
            Ok(Cmd::PING { origin: None })
        );
    }

    // Example from https://tools.ietf.org/id/draft-oakley-irc-ctcp-01.html
    #[test]
    fn test_ctcp_action_parsing() {
        let msg = parse_line(":dan!u@localhost PRIVMSG #ircv3 :\x01ACTION writes some specs!\x01")
            .unwrap();
        assert_eq!(
            msg.cmd,
            Cmd::PRIVMSG {
                target: "#ircv3".to_owned(),
                msg: "writes some specs!".to_owned(),
                is_notice: false,
                ctcp: Some(Ctcp::Action),
            }
        );
    }

    #[test]
    fn test_ctcp_other_parsing() {
        let msg = parse_line(":a!b@c PRIVMSG target :\x01VERSION\x01").unwrap();
        assert_eq!(
            msg.cmd,
            Cmd::PRIVMSG {
                target: "target".to_owned(),
                msg: "VERSION".to_owned(),
                is_notice: false,
                ctcp: Some(Ctcp::Other),
            }
        );
    }

    #[test]
    fn test_ctcp_invalid_parsing() {
        // Opening delimiter without the closing one
        let msg = parse_line(":a!b@c PRIVMSG target :\x01ACTION waves").unwrap();
        match msg.cmd {
            Cmd::PRIVMSG { ctcp, .. } => assert_eq!(ctcp, Some(Ctcp::Invalid)),
            cmd => panic!("unexpected cmd: {:?}", cmd),
        }
    }

    #[test]
    fn test_kick_invite_parsing() {
        assert_eq!(
            parse_line(":op!u@h KICK #room minnow :bye").map(|msg| msg.cmd),
            Ok(Cmd::KICK {
                chan: "#room".to_owned(),
                nick: "minnow".to_owned(),
                msg: Some("bye".to_owned()),
            })
        );
        assert_eq!(
            parse_line(":alice!u@h INVITE minnow :#room").map(|msg| msg.cmd),
            Ok(Cmd::INVITE {
                nick: "minnow".to_owned(),
                chan: "#room".to_owned(),
            })
        );
    }

    #[test]
    fn test_unknown_verb_parsing() {
        // ERROR is not one of the typed commands; it parses generically
        let msg = parse_line("ERROR :Closing Link: 212.252.143.51 (Excess Flood)").unwrap();
        assert_eq!(
            msg.cmd,
            Cmd::Other {
                cmd: "ERROR".to_owned(),
                params: vec!["Closing Link: 212.252.143.51 (Excess Flood)".to_owned()],
            }
        );
        assert_eq!(msg.cmd.name(), "ERROR");
    }

    #[test]
    fn test_pfx_heuristics() {
        assert_eq!(
            parse_line(":localhost NOTICE * :hi").unwrap().pfx,
            Some(Pfx::Ambiguous("localhost".to_owned()))
        );
        assert_eq!(
            parse_line(":nick@host PRIVMSG a :b").unwrap().pfx,
            Some(Pfx::User {
                nick: "nick".to_owned(),
                user: None,
                host: Some("host".to_owned()),
            })
        );
        assert_eq!(
            parse_line(":irc.example 001 bob :Welcome").unwrap().pfx,
            Some(Pfx::Server("irc.example".to_owned()))
        );
    }

    #[test]
    fn test_format_commands() {
        assert_eq!(user("bob", "Bob B."), "USER bob 0 * :Bob B.\r\n");
        assert_eq!(join("#room", None), "JOIN #room\r\n");
        assert_eq!(join("#room", Some("hunter2")), "JOIN #room hunter2\r\n");
        assert_eq!(part("#room", Some("bye")), "PART #room :bye\r\n");
        assert_eq!(
            action("#room", "waves"),
            "PRIVMSG #room :\x01ACTION waves\x01\r\n"
        );
        assert_eq!(
            ctcp("bob", "VERSION"),
            "NOTICE bob :\x01VERSION\x01\r\n"
        );
        assert_eq!(kick("#room", "bob", Some("out")), "KICK #room bob :out\r\n");
        assert_eq!(mode("#room", "+o", Some("bob")), "MODE #room +o bob\r\n");
        assert_eq!(mode("bob", "+i", None), "MODE bob +i\r\n");
        assert_eq!(invite("bob", "#room"), "INVITE bob #room\r\n");
        assert_eq!(quit(Some("gone")), "QUIT :gone\r\n");
        assert_eq!(pong("bob"), "PONG :bob\r\n");
        assert_eq!(pong_to("bob", "irc.example"), "PONG bob :irc.example\r\n");
    }
}
