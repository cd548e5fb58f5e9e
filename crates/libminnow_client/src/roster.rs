//! The channel roster: which channels we are in, and what we know about each (type, topic,
//! occupants). A plain value type with no I/O, so every transition is directly testable.

use std::collections::{HashMap, HashSet};

// Used to normalize channel names for lookup. Rules are:
//
// - ASCII characters are mapped to their lowercase versions
// - '[', ']', '\\', '~' are mapped to '{', '}', '|', '^', respectively. See RFC 2812 section 2.2.
// - Non-ASCII characters are left unchanged.
fn to_lower(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        _ => c.to_ascii_lowercase(),
    }
}

/// The lookup key for a channel name. Servers treat `#Room` and `#room` as the same channel, so
/// the roster does too; the display form of the name is kept in [`Channel`].
pub(crate) fn normalize(chan: &str) -> String {
    chan.chars().map(to_lower).collect()
}

/// What we know about one channel we are in.
#[derive(Debug, Clone)]
pub struct Channel {
    name: String,
    ty: Option<char>,
    topic: String,
    users: HashSet<String>,
}

impl Channel {
    fn new(name: &str) -> Channel {
        Channel {
            name: name.to_owned(),
            ty: None,
            topic: String::new(),
            users: HashSet::new(),
        }
    }

    /// Name of the channel, in the casing it was first seen with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Channel type as reported by RPL_NAMEREPLY ('=' public, '*' private, '@' secret), `None`
    /// until the first name reply arrives.
    pub fn chan_type(&self) -> Option<char> {
        self.ty
    }

    /// Channel topic; empty until a topic is seen.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn users(&self) -> &HashSet<String> {
        &self.users
    }
}

/// All channels of a session, keyed case-insensitively per RFC 1459 casemapping.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    chans: HashMap<String, Channel>,
}

impl Roster {
    pub fn new() -> Roster {
        Roster::default()
    }

    /// Start tracking a channel. No-op when the channel is already known.
    pub fn join(&mut self, chan: &str) {
        self.chans
            .entry(normalize(chan))
            .or_insert_with(|| Channel::new(chan));
    }

    /// Forget a channel entirely.
    pub fn part(&mut self, chan: &str) {
        self.chans.remove(&normalize(chan));
    }

    /// Add a nick to a channel. No-op when the channel is unknown.
    pub fn user_join(&mut self, chan: &str, nick: &str) {
        if let Some(chan) = self.chans.get_mut(&normalize(chan)) {
            chan.users.insert(nick.to_owned());
        }
    }

    /// Remove a nick from a channel.
    pub fn user_part(&mut self, chan: &str, nick: &str) {
        if let Some(chan) = self.chans.get_mut(&normalize(chan)) {
            chan.users.remove(nick);
        }
    }

    /// Add several nicks to a channel at once, stripping leading rank characters (any characters
    /// from `prefixes`, e.g. the `@` in `@alice`) first.
    pub fn users_join<'a, I>(&mut self, chan: &str, nicks: I, prefixes: &str)
    where
        I: IntoIterator<Item = &'a str>,
    {
        if let Some(chan) = self.chans.get_mut(&normalize(chan)) {
            for nick in nicks {
                chan.users.insert(strip_rank(nick, prefixes).to_owned());
            }
        }
    }

    /// Replace `old` with `new` in every channel that contains `old`.
    pub fn user_rename(&mut self, old: &str, new: &str) {
        for chan in self.chans.values_mut() {
            if chan.users.remove(old) {
                chan.users.insert(new.to_owned());
            }
        }
    }

    pub fn set_topic(&mut self, chan: &str, topic: &str) {
        if let Some(chan) = self.chans.get_mut(&normalize(chan)) {
            chan.topic = topic.to_owned();
        }
    }

    pub fn set_type(&mut self, chan: &str, ty: char) {
        if let Some(chan) = self.chans.get_mut(&normalize(chan)) {
            chan.ty = Some(ty);
        }
    }

    /// Look a channel up by name. `None` when we are not in it, as opposed to a channel with no
    /// known users.
    pub fn get(&self, chan: &str) -> Option<&Channel> {
        self.chans.get(&normalize(chan))
    }

    /// Names of all known channels, in display form, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.chans.values().map(|chan| chan.name.clone()).collect();
        names.sort_unstable();
        names
    }

    /// Nicks in a channel, sorted case-insensitively. `None` when the channel is unknown.
    pub fn users(&self, chan: &str) -> Option<Vec<String>> {
        self.get(chan).map(|chan| {
            let mut nicks: Vec<String> = chan.users.iter().cloned().collect();
            nicks.sort_unstable_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()));
            nicks
        })
    }

    pub fn has_user(&self, chan: &str, nick: &str) -> Option<bool> {
        self.get(chan).map(|chan| chan.users.contains(nick))
    }

    /// Drop everything, for use on disconnection.
    pub fn reset(&mut self) {
        self.chans.clear();
    }
}

fn strip_rank<'a>(nick: &'a str, prefixes: &str) -> &'a str {
    nick.trim_start_matches(|c| prefixes.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_part() {
        let mut roster = Roster::new();
        roster.join("#room");
        roster.user_join("#room", "alice");
        assert_eq!(roster.users("#room"), Some(vec!["alice".to_owned()]));
        roster.part("#room");
        assert_eq!(roster.users("#room"), None);
    }

    #[test]
    fn test_unknown_channel_is_distinct_from_empty() {
        let mut roster = Roster::new();
        roster.join("#empty");
        assert_eq!(roster.users("#empty"), Some(vec![]));
        assert_eq!(roster.users("#nope"), None);
        assert_eq!(roster.has_user("#empty", "alice"), Some(false));
        assert_eq!(roster.has_user("#nope", "alice"), None);
    }

    #[test]
    fn test_casemapped_lookup() {
        let mut roster = Roster::new();
        roster.join("#Room");
        roster.user_join("#room", "alice");
        roster.user_join("#ROOM", "bob");
        assert_eq!(
            roster.users("#rOOm"),
            Some(vec!["alice".to_owned(), "bob".to_owned()])
        );
        // Display form keeps the original casing
        assert_eq!(roster.channels(), vec!["#Room"]);
        // RFC 1459: []\~ fold to {}|^
        roster.join("#chan[a]");
        assert!(roster.get("#chan{a}").is_some());
    }

    #[test]
    fn test_users_join_strips_rank_prefixes() {
        let mut roster = Roster::new();
        roster.join("#room");
        roster.users_join("#room", "@alice +bob carol".split_whitespace(), "@+");
        assert_eq!(
            roster.users("#room"),
            Some(vec![
                "alice".to_owned(),
                "bob".to_owned(),
                "carol".to_owned()
            ])
        );
        // Stacked prefixes (multi-prefix servers) are stripped too
        roster.users_join("#room", ["@+dan"], "@+");
        assert_eq!(roster.has_user("#room", "dan"), Some(true));
    }

    #[test]
    fn test_user_rename_spans_channels() {
        let mut roster = Roster::new();
        roster.join("#a");
        roster.join("#b");
        roster.join("#c");
        roster.user_join("#a", "alice");
        roster.user_join("#b", "alice");
        roster.user_join("#c", "carol");
        roster.user_rename("alice", "alice2");
        assert_eq!(roster.has_user("#a", "alice2"), Some(true));
        assert_eq!(roster.has_user("#a", "alice"), Some(false));
        assert_eq!(roster.has_user("#b", "alice2"), Some(true));
        assert_eq!(roster.users("#c"), Some(vec!["carol".to_owned()]));
    }

    #[test]
    fn test_topic_and_type() {
        let mut roster = Roster::new();
        roster.join("#room");
        assert_eq!(roster.get("#room").unwrap().topic(), "");
        assert_eq!(roster.get("#room").unwrap().chan_type(), None);
        roster.set_topic("#room", "hello world");
        roster.set_type("#room", '=');
        assert_eq!(roster.get("#room").unwrap().topic(), "hello world");
        assert_eq!(roster.get("#room").unwrap().chan_type(), Some('='));
        // Updates on channels we are not in are dropped
        roster.set_topic("#nope", "x");
        assert!(roster.get("#nope").is_none());
    }

    #[test]
    fn test_reset() {
        let mut roster = Roster::new();
        roster.join("#a");
        roster.join("#b");
        roster.reset();
        assert!(roster.channels().is_empty());
    }
}
