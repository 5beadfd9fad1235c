//! Result records returned to callers

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};

/// One registered game server as listed by a principal server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Dotted-quad IPv4 address
    pub address: String,
    /// Port players connect to
    pub game_port: u16,
    /// Port answering server queries
    pub query_port: u16,
}

impl DirectoryEntry {
    pub fn new(address: impl Into<String>, game_port: u16, query_port: u16) -> Self {
        Self {
            address: address.into(),
            game_port,
            query_port,
        }
    }

    /// Socket address the server answers queries on, if the address parses
    pub fn query_addr(&self) -> Option<SocketAddr> {
        let ip: IpAddr = self.address.parse().ok()?;
        Some(SocketAddr::new(ip, self.query_port))
    }
}

/// Ordered key/value table decoded from an info or rules response.
///
/// Repeated keys are kept (servers send one `Mutator` pair per mutator).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValues(Vec<(String, String)>);

impl KeyValues {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    /// First value stored under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value stored under `key`, in wire order
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Collapse into a map; the last value wins for repeated keys
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.0.iter().cloned().collect()
    }
}

impl FromIterator<(String, String)> for KeyValues {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One row of a server's player table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub ping: String,
    pub score: String,
    pub team: String,
}

impl Player {
    /// Number of strings making up one row on the wire
    pub const FIELD_COUNT: usize = 4;

    pub fn ping_ms(&self) -> Option<u32> {
        self.ping.trim().parse().ok()
    }

    pub fn score_value(&self) -> Option<i32> {
        self.score.trim().parse().ok()
    }
}

/// Everything a single game server reports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub info: KeyValues,
    pub rules: KeyValues,
    pub players: Vec<Player>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_addr() {
        let entry = DirectoryEntry::new("10.0.0.7", 7777, 7778);
        assert_eq!(entry.query_addr(), Some("10.0.0.7:7778".parse().unwrap()));

        let bad = DirectoryEntry::new("not-an-ip", 7777, 7778);
        assert_eq!(bad.query_addr(), None);
    }

    #[test]
    fn test_key_values_keep_repeated_keys() {
        let mut rules = KeyValues::new();
        rules.push("Mutator", "InstaGib");
        rules.push("GoalScore", "25");
        rules.push("Mutator", "LowGrav");

        assert_eq!(rules.len(), 3);
        assert_eq!(rules.get("Mutator"), Some("InstaGib"));
        assert_eq!(rules.get_all("Mutator").collect::<Vec<_>>(), vec!["InstaGib", "LowGrav"]);
        assert_eq!(rules.to_map().get("Mutator").map(String::as_str), Some("LowGrav"));
        assert_eq!(rules.get("TimeLimit"), None);
    }

    #[test]
    fn test_player_numeric_fields() {
        let player = Player {
            name: "Gorge".into(),
            ping: "48".into(),
            score: "-3".into(),
            team: "1".into(),
        };
        assert_eq!(player.ping_ms(), Some(48));
        assert_eq!(player.score_value(), Some(-3));

        let bot = Player { ping: "".into(), ..player };
        assert_eq!(bot.ping_ms(), None);
    }
}
