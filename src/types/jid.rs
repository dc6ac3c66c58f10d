use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";
pub const GROUP_SERVER: &str = "g.us";
pub const HIDDEN_USER_SERVER: &str = "lid";
pub const BROADCAST_SERVER: &str = "broadcast";

pub type MessageId = String;

#[derive(Debug, thiserror::Error)]
pub enum JidError {
    #[error("invalid JID format: {0}")]
    InvalidFormat(String),
}

/// A network routing identifier: `user[:device]@server`.
///
/// The server suffix distinguishes individual (`s.whatsapp.net`), group
/// (`g.us`) and business/hidden-user (`lid`) addressing. The optional device
/// part carries a per-device suffix on authenticated identities and is never
/// part of the phone number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Jid {
    pub user: String,
    pub server: String,
    pub device: u16,
}

impl Jid {
    pub fn new(user: &str, server: &str) -> Self {
        Self {
            user: user.to_string(),
            server: server.to_string(),
            device: 0,
        }
    }

    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }

    /// Business accounts route through the hidden-user identifier scheme.
    pub fn is_business(&self) -> bool {
        self.server == HIDDEN_USER_SERVER
    }

    pub fn is_broadcast(&self) -> bool {
        self.server == BROADCAST_SERVER
    }

    /// The bare phone number (or opaque identifier) without any device part.
    pub fn phone_number(&self) -> &str {
        &self.user
    }

    /// The same identity with the device suffix stripped.
    pub fn to_non_device(&self) -> Jid {
        Jid {
            user: self.user.clone(),
            server: self.server.clone(),
            device: 0,
        }
    }
}

impl FromStr for Jid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user_part, server) = s
            .rsplit_once('@')
            .ok_or_else(|| JidError::InvalidFormat(s.to_string()))?;
        if server.is_empty() {
            return Err(JidError::InvalidFormat(s.to_string()));
        }

        let (user, device) = match user_part.split_once(':') {
            Some((user, device)) => {
                let device = device
                    .parse::<u16>()
                    .map_err(|_| JidError::InvalidFormat(s.to_string()))?;
                (user, device)
            }
            None => (user_part, 0),
        };

        Ok(Jid {
            user: user.to_string(),
            server: server.to_string(),
            device,
        })
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.device > 0 {
            write!(f, "{}:{}@{}", self.user, self.device, self.server)
        } else {
            write!(f, "{}@{}", self.user, self.server)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_user_jid() {
        let jid: Jid = "201112223334@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "201112223334");
        assert_eq!(jid.server, DEFAULT_USER_SERVER);
        assert_eq!(jid.device, 0);
        assert!(!jid.is_group());
        assert!(!jid.is_business());
    }

    #[test]
    fn parses_device_suffix() {
        let jid: Jid = "201112223334:12@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.phone_number(), "201112223334");
        assert_eq!(jid.device, 12);
        assert_eq!(
            jid.to_non_device().to_string(),
            "201112223334@s.whatsapp.net"
        );
    }

    #[test]
    fn distinguishes_servers() {
        let group: Jid = "1234-5678@g.us".parse().unwrap();
        assert!(group.is_group());

        let business: Jid = "45102139449572@lid".parse().unwrap();
        assert!(business.is_business());
    }

    #[test]
    fn rejects_missing_server() {
        assert!(Jid::from_str("201112223334").is_err());
        assert!(Jid::from_str("201112223334@").is_err());
    }

    #[test]
    fn display_round_trips() {
        for raw in ["123@s.whatsapp.net", "123:4@lid", "999-888@g.us"] {
            let jid: Jid = raw.parse().unwrap();
            assert_eq!(jid.to_string(), raw);
        }
    }
}
