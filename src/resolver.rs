//! Phone number and display-name resolution.
//!
//! Display names come from a priority chain of sources; each step is a
//! short-circuit fallback, so the first source that yields a usable name
//! wins.

use crate::types::jid::{DEFAULT_USER_SERVER, Jid};
use crate::types::message::Contact;

/// Strips everything but digits and rewrites a leading local-trunk zero to
/// the given country code.
pub fn normalize_phone(raw: &str, country_code: &str) -> String {
    let clean: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match clean.strip_prefix('0') {
        Some(rest) => format!("{country_code}{rest}"),
        None => clean,
    }
}

/// Turns a raw phone number into an individual-chat JID. Inputs that already
/// carry a server are parsed as-is.
pub fn phone_to_jid(raw: &str, country_code: &str) -> Jid {
    if raw.contains('@')
        && let Ok(jid) = raw.parse::<Jid>()
    {
        return jid;
    }
    Jid::new(&normalize_phone(raw, country_code), DEFAULT_USER_SERVER)
}

/// Name sources attached to a single message or roster entry, in priority
/// order: explicit profile push-name, business verified name, then the
/// contact directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct NameSources<'a> {
    pub push_name: Option<&'a str>,
    pub verified_name: Option<&'a str>,
    pub contact: Option<&'a Contact>,
}

fn usable(name: Option<&str>) -> Option<&str> {
    name.filter(|n| !n.trim().is_empty())
}

/// Resolves a display name through the fallback chain, ending at the raw
/// number when every richer source is empty.
pub fn resolve_display_name(sources: NameSources<'_>, fallback_number: &str) -> String {
    usable(sources.push_name)
        .or_else(|| usable(sources.verified_name))
        .or_else(|| sources.contact.and_then(contact_display_name))
        .unwrap_or(fallback_number)
        .to_string()
}

/// The best name a contact directory entry offers.
pub fn contact_display_name(contact: &Contact) -> Option<&str> {
    usable(contact.name.as_deref())
        .or_else(|| usable(contact.notify.as_deref()))
        .or_else(|| usable(contact.verified_name.as_deref()))
}

/// Finds the directory entry for a routing identifier, matching on the bare
/// user so device-suffixed identities still resolve.
pub fn find_contact<'a>(contacts: &'a [Contact], jid: &Jid) -> Option<&'a Contact> {
    contacts.iter().find(|c| c.jid.user == jid.user)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(name: Option<&str>, notify: Option<&str>, verified: Option<&str>) -> Contact {
        Contact {
            jid: "201000000001@s.whatsapp.net".parse().unwrap(),
            name: name.map(String::from),
            notify: notify.map(String::from),
            verified_name: verified.map(String::from),
        }
    }

    #[test]
    fn normalize_strips_non_digits() {
        assert_eq!(normalize_phone("+20 111-222-3334", "20"), "201112223334");
    }

    #[test]
    fn normalize_rewrites_trunk_zero() {
        assert_eq!(normalize_phone("01112223334", "20"), "201112223334");
        assert_eq!(normalize_phone("201112223334", "20"), "201112223334");
    }

    #[test]
    fn phone_to_jid_keeps_explicit_server() {
        let jid = phone_to_jid("1234-5678@g.us", "20");
        assert!(jid.is_group());

        let jid = phone_to_jid("0111 222 3334", "20");
        assert_eq!(jid.to_string(), "201112223334@s.whatsapp.net");
    }

    #[test]
    fn push_name_wins() {
        let c = contact(Some("Stored"), None, None);
        let sources = NameSources {
            push_name: Some("Pushed"),
            verified_name: Some("Verified"),
            contact: Some(&c),
        };
        assert_eq!(resolve_display_name(sources, "201"), "Pushed");
    }

    #[test]
    fn falls_through_empty_sources() {
        let c = contact(None, Some("Notify"), None);
        let sources = NameSources {
            push_name: Some("   "),
            verified_name: None,
            contact: Some(&c),
        };
        assert_eq!(resolve_display_name(sources, "201"), "Notify");
    }

    #[test]
    fn ends_at_raw_number() {
        assert_eq!(resolve_display_name(NameSources::default(), "201"), "201");
    }

    #[test]
    fn contact_prefers_name_over_notify() {
        let c = contact(Some("Name"), Some("Notify"), Some("Verified"));
        assert_eq!(contact_display_name(&c), Some("Name"));
        let c = contact(None, None, Some("Verified"));
        assert_eq!(contact_display_name(&c), Some("Verified"));
    }
}
