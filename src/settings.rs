use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::config::Config;
use crate::model::Client;

/// Characters left as-is in a path segment, matching `encodeURIComponent`.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub const FALLBACK_COMPANY_NAME: &str = "Posting Schedule";

/// Shared settings handed to every component that needs the operator's
/// identity or the known clients.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub company_name: String,
    pub share_base_url: String,
    pub clients: Vec<Client>,
}

impl Settings {
    pub fn from_config(cfg: &Config, clients: Vec<Client>) -> Self {
        Self {
            company_name: cfg.share.company_name.trim().to_string(),
            share_base_url: cfg.share.base_url.trim().to_string(),
            clients,
        }
    }

    pub fn find_client(&self, client_id: &str) -> Option<&Client> {
        self.clients
            .iter()
            .find(|client| client.id.as_deref() == Some(client_id))
    }

    /// Name for footers and signatures; never empty.
    pub fn display_company(&self) -> &str {
        if self.company_name.is_empty() {
            FALLBACK_COMPANY_NAME
        } else {
            &self.company_name
        }
    }

    pub fn client_share_link(&self, client_id: &str) -> String {
        format!(
            "{}/client/{}",
            self.share_base_url.trim_end_matches('/'),
            encode_component(client_id)
        )
    }
}

pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, SEGMENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            company_name: String::new(),
            share_base_url: "https://agenda.example.com/".into(),
            clients: vec![Client::new("Acme").with_id("acme")],
        }
    }

    #[test]
    fn share_link_is_canonical() {
        let s = settings();
        assert_eq!(
            s.client_share_link("acme"),
            "https://agenda.example.com/client/acme"
        );
        assert_eq!(
            s.client_share_link("a b/c"),
            "https://agenda.example.com/client/a%20b%2Fc"
        );
    }

    #[test]
    fn company_name_falls_back() {
        let mut s = settings();
        assert_eq!(s.display_company(), FALLBACK_COMPANY_NAME);
        s.company_name = "Pixel".into();
        assert_eq!(s.display_company(), "Pixel");
    }

    #[test]
    fn finds_clients_by_id() {
        let s = settings();
        assert_eq!(s.find_client("acme").map(|c| c.name.as_str()), Some("Acme"));
        assert!(s.find_client("globex").is_none());
    }
}
