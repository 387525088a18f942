//! Fetched message handles
//!
//! A [`RawMessage`] is the owned form of one IMAP `FETCH` response: sequence
//! number, flags, internal date, envelope summary and the body bytes of the
//! requested [`BodySection`]. It is produced by the fetcher and consumed once
//! by the normalizer.

use async_imap::types::Fetch;
use chrono::{DateTime, FixedOffset};

/// Which part of a message a fetch requests
///
/// Uses `BODY.PEEK` so fetching never sets `\Seen`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodySection {
    /// The whole RFC 5322 message (`BODY.PEEK[]`)
    #[default]
    Full,
    /// Header block only (`BODY.PEEK[HEADER]`)
    Header,
}

impl BodySection {
    /// Fetch item naming this section
    pub fn fetch_item(self) -> &'static str {
        match self {
            Self::Full => "BODY.PEEK[]",
            Self::Header => "BODY.PEEK[HEADER]",
        }
    }

    /// Full fetch query: envelope, flags, internal date and this section
    pub fn fetch_query(self) -> String {
        format!("(UID FLAGS INTERNALDATE ENVELOPE {})", self.fetch_item())
    }
}

/// Envelope fields as reported by the server
///
/// Values are decoded lossily; encoded words are left as sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeSummary {
    pub date: Option<String>,
    pub subject: Option<String>,
    pub from: Vec<String>,
    pub to: Vec<String>,
}

/// One fetched message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Message sequence number within the selected mailbox
    pub seq: u32,
    pub uid: Option<u32>,
    /// IMAP flags in `Debug` form (e.g. `Seen`, `Custom("$Label")`)
    pub flags: Vec<String>,
    pub internal_date: Option<DateTime<FixedOffset>>,
    pub envelope: Option<EnvelopeSummary>,
    section: BodySection,
    body: Option<Vec<u8>>,
}

impl RawMessage {
    /// Build a message from already-owned parts
    pub fn new(seq: u32, section: BodySection, body: Option<Vec<u8>>) -> Self {
        Self {
            seq,
            uid: None,
            flags: Vec::new(),
            internal_date: None,
            envelope: None,
            section,
            body,
        }
    }

    /// Copy everything needed out of a borrowed `FETCH` response
    pub fn from_fetch(fetch: &Fetch, section: BodySection) -> Self {
        let body = match section {
            BodySection::Full => fetch.body(),
            BodySection::Header => fetch.header(),
        };
        let envelope = fetch.envelope().map(|env| EnvelopeSummary {
            date: env.date.as_deref().map(lossy),
            subject: env.subject.as_deref().map(lossy),
            from: env
                .from
                .as_ref()
                .map(|addrs| {
                    addrs
                        .iter()
                        .map(|a| {
                            envelope_address(
                                a.name.as_deref(),
                                a.mailbox.as_deref(),
                                a.host.as_deref(),
                            )
                        })
                        .collect()
                })
                .unwrap_or_default(),
            to: env
                .to
                .as_ref()
                .map(|addrs| {
                    addrs
                        .iter()
                        .map(|a| {
                            envelope_address(
                                a.name.as_deref(),
                                a.mailbox.as_deref(),
                                a.host.as_deref(),
                            )
                        })
                        .collect()
                })
                .unwrap_or_default(),
        });

        Self {
            uid: fetch.uid,
            flags: fetch.flags().map(|flag| format!("{flag:?}")).collect(),
            internal_date: fetch.internal_date(),
            envelope,
            ..Self::new(fetch.message, section, body.map(<[u8]>::to_vec))
        }
    }

    /// Body bytes for `section`, if that section was fetched
    pub fn body(&self, section: BodySection) -> Option<&[u8]> {
        if section != self.section {
            return None;
        }
        self.body.as_deref()
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Render an envelope address as `Name <mailbox@host>` or `mailbox@host`
fn envelope_address(name: Option<&[u8]>, mailbox: Option<&[u8]>, host: Option<&[u8]>) -> String {
    let addr = match (mailbox.map(String::from_utf8_lossy), host.map(String::from_utf8_lossy)) {
        (Some(m), Some(h)) => format!("{m}@{h}"),
        (Some(m), None) => m.into_owned(),
        (None, Some(h)) => h.into_owned(),
        (None, None) => String::new(),
    };
    match name.map(lossy).filter(|n| !n.trim().is_empty()) {
        Some(n) => format!("{n} <{addr}>"),
        None => addr,
    }
}
