//! Message parsing and content normalization
//!
//! Parses fetched RFC 5322 messages using `mailparse`, walks the MIME leaves,
//! and produces one [`Email`] record per message. The HTML-vs-plain decision
//! depends on the destination's preference; plain output is tag-free with
//! entities decoded.

use chrono::{DateTime, Utc};
use mailparse::{DispositionType, MailAddr, MailAddrList, MailHeaderMap, ParsedMail};
use regex::Regex;
use tracing::{error, warn};

use crate::errors::{AppError, AppResult};
use crate::message::{BodySection, EnvelopeSummary, RawMessage};
use crate::preference::HtmlPreference;

/// Canonical normalized message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Email {
    /// Final body text: raw HTML when `html_format`, tag-free text otherwise
    pub body: String,
    /// Comma-joined sender list
    pub from: String,
    /// Comma-joined recipient list
    pub to: String,
    pub subject: String,
    /// `None` when the Date header is missing or unparsable
    pub date: Option<DateTime<Utc>>,
    /// Attachment filenames, each followed by `\r\n`
    pub attachment: String,
    pub html_format: bool,
}

impl Email {
    /// Attachment filenames in encounter order
    pub fn attachment_names(&self) -> impl Iterator<Item = &str> {
        self.attachment.split_terminator("\r\n")
    }
}

/// Which candidate wins when several parts of the same kind appear
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CandidateSelection {
    FirstWins,
    #[default]
    LastWins,
}

impl CandidateSelection {
    fn offer(self, slot: &mut Option<String>, value: String) {
        if self == Self::LastWins || slot.is_none() {
            *slot = Some(value);
        }
    }
}

/// Part-walk and body selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizePolicy {
    /// Selection among `text/html` inline parts
    pub html_candidate: CandidateSelection,
    /// Selection among `text/plain` inline parts
    pub plain_candidate: CandidateSelection,
    /// Inline parts of any other type compete as plain candidates
    pub unknown_inline_overrides_plain: bool,
    /// Clean HTML bodies with `ammonia` before handing them out
    pub sanitize_html: bool,
}

impl Default for NormalizePolicy {
    fn default() -> Self {
        Self {
            html_candidate: CandidateSelection::LastWins,
            plain_candidate: CandidateSelection::LastWins,
            unknown_inline_overrides_plain: true,
            sanitize_html: false,
        }
    }
}

/// Destination the normalized message is bound for
#[derive(Clone, Copy)]
pub struct DestinationContext<'a> {
    pub id: &'a str,
    pub preference: &'a dyn HtmlPreference,
}

/// Body candidates and attachments gathered from the part walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartCandidates {
    pub html: Option<String>,
    pub plain: Option<String>,
    pub attachment: String,
}

/// Turns fetched messages into [`Email`] records
///
/// Holds no per-message state; normalizing the same message twice yields
/// identical records.
#[derive(Debug, Clone)]
pub struct ContentNormalizer {
    policy: NormalizePolicy,
    line_break: Regex,
    tag: Regex,
}

impl ContentNormalizer {
    /// # Errors
    ///
    /// - `Internal` if a built-in pattern fails to compile
    pub fn new(policy: NormalizePolicy) -> AppResult<Self> {
        let line_break = Regex::new(r"(?i)<br\s*/?>")
            .map_err(|e| AppError::Internal(format!("invalid line break regex: {e}")))?;
        let tag = Regex::new(r"<[^>]*>")
            .map_err(|e| AppError::Internal(format!("invalid tag regex: {e}")))?;
        Ok(Self {
            policy,
            line_break,
            tag,
        })
    }

    /// Normalize one fetched message
    ///
    /// Returns `None` when the message or its body section is missing, or the
    /// body is not parseable; the caller skips such messages. A part read
    /// error stops the part walk but still yields a record. Header fields the
    /// message lacks are taken from the fetched envelope, and the date falls
    /// back to the server's internal date.
    pub fn normalize(
        &self,
        raw: Option<&RawMessage>,
        section: BodySection,
        destination: DestinationContext<'_>,
    ) -> Option<Email> {
        let Some(raw) = raw else {
            warn!(code = 15, "message handle is missing");
            return None;
        };
        let Some(body) = raw.body(section) else {
            warn!(code = 16, seq = raw.seq, section = section.fetch_item(), "body section is missing");
            return None;
        };

        let parsed = match mailparse::parse_mail(body) {
            Ok(parsed) => parsed,
            Err(e) => {
                let err = AppError::MessageParse(e.to_string());
                warn!(code = 17, seq = raw.seq, error = %err, "skipping unparseable message");
                return None;
            }
        };

        let mut email = Email {
            from: address_header(&parsed, "From"),
            to: address_header(&parsed, "To"),
            subject: parsed.headers.get_first_value("Subject").unwrap_or_default(),
            date: parsed
                .headers
                .get_first_value("Date")
                .as_deref()
                .and_then(parse_date),
            ..Email::default()
        };
        if let Some(envelope) = &raw.envelope {
            fill_from_envelope(&mut email, envelope);
        }
        if email.date.is_none() {
            email.date = raw.internal_date.map(|d| d.with_timezone(&Utc));
        }

        let mut candidates = PartCandidates::default();
        if let Err(err) = self.walk_parts(&parsed, "1", &mut candidates) {
            error!(code = 18, critical = true, seq = raw.seq, error = %err, "part walk stopped early");
        }

        let html_enabled = match destination.preference.is_html_enabled(destination.id) {
            Ok(enabled) => enabled,
            Err(e) => {
                let err = AppError::PreferenceLookup(e.to_string());
                error!(code = 55, critical = true, destination = destination.id, error = %err, "treating HTML as disabled");
                false
            }
        };

        email.attachment = std::mem::take(&mut candidates.attachment);
        let (body, html_format) = self.select_body(candidates, html_enabled);
        email.body = body;
        email.html_format = html_format;
        Some(email)
    }

    /// Walk MIME leaves depth-first, filling candidates and attachments
    ///
    /// A leaf is inline when it is `text/*` without an attachment
    /// disposition, or explicitly inline and unnamed. Every other leaf is an
    /// attachment, named or not.
    ///
    /// Stops at the first part whose body cannot be decoded; everything
    /// gathered before that point is kept.
    fn walk_parts(
        &self,
        part: &ParsedMail<'_>,
        part_id: &str,
        candidates: &mut PartCandidates,
    ) -> AppResult<()> {
        if !part.subparts.is_empty() {
            for (idx, sub) in part.subparts.iter().enumerate() {
                self.walk_parts(sub, &format!("{part_id}.{}", idx + 1), candidates)?;
            }
            return Ok(());
        }

        let disposition = part.get_content_disposition();
        let filename = disposition
            .params
            .get("filename")
            .or_else(|| part.ctype.params.get("name"));
        let ctype = part.ctype.mimetype.to_ascii_lowercase();
        // mailparse reports a missing Content-Disposition as inline
        let explicit_inline = disposition.disposition == DispositionType::Inline
            && part.headers.get_first_header("Content-Disposition").is_some();
        let inline = disposition.disposition != DispositionType::Attachment
            && (ctype.starts_with("text/") || (explicit_inline && filename.is_none()));
        if !inline {
            candidates
                .attachment
                .push_str(filename.map(String::as_str).unwrap_or_default());
            candidates.attachment.push_str("\r\n");
            return Ok(());
        }

        let content = part
            .get_body()
            .map_err(|e| AppError::PartRead(format!("part {part_id}: {e}")))?;
        if ctype.starts_with("text/html") {
            self.policy
                .html_candidate
                .offer(&mut candidates.html, content);
        } else if ctype.starts_with("text/plain") || self.policy.unknown_inline_overrides_plain {
            self.policy
                .plain_candidate
                .offer(&mut candidates.plain, content);
        }
        Ok(())
    }

    /// Choose the final body and its format flag
    ///
    /// HTML is used verbatim (entities decoded) only when an HTML candidate
    /// exists and the destination accepts HTML. Otherwise the plain candidate,
    /// or the HTML source when the plain one is blank, is flattened to text.
    pub fn select_body(&self, candidates: PartCandidates, html_enabled: bool) -> (String, bool) {
        let html = candidates.html.filter(|h| !h.is_empty());
        if let Some(html) = html.as_deref()
            && html_enabled
        {
            let decoded = html_escape::decode_html_entities(html);
            let body = if self.policy.sanitize_html {
                ammonia::clean(&decoded)
            } else {
                decoded.into_owned()
            };
            return (body, true);
        }

        let plain = candidates.plain.unwrap_or_default();
        let source = if plain.trim().is_empty() {
            html.unwrap_or_default()
        } else {
            plain
        };
        (self.to_plain_text(&source), false)
    }

    /// Flatten markup to text: line breaks become `\r\n`, entities are
    /// decoded, tags are removed, outer whitespace is trimmed
    pub fn to_plain_text(&self, source: &str) -> String {
        let with_breaks = self.line_break.replace_all(source, "\r\n");
        let decoded = html_escape::decode_html_entities(&with_breaks);
        self.tag.replace_all(&decoded, "").trim().to_owned()
    }
}

/// Fill header fields the message left empty from the server envelope
fn fill_from_envelope(email: &mut Email, envelope: &EnvelopeSummary) {
    if email.from.is_empty() {
        email.from = envelope.from.join(", ");
    }
    if email.to.is_empty() {
        email.to = envelope.to.join(", ");
    }
    if email.subject.is_empty()
        && let Some(subject) = &envelope.subject
    {
        email.subject = subject.clone();
    }
    if email.date.is_none() {
        email.date = envelope.date.as_deref().and_then(parse_date);
    }
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    mailparse::dateparse(value)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
}

/// Join an address header as `a, b, c`; empty when absent or unparsable
fn address_header(parsed: &ParsedMail<'_>, name: &str) -> String {
    parsed
        .headers
        .get_first_header(name)
        .and_then(|header| mailparse::addrparse_header(header).ok())
        .map(format_address_list)
        .unwrap_or_default()
}

/// Render an address list, flattening groups into their members
pub fn format_address_list(list: MailAddrList) -> String {
    list.into_inner()
        .into_iter()
        .flat_map(|addr| match addr {
            MailAddr::Single(single) => vec![single],
            MailAddr::Group(group) => group.addrs,
        })
        .map(|single| match single.display_name {
            Some(name) if !name.trim().is_empty() => format!("{name} <{}>", single.addr),
            _ => single.addr,
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::{
        CandidateSelection, ContentNormalizer, DestinationContext, NormalizePolicy,
        PartCandidates, format_address_list,
    };
    use crate::errors::{AppError, AppResult};
    use crate::message::{BodySection, EnvelopeSummary, RawMessage};
    use crate::preference::{ConfiguredHtmlPreference, HtmlPreference};

    struct FailingPreference;

    impl HtmlPreference for FailingPreference {
        fn is_html_enabled(&self, _destination: &str) -> AppResult<bool> {
            Err(AppError::Internal("preference store unavailable".to_owned()))
        }
    }

    const ALTERNATIVE: &[u8] = b"From: Ada Lovelace <ada@example.com>\r\n\
To: bob@example.com, Carol <carol@example.com>\r\n\
Subject: Status\r\n\
Date: Wed, 1 Jan 2025 10:00:00 +0000\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Hi\r\n\
--b1\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Hi</p>\r\n\
--b1--\r\n";

    const WITH_ATTACHMENTS: &[u8] = b"From: ada@example.com\r\n\
Subject: Files\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"m1\"\r\n\
\r\n\
--m1\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"a.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0=\r\n\
--m1\r\n\
Content-Type: image/png\r\n\
Content-Disposition: attachment; filename=\"b.png\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
iVBORw==\r\n\
--m1--\r\n";

    fn normalizer() -> ContentNormalizer {
        ContentNormalizer::new(NormalizePolicy::default()).expect("patterns compile")
    }

    fn raw(body: &[u8]) -> RawMessage {
        RawMessage::new(1, BodySection::Full, Some(body.to_vec()))
    }

    fn destination<'a>(id: &'a str, pref: &'a dyn HtmlPreference) -> DestinationContext<'a> {
        DestinationContext {
            id,
            preference: pref,
        }
    }

    #[test]
    fn extracts_headers_and_joins_addresses() {
        let pref = ConfiguredHtmlPreference::default();
        let email = normalizer()
            .normalize(Some(&raw(ALTERNATIVE)), BodySection::Full, destination("room", &pref))
            .expect("normalized");

        assert_eq!(email.from, "Ada Lovelace <ada@example.com>");
        assert_eq!(email.to, "bob@example.com, Carol <carol@example.com>");
        assert_eq!(email.subject, "Status");
        assert_eq!(
            email.date.map(|d| d.to_rfc3339()),
            Some("2025-01-01T10:00:00+00:00".to_owned())
        );
    }

    #[test]
    fn html_enabled_destination_gets_html_body() {
        let pref = ConfiguredHtmlPreference::parse("room");
        let email = normalizer()
            .normalize(Some(&raw(ALTERNATIVE)), BodySection::Full, destination("room", &pref))
            .expect("normalized");

        assert!(email.html_format);
        assert_eq!(email.body.trim(), "<p>Hi</p>");
    }

    #[test]
    fn html_disabled_destination_gets_plain_body() {
        let pref = ConfiguredHtmlPreference::parse("other-room");
        let email = normalizer()
            .normalize(Some(&raw(ALTERNATIVE)), BodySection::Full, destination("room", &pref))
            .expect("normalized");

        assert!(!email.html_format);
        assert_eq!(email.body, "Hi");
    }

    #[test]
    fn preference_lookup_failure_falls_back_to_plain() {
        let email = normalizer()
            .normalize(
                Some(&raw(ALTERNATIVE)),
                BodySection::Full,
                destination("room", &FailingPreference),
            )
            .expect("normalized");

        assert!(!email.html_format);
        assert_eq!(email.body, "Hi");
    }

    #[test]
    fn select_body_prefers_html_when_enabled() {
        let candidates = PartCandidates {
            html: Some("<p>Hi</p>".to_owned()),
            plain: Some("Hi".to_owned()),
            attachment: String::new(),
        };
        let n = normalizer();
        assert_eq!(
            n.select_body(candidates.clone(), true),
            ("<p>Hi</p>".to_owned(), true)
        );
        assert_eq!(n.select_body(candidates, false), ("Hi".to_owned(), false));
    }

    #[test]
    fn html_only_message_falls_back_to_stripped_html() {
        let candidates = PartCandidates {
            html: Some("<br>line1<br>line2".to_owned()),
            plain: None,
            attachment: String::new(),
        };
        assert_eq!(
            normalizer().select_body(candidates, false),
            ("line1\r\nline2".to_owned(), false)
        );
    }

    #[test]
    fn blank_plain_candidate_falls_back_to_html_source() {
        let candidates = PartCandidates {
            html: Some("<b>bold</b> &amp; <i>brave</i>".to_owned()),
            plain: Some("   ".to_owned()),
            attachment: String::new(),
        };
        assert_eq!(
            normalizer().select_body(candidates, false),
            ("bold & brave".to_owned(), false)
        );
    }

    #[test]
    fn plain_text_strips_tags_and_decodes_entities() {
        let n = normalizer();
        assert_eq!(n.to_plain_text("<div>one<BR/>two</div>"), "one\r\ntwo");
        assert_eq!(n.to_plain_text("Tom &amp; Jerry<br />end"), "Tom & Jerry\r\nend");
    }

    #[test]
    fn html_enabled_body_has_entities_decoded() {
        let candidates = PartCandidates {
            html: Some("<p>caf&eacute;</p>".to_owned()),
            plain: None,
            attachment: String::new(),
        };
        assert_eq!(
            normalizer().select_body(candidates, true),
            ("<p>café</p>".to_owned(), true)
        );
    }

    #[test]
    fn sanitize_policy_cleans_html_body() {
        let n = ContentNormalizer::new(NormalizePolicy {
            sanitize_html: true,
            ..NormalizePolicy::default()
        })
        .expect("patterns compile");
        let candidates = PartCandidates {
            html: Some("<p onclick=\"x()\">Hi</p><script>alert(1)</script>".to_owned()),
            plain: None,
            attachment: String::new(),
        };
        let (body, html) = n.select_body(candidates, true);
        assert!(html);
        assert_eq!(body, "<p>Hi</p>");
    }

    #[test]
    fn accumulates_attachment_names_in_order() {
        let pref = ConfiguredHtmlPreference::default();
        let email = normalizer()
            .normalize(
                Some(&raw(WITH_ATTACHMENTS)),
                BodySection::Full,
                destination("room", &pref),
            )
            .expect("normalized");

        assert_eq!(email.attachment, "a.pdf\r\nb.png\r\n");
        assert_eq!(email.attachment_names().collect::<Vec<_>>(), ["a.pdf", "b.png"]);
        assert_eq!(email.body, "");
        assert!(!email.html_format);
    }

    #[test]
    fn missing_recipients_yield_empty_list() {
        let pref = ConfiguredHtmlPreference::default();
        let email = normalizer()
            .normalize(
                Some(&raw(WITH_ATTACHMENTS)),
                BodySection::Full,
                destination("room", &pref),
            )
            .expect("normalized");

        assert_eq!(email.to, "");
        assert_eq!(email.date, None);
    }

    #[test]
    fn envelope_fills_missing_headers() {
        let mut msg = raw(b"Content-Type: text/plain\r\n\r\nhello\r\n");
        msg.envelope = Some(EnvelopeSummary {
            date: None,
            subject: Some("From envelope".to_owned()),
            from: vec!["Ada <ada@example.com>".to_owned()],
            to: vec!["bob@example.com".to_owned(), "carol@example.com".to_owned()],
        });
        msg.internal_date = chrono::DateTime::parse_from_rfc3339("2025-03-04T05:06:07+02:00").ok();

        let pref = ConfiguredHtmlPreference::default();
        let email = normalizer()
            .normalize(Some(&msg), BodySection::Full, destination("room", &pref))
            .expect("normalized");
        assert_eq!(email.from, "Ada <ada@example.com>");
        assert_eq!(email.to, "bob@example.com, carol@example.com");
        assert_eq!(email.subject, "From envelope");
        assert_eq!(
            email.date.map(|d| d.to_rfc3339()),
            Some("2025-03-04T03:06:07+00:00".to_owned())
        );
        assert_eq!(email.body, "hello");
    }

    #[test]
    fn format_address_list_has_no_trailing_separator() {
        let list = mailparse::addrparse("a@example.com, b@example.com").expect("parse");
        assert_eq!(format_address_list(list), "a@example.com, b@example.com");

        let group = mailparse::addrparse("Team: x@example.com, y@example.com;").expect("parse");
        assert_eq!(format_address_list(group), "x@example.com, y@example.com");
    }

    #[test]
    fn unknown_inline_part_overrides_plain_by_default() {
        let raw_msg = b"Content-Type: multipart/mixed; boundary=\"u\"\r\n\
\r\n\
--u\r\n\
Content-Type: text/plain\r\n\
\r\n\
first\r\n\
--u\r\n\
Content-Type: text/calendar\r\n\
\r\n\
BEGIN:VCALENDAR\r\n\
--u--\r\n";
        let pref = ConfiguredHtmlPreference::default();
        let email = normalizer()
            .normalize(Some(&raw(raw_msg)), BodySection::Full, destination("room", &pref))
            .expect("normalized");
        assert_eq!(email.body, "BEGIN:VCALENDAR");

        let strict = ContentNormalizer::new(NormalizePolicy {
            unknown_inline_overrides_plain: false,
            ..NormalizePolicy::default()
        })
        .expect("patterns compile");
        let email = strict
            .normalize(Some(&raw(raw_msg)), BodySection::Full, destination("room", &pref))
            .expect("normalized");
        assert_eq!(email.body, "first");
    }

    #[test]
    fn embedded_image_without_disposition_is_an_attachment() {
        let raw_msg = b"Content-Type: multipart/related; boundary=\"r\"\r\n\
\r\n\
--r\r\n\
Content-Type: text/plain\r\n\
\r\n\
Hello there\r\n\
--r\r\n\
Content-Type: image/gif\r\n\
Content-ID: <logo@example.com>\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
R0lGODlhAQABAIAAAP///wAAACwAAAAAAQABAAACAkQBADs=\r\n\
--r--\r\n";
        let pref = ConfiguredHtmlPreference::default();
        let email = normalizer()
            .normalize(Some(&raw(raw_msg)), BodySection::Full, destination("room", &pref))
            .expect("normalized");

        assert_eq!(email.body, "Hello there");
        assert_eq!(email.attachment, "\r\n");
    }

    #[test]
    fn named_inline_image_is_an_attachment() {
        let raw_msg = b"Content-Type: multipart/mixed; boundary=\"i\"\r\n\
\r\n\
--i\r\n\
Content-Type: text/plain\r\n\
\r\n\
see logo\r\n\
--i\r\n\
Content-Type: image/png\r\n\
Content-Disposition: inline; filename=\"logo.png\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
iVBORw==\r\n\
--i--\r\n";
        let pref = ConfiguredHtmlPreference::default();
        let email = normalizer()
            .normalize(Some(&raw(raw_msg)), BodySection::Full, destination("room", &pref))
            .expect("normalized");

        assert_eq!(email.body, "see logo");
        assert_eq!(email.attachment, "logo.png\r\n");
    }

    #[test]
    fn unreadable_part_stops_walk_but_keeps_record() {
        let raw_msg = b"Subject: Broken\r\n\
Content-Type: multipart/mixed; boundary=\"p\"\r\n\
\r\n\
--p\r\n\
Content-Type: text/plain\r\n\
\r\n\
kept\r\n\
--p\r\n\
Content-Type: text/html\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
@@@@ not base64 @@@@\r\n\
--p\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"late.pdf\"\r\n\
\r\n\
%PDF\r\n\
--p--\r\n";
        let pref = ConfiguredHtmlPreference::parse("*");
        let email = normalizer()
            .normalize(Some(&raw(raw_msg)), BodySection::Full, destination("room", &pref))
            .expect("record is still produced");

        assert_eq!(email.subject, "Broken");
        assert_eq!(email.body, "kept");
        assert!(!email.html_format);
        assert_eq!(email.attachment, "");
    }

    #[test]
    fn first_wins_keeps_earliest_candidate() {
        let mut slot = None;
        CandidateSelection::FirstWins.offer(&mut slot, "a".to_owned());
        CandidateSelection::FirstWins.offer(&mut slot, "b".to_owned());
        assert_eq!(slot.as_deref(), Some("a"));

        let mut slot = None;
        CandidateSelection::LastWins.offer(&mut slot, "a".to_owned());
        CandidateSelection::LastWins.offer(&mut slot, "b".to_owned());
        assert_eq!(slot.as_deref(), Some("b"));
    }

    #[test]
    fn missing_message_or_body_is_skipped() {
        let pref = ConfiguredHtmlPreference::default();
        let n = normalizer();
        assert_eq!(n.normalize(None, BodySection::Full, destination("room", &pref)), None);

        let no_body = RawMessage::new(2, BodySection::Full, None);
        assert_eq!(
            n.normalize(Some(&no_body), BodySection::Full, destination("room", &pref)),
            None
        );
    }

    #[test]
    fn normalizing_twice_is_identical() {
        let pref = ConfiguredHtmlPreference::parse("*");
        let n = normalizer();
        let msg = raw(ALTERNATIVE);
        let first = n.normalize(Some(&msg), BodySection::Full, destination("room", &pref));
        let second = n.normalize(Some(&msg), BodySection::Full, destination("room", &pref));
        assert!(first.is_some());
        assert_eq!(first, second);
    }
}
