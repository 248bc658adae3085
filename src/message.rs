use log::debug;
use mail_parser::{MessageParser, MimeHeaders, PartType};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt;

use crate::error::IngestError;

// RFC 3986 unreserved characters stay as they are
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Routing key carried in the subject line: `"<first name> <last name>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub first: String,
    pub last: String,
}

impl Identifier {
    /// Exactly two whitespace-separated tokens, anything else is rejected.
    pub fn from_subject(subject: &str) -> Option<Self> {
        let mut tokens = subject.split_whitespace();
        let first = tokens.next()?;
        let last = tokens.next()?;
        if tokens.next().is_some() {
            return None;
        }

        Some(Identifier {
            first: first.to_string(),
            last: last.to_string(),
        })
    }

    /// Path segments used by the directory, name and run services,
    /// each percent-encoded so non-ASCII names and `?`, `#`, `%`, `/` survive.
    pub fn url_path(&self) -> String {
        format!(
            "{}/{}",
            utf8_percent_encode(&self.first, PATH_SEGMENT),
            utf8_percent_encode(&self.last, PATH_SEGMENT)
        )
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.first, self.last)
    }
}

/// A body part whose Content-Disposition is `attachment`.
#[derive(Debug, Clone)]
pub struct AttachmentPart {
    /// 0-based index among attachment parts only
    pub position: usize,
    pub file_name: Option<String>,
    pub content: Vec<u8>,
}

#[derive(Debug)]
pub struct InboundMessage {
    pub subject: Option<String>,
    pub content_type: String,
    pub attachments: Vec<AttachmentPart>,
}

impl InboundMessage {
    pub fn parse(raw: &[u8]) -> Result<Self, IngestError> {
        let parsed = MessageParser::default()
            .parse(raw)
            .ok_or_else(|| IngestError::Malformed("message could not be parsed as MIME".to_string()))?;

        let root = parsed
            .parts
            .first()
            .ok_or_else(|| IngestError::Malformed("message has no body".to_string()))?;

        let content_type = root
            .content_type()
            .map(|ct| match ct.subtype() {
                Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
                None => ct.ctype().to_string(),
            })
            .unwrap_or_else(|| "text/plain".to_string())
            .to_ascii_lowercase();

        let mut attachments = Vec::new();

        // Only the top-level children count, a nested multipart is never an attachment
        if let PartType::Multipart(children) = &root.body {
            for (index, child) in children.iter().enumerate() {
                let Some(part) = parsed.parts.get(*child) else {
                    return Err(IngestError::Malformed(format!(
                        "multipart body references missing part {}",
                        child
                    )));
                };

                let is_attachment = part
                    .content_disposition()
                    .map(|disposition| disposition.ctype().eq_ignore_ascii_case("attachment"))
                    .unwrap_or(false);

                if !is_attachment {
                    debug!("Part {} is not an attachment, skipped", index);
                    continue;
                }

                attachments.push(AttachmentPart {
                    position: attachments.len(),
                    file_name: part.attachment_name().map(|name| name.to_string()),
                    content: part.contents().to_vec(),
                });
            }
        } else if content_type.starts_with("multipart/") {
            return Err(IngestError::Malformed(format!(
                "content type {} but the body is not decodable as multipart",
                content_type
            )));
        }

        Ok(InboundMessage {
            subject: parsed.subject().map(|s| s.to_string()),
            content_type,
            attachments,
        })
    }

    pub fn is_multipart(&self) -> bool {
        self.content_type.starts_with("multipart/")
    }

    pub fn identifier(&self) -> Result<Identifier, IngestError> {
        let subject = self
            .subject
            .as_deref()
            .ok_or_else(|| IngestError::Malformed("message has no subject".to_string()))?;

        Identifier::from_subject(subject).ok_or_else(|| {
            IngestError::Malformed(format!(
                "subject '{}' is not of the form '<first name> <last name>'",
                subject
            ))
        })
    }
}
