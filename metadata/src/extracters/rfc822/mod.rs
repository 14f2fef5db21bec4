use anyhow::Context;
use async_trait::async_trait;
use mail_parser::{HeaderValue, Message, MessageParser};

use identify::content::Content;
use identify::mimetype_map::MIMETYPE_RFC822;

use crate::extracter::RawExtracter;
use crate::mapping::MappingProperties;
use crate::value::{put_raw_value, RawMetadata, Value};

use self::formatter::AddressFormatter;

mod formatter;

/// Raw name of the sender.
pub const KEY_MESSAGE_FROM: &str = "messageFrom";
/// Raw name of the recipients.
pub const KEY_MESSAGE_TO: &str = "messageTo";
/// Raw name of the carbon copy recipients.
pub const KEY_MESSAGE_CC: &str = "messageCc";
/// Raw name of the subject.
pub const KEY_MESSAGE_SUBJECT: &str = "messageSubject";
/// Raw name of the date the message was sent.
pub const KEY_MESSAGE_SENT: &str = "messageSent";
/// Raw name of the date the message was last received.
pub const KEY_MESSAGE_RECEIVED: &str = "messageReceived";

/// Reads the headers of RFC 822 email messages.
///
/// Sender, recipients, subject and dates have their own raw names; every other header is available under its
/// header name, such as `Message-ID` or `Thread-Index`.
///
#[derive(Debug, Default)]
pub struct Rfc822MetadataExtracter {
    message_parser: MessageParser,
    formatter: AddressFormatter,
}

impl Rfc822MetadataExtracter {
    /// Create an extracter.
    ///
    pub fn new() -> Self {
        Self::default()
    }

    fn read_headers(&self, message: &Message) -> RawMetadata {
        let mut raw = RawMetadata::new();

        for header in message.headers() {
            let name = header.name();
            let key = match name.to_ascii_lowercase().as_str() {
                "from" => KEY_MESSAGE_FROM,
                "to" => KEY_MESSAGE_TO,
                "cc" => KEY_MESSAGE_CC,
                "subject" => KEY_MESSAGE_SUBJECT,
                "date" => KEY_MESSAGE_SENT,
                "received" => {
                    if !raw.contains_key(KEY_MESSAGE_RECEIVED) {
                        if let HeaderValue::Received(received) = header.value() {
                            if let Some(date) = &received.date {
                                put_raw_value(KEY_MESSAGE_RECEIVED, date.to_rfc3339(), &mut raw);
                            }
                        }
                    }
                    continue;
                }
                _ => name,
            };

            if let Some(value) = self.header_value(header.value()) {
                if !raw.contains_key(key) {
                    put_raw_value(key, value, &mut raw);
                }
            }
        }

        if let Some(Value::List(senders)) = raw.get(KEY_MESSAGE_FROM) {
            let sender = senders.first().cloned().unwrap_or(Value::Null);
            raw.insert(KEY_MESSAGE_FROM.to_string(), sender);
        }
        raw
    }

    fn header_value(&self, value: &HeaderValue) -> Option<Value> {
        let value = match value {
            HeaderValue::Address(address) => Value::from(self.formatter.format_addresses(address)),
            HeaderValue::Text(text) => Value::from(text.to_string()),
            HeaderValue::TextList(texts) => Value::from(texts.iter().map(|text| text.to_string()).collect::<Vec<_>>()),
            HeaderValue::DateTime(date_time) => Value::from(date_time.to_rfc3339()),
            _ => return None,
        };
        Some(value)
    }
}

#[async_trait]
impl RawExtracter for Rfc822MetadataExtracter {
    fn name(&self) -> &str {
        "extracter.RFC822"
    }

    fn supports_mimetype(&self, mimetype: &str) -> bool {
        mimetype == MIMETYPE_RFC822
    }

    fn default_mapping(&self) -> MappingProperties {
        MappingProperties::new([
            (KEY_MESSAGE_FROM, "imap:messageFrom, cm:originator"),
            (KEY_MESSAGE_TO, "imap:messageTo, cm:addressees"),
            (KEY_MESSAGE_CC, "imap:messageCc"),
            (KEY_MESSAGE_SUBJECT, "imap:messageSubject, cm:title, cm:subjectline"),
            (KEY_MESSAGE_SENT, "imap:dateSent, cm:sentdate"),
            (KEY_MESSAGE_RECEIVED, "imap:dateReceived"),
            ("Message-ID", "imap:messageId"),
            ("Thread-Index", "imap:threadIndex"),
        ])
    }

    async fn extract_raw(&self, content: &Content) -> Result<RawMetadata, anyhow::Error> {
        let bytes = tokio::fs::read(&content.path)
            .await
            .context("failed to read message")?;
        let message = self
            .message_parser
            .parse(&bytes)
            .context("failed to parse message")?;
        Ok(self.read_headers(&message))
    }
}
