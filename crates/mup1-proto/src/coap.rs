//! CoAP (RFC 7252) message builder/parser, restricted to the option subset
//! {Uri-Path, Content-Format, Uri-Query} that CORECONF needs.
//!
//! No observation, no block-wise transfer, no token-based correlation —
//! every request this core builds carries Token-Length 0 and is matched to
//! its response purely by message ID.

use thiserror::Error;

use crate::value::CborValue;

/// Content-Format value for `application/yang-data+cbor` (RFC 9254).
const CONTENT_FORMAT_CORECONF: u16 = 260;

/// Uri-Path option number.
const OPT_URI_PATH: u16 = 11;
/// Content-Format option number.
const OPT_CONTENT_FORMAT: u16 = 12;
/// Uri-Query option number.
const OPT_URI_QUERY: u16 = 15;

/// Marks the start of the payload in a CoAP message.
pub const PAYLOAD_MARKER: u8 = 0xFF;

/// CoAP method code, restricted to the methods CORECONF uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoapMethod {
    /// GET (1).
    Get,
    /// POST (2).
    Post,
    /// PUT (3).
    Put,
    /// DELETE (4).
    Delete,
    /// FETCH (5), RFC 8132.
    Fetch,
    /// PATCH (6), RFC 8132.
    Patch,
    /// iPATCH (7), RFC 8132.
    Ipatch,
}

impl CoapMethod {
    /// Wire code for this method.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::Get => 1,
            Self::Post => 2,
            Self::Put => 3,
            Self::Delete => 4,
            Self::Fetch => 5,
            Self::Patch => 6,
            Self::Ipatch => 7,
        }
    }
}

impl TryFrom<u8> for CoapMethod {
    type Error = UnknownMethod;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Get),
            2 => Ok(Self::Post),
            3 => Ok(Self::Put),
            4 => Ok(Self::Delete),
            5 => Ok(Self::Fetch),
            6 => Ok(Self::Patch),
            7 => Ok(Self::Ipatch),
            other => Err(UnknownMethod(other)),
        }
    }
}

/// A method code with no known [`CoapMethod`] mapping.
///
/// This is a caller error at send time: it surfaces synchronously rather
/// than through the request tracker.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unknown CoAP method code {0}")]
pub struct UnknownMethod(pub u8);

/// CoAP message type (the 2-bit `Type` header field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoapMessageType {
    /// Confirmable (0) — expects an ACK. This core sends only this type.
    Confirmable,
    /// Non-confirmable (1).
    NonConfirmable,
    /// Acknowledgement (2).
    Acknowledgement,
    /// Reset (3).
    Reset,
}

impl CoapMessageType {
    const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Confirmable,
            1 => Self::NonConfirmable,
            2 => Self::Acknowledgement,
            _ => Self::Reset,
        }
    }
}

/// CoAP-layer errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoapError {
    /// Buffer shorter than the 4-byte header.
    #[error("CoAP message too short")]
    MessageTooShort,
}

/// A payload extracted from a parsed CoAP message.
#[derive(Debug, Clone, PartialEq)]
pub enum CoapPayload {
    /// No payload marker was present.
    None,
    /// Payload bytes decoded as CBOR.
    Cbor(CborValue),
    /// Payload bytes present but not valid CBOR; returned raw.
    Raw(Vec<u8>),
}

/// A parsed CoAP message.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCoap {
    /// Always 1.
    pub version: u8,
    /// Message type.
    pub message_type: CoapMessageType,
    /// Response (or request) code.
    pub code: u8,
    /// Message ID, the sole correlation key this core uses.
    pub message_id: u16,
    /// Extracted payload, if any.
    pub payload: CoapPayload,
}

impl ParsedCoap {
    /// `code >> 5`: 2 for success, 4 for client error, 5 for server error.
    #[must_use]
    pub const fn code_class(&self) -> u8 {
        self.code >> 5
    }

    /// `"C.DD"` formatted code, e.g. code 69 → `"2.05"`.
    #[must_use]
    pub fn code_name(&self) -> String {
        format!("{}.{:02}", self.code >> 5, self.code & 0x1F)
    }
}

/// Build a CoAP request message.
///
/// `uri` is split on the first `?` into a path (slash-separated segments,
/// empty segments discarded) and a query (ampersand-separated items, empty
/// items discarded). Every request carries Content-Format 260
/// (`application/yang-data+cbor`) regardless of method or payload presence.
#[must_use]
pub fn build(method: CoapMethod, uri: &str, payload: Option<&[u8]>, message_id: u16) -> Vec<u8> {
    let (path, query) = match uri.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (uri, None),
    };
    let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();
    let query_items: Vec<&str> =
        query.map(|query| query.split('&').filter(|item| !item.is_empty()).collect()).unwrap_or_default();

    let mut buf = Vec::with_capacity(4 + segments.iter().map(|segment| segment.len() + 2).sum::<usize>() + 16);

    // Version=1, Type=Confirmable(0), Token-Length=0.
    buf.push(0b0100_0000);
    buf.push(method.to_u8());
    buf.extend_from_slice(&message_id.to_be_bytes());

    let mut current_option = 0u16;
    for segment in &segments {
        push_option(&mut buf, &mut current_option, OPT_URI_PATH, segment.as_bytes());
    }
    push_option(&mut buf, &mut current_option, OPT_CONTENT_FORMAT, &CONTENT_FORMAT_CORECONF.to_be_bytes());
    for item in &query_items {
        push_option(&mut buf, &mut current_option, OPT_URI_QUERY, item.as_bytes());
    }

    if let Some(payload) = payload {
        buf.push(PAYLOAD_MARKER);
        buf.extend_from_slice(payload);
    }

    buf
}

/// Append one option TLV to `buf`, updating `current_option` to this
/// option's absolute number.
fn push_option(buf: &mut Vec<u8>, current_option: &mut u16, number: u16, value: &[u8]) {
    let delta = number - *current_option;
    *current_option = number;

    let (delta_nibble, delta_ext) = split_extended(delta);
    #[allow(clippy::cast_possible_truncation)]
    let (length_nibble, length_ext) = split_extended(value.len() as u16);

    buf.push((delta_nibble << 4) | length_nibble);
    buf.extend_from_slice(&delta_ext);
    buf.extend_from_slice(&length_ext);
    buf.extend_from_slice(value);
}

/// Split a delta or length value into its nibble and extended-form bytes,
/// per the RFC 7252 option header encoding (base/13/14 extension).
fn split_extended(value: u16) -> (u8, Vec<u8>) {
    if value < 13 {
        #[allow(clippy::cast_possible_truncation)]
        (value as u8, Vec::new())
    } else if value < 269 {
        #[allow(clippy::cast_possible_truncation)]
        (13, vec![(value - 13) as u8])
    } else {
        (14, (value - 269).to_be_bytes().to_vec())
    }
}

/// Parse a CoAP message.
///
/// Options are skipped structurally (not decoded) since this core only
/// needs the response code and payload.
///
/// # Errors
///
/// [`CoapError::MessageTooShort`] if `bytes` is shorter than the 4-byte
/// header, or truncated before the token.
pub fn parse(bytes: &[u8]) -> Result<ParsedCoap, CoapError> {
    if bytes.len() < 4 {
        return Err(CoapError::MessageTooShort);
    }

    let version = bytes[0] >> 6;
    let message_type = CoapMessageType::from_bits(bytes[0] >> 4);
    let token_length = usize::from(bytes[0] & 0x0F);
    let code = bytes[1];
    let message_id = u16::from_be_bytes([bytes[2], bytes[3]]);

    let mut i = 4 + token_length;
    if i > bytes.len() {
        return Err(CoapError::MessageTooShort);
    }

    while i < bytes.len() {
        if bytes[i] == PAYLOAD_MARKER {
            i += 1;
            break;
        }
        let header = bytes[i];
        i += 1;

        let delta_nibble = header >> 4;
        let length_nibble = header & 0x0F;

        i += match delta_nibble {
            13 | 14 => usize::from(delta_nibble) - 12,
            _ => 0,
        };

        let value_len = match length_nibble {
            13 => {
                let ext = *bytes.get(i).ok_or(CoapError::MessageTooShort)?;
                i += 1;
                usize::from(ext) + 13
            },
            14 => {
                let ext = bytes.get(i..i + 2).ok_or(CoapError::MessageTooShort)?;
                i += 2;
                usize::from(u16::from_be_bytes([ext[0], ext[1]])) + 269
            },
            other => usize::from(other),
        };
        i += value_len;
    }

    let payload = if i >= bytes.len() {
        CoapPayload::None
    } else {
        let raw = &bytes[i..];
        match ciborium::de::from_reader::<CborValue, _>(raw) {
            Ok(value) => CoapPayload::Cbor(value),
            Err(_) => CoapPayload::Raw(raw.to_vec()),
        }
    };

    Ok(ParsedCoap { version, message_type, code, message_id, payload })
}

// The option-ordering property test (property 5) lives in
// tests/coap_properties.rs, alongside the frame codec's property tests.

#[cfg(test)]
mod tests {
    use super::*;

    /// S2: `GET /c?d=a` with `MID=0x1234`, no payload.
    #[test]
    fn s2_build_get_with_path_and_query() {
        let built = build(CoapMethod::Get, "/c?d=a", None, 0x1234);

        assert_eq!(built[0], 0x40); // version=1, type=0, tkl=0
        assert_eq!(built[1], 1); // code=GET
        assert_eq!(&built[2..4], &[0x12, 0x34]);

        // Uri-Path "c": delta=11, length=1, value 0x63.
        assert_eq!(&built[4..6], &[(11 << 4) | 1, b'c']);
        // Content-Format: delta=1 (12-11), length=2, value 0x01 0x04.
        assert_eq!(&built[6..9], &[(1 << 4) | 2, 0x01, 0x04]);
        // Uri-Query "d=a": delta=3 (15-12), length=3, value "d=a".
        assert_eq!(&built[9..13], &[(3 << 4) | 3, b'd', b'=', b'a']);
        assert_eq!(built.len(), 13);
    }

    /// S3: parse a synthetic 2.05 Content response with a CBOR map payload.
    #[test]
    fn s3_parse_response_with_cbor_payload() {
        let mut cbor = Vec::new();
        let mut inner = std::collections::BTreeMap::new();
        inner.insert(
            CborValue::Text("ietf-interfaces:interfaces".into()),
            CborValue::Map(vec![(
                CborValue::Text("interface".into()),
                CborValue::Array(vec![CborValue::Map(vec![(
                    CborValue::Text("name".into()),
                    CborValue::Text("eth0".into()),
                )])]),
            )]),
        );
        let value = CborValue::Map(inner.into_iter().collect());
        ciborium::ser::into_writer(&value, &mut cbor).expect("serializes");

        let mut bytes = vec![0x60, 0x45, 0x12, 0x34, PAYLOAD_MARKER];
        bytes.extend_from_slice(&cbor);

        let parsed = parse(&bytes).expect("parses");
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.message_type, CoapMessageType::Acknowledgement);
        assert_eq!(parsed.code, 0x45);
        assert_eq!(parsed.message_id, 0x1234);
        assert_eq!(parsed.code_class(), 2);
        assert_eq!(parsed.code_name(), "2.05");
        assert_eq!(parsed.payload, CoapPayload::Cbor(value));
    }

    #[test]
    fn rejects_short_message() {
        assert_eq!(parse(&[0x40, 0x01, 0x00]), Err(CoapError::MessageTooShort));
    }

    #[test]
    fn unknown_method_code() {
        assert_eq!(CoapMethod::try_from(99), Err(UnknownMethod(99)));
    }

    #[test]
    fn code_name_formats_server_error() {
        let parsed = ParsedCoap {
            version: 1,
            message_type: CoapMessageType::Acknowledgement,
            code: 132,
            message_id: 0,
            payload: CoapPayload::None,
        };
        assert_eq!(parsed.code_name(), "4.04");
    }
}
