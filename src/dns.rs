//! DNS message parsing and construction.
//!
//! Implements the restricted RFC 1035 subset the proxy speaks: single
//! question, A records, compression pointers handled only far enough to
//! skip over names.

use std::net::Ipv4Addr;

const HEADER_LEN: usize = 12;
const MAX_LABEL_LEN: usize = 63;

/// QTYPE/RR type for an IPv4 host address.
pub const TYPE_A: u16 = 1;
/// QCLASS/RR class for Internet.
pub const CLASS_IN: u16 = 1;

/// Standard query, recursion desired.
const QUERY_FLAGS: u16 = 0x0100;
/// RCODE signalling a server-side resolution failure.
const RCODE_SERVFAIL: u8 = 2;
/// TTL stamped on synthesized answer records.
const ANSWER_TTL: u32 = 300;

/// A parsed DNS question.
#[derive(Debug, Clone)]
pub struct DnsQuestion {
    pub id: u16,
    pub hostname: String,
    pub qtype: u16,
    pub qclass: u16,
}

impl DnsQuestion {
    /// Parse the question section of a DNS query.
    ///
    /// Returns `None` for anything malformed: missing header, a label longer
    /// than 63 bytes, truncation mid-label, or a name with no labels at all.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_LEN + 1 {
            return None;
        }

        let id = u16::from_be_bytes([data[0], data[1]]);

        let mut pos = HEADER_LEN;
        let mut labels = Vec::new();

        while pos < data.len() {
            let label_len = data[pos] as usize;
            if label_len == 0 {
                pos += 1;
                break;
            }
            if label_len > MAX_LABEL_LEN {
                return None;
            }
            pos += 1;
            if pos + label_len > data.len() {
                return None;
            }
            let label = std::str::from_utf8(&data[pos..pos + label_len]).ok()?;
            labels.push(label.to_string());
            pos += label_len;
        }

        if labels.is_empty() {
            return None;
        }

        if pos + 4 > data.len() {
            return None;
        }
        let qtype = u16::from_be_bytes([data[pos], data[pos + 1]]);
        let qclass = u16::from_be_bytes([data[pos + 2], data[pos + 3]]);

        Some(Self {
            id,
            hostname: labels.join(".").to_lowercase(),
            qtype,
            qclass,
        })
    }
}

/// Encode an A-record query for `hostname` with a random transaction id.
///
/// Returns `None` if the hostname is empty or any label is empty, longer
/// than 63 bytes, or not ASCII.
pub fn encode_query(hostname: &str) -> Option<Vec<u8>> {
    if hostname.is_empty() {
        return None;
    }

    let mut data = Vec::with_capacity(HEADER_LEN + hostname.len() + 6);

    // Header
    let id: u16 = rand::random();
    data.extend_from_slice(&id.to_be_bytes());
    data.extend_from_slice(&QUERY_FLAGS.to_be_bytes());
    data.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    data.extend_from_slice(&[0x00, 0x00]); // ANCOUNT
    data.extend_from_slice(&[0x00, 0x00]); // NSCOUNT
    data.extend_from_slice(&[0x00, 0x00]); // ARCOUNT

    // Question
    for label in hostname.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN || !label.is_ascii() {
            return None;
        }
        data.push(label.len() as u8);
        data.extend_from_slice(label.as_bytes());
    }
    data.push(0);
    data.extend_from_slice(&TYPE_A.to_be_bytes());
    data.extend_from_slice(&CLASS_IN.to_be_bytes());

    Some(data)
}

/// Extract the IPv4 addresses from the answer section of a DNS response.
///
/// Best-effort: truncated or malformed input yields whatever answers were
/// parsed before the point of failure. Non-A records are skipped.
pub fn parse_response(data: &[u8]) -> Vec<Ipv4Addr> {
    let mut addrs = Vec::new();
    if data.len() < HEADER_LEN {
        return addrs;
    }

    let qdcount = u16::from_be_bytes([data[4], data[5]]) as usize;
    let ancount = u16::from_be_bytes([data[6], data[7]]) as usize;
    let mut pos = HEADER_LEN;

    // Skip question section
    for _ in 0..qdcount {
        let Some(after_name) = skip_name(data, pos) else {
            return addrs;
        };
        pos = after_name + 4; // QTYPE + QCLASS
        if pos > data.len() {
            return addrs;
        }
    }

    for _ in 0..ancount {
        let Some(after_name) = skip_name(data, pos) else {
            return addrs;
        };
        pos = after_name;
        if pos + 10 > data.len() {
            return addrs;
        }

        let rtype = u16::from_be_bytes([data[pos], data[pos + 1]]);
        let rdlength = u16::from_be_bytes([data[pos + 8], data[pos + 9]]) as usize;
        pos += 10; // TYPE + CLASS + TTL + RDLENGTH

        if pos + rdlength > data.len() {
            return addrs;
        }
        if rtype == TYPE_A && rdlength == 4 {
            addrs.push(Ipv4Addr::new(
                data[pos],
                data[pos + 1],
                data[pos + 2],
                data[pos + 3],
            ));
        }
        pos += rdlength;
    }

    addrs
}

/// Build a response to `query` answering with the given IPv4 addresses.
///
/// The original header and question section are copied; each answer uses a
/// compression pointer back to the question's name. IPv6 addresses cannot
/// be encoded here and must be filtered out by the caller.
pub fn synthesize_response(query: &[u8], addrs: &[Ipv4Addr]) -> Option<Vec<u8>> {
    let question_end = question_end(query)?;

    let mut data = Vec::with_capacity(question_end + addrs.len() * 16);
    data.extend_from_slice(&query[..question_end]);

    data[2] |= 0x80; // QR: response
    data[6..8].copy_from_slice(&(addrs.len() as u16).to_be_bytes());
    data[8..12].fill(0); // NSCOUNT, ARCOUNT

    for addr in addrs {
        data.extend_from_slice(&[0xC0, 0x0C]); // Pointer to offset 12
        data.extend_from_slice(&TYPE_A.to_be_bytes());
        data.extend_from_slice(&CLASS_IN.to_be_bytes());
        data.extend_from_slice(&ANSWER_TTL.to_be_bytes());
        data.extend_from_slice(&4u16.to_be_bytes());
        data.extend_from_slice(&addr.octets());
    }

    Some(data)
}

/// Build a SERVFAIL response by flipping the QR bit and RCODE on a copy of
/// the original query. Requires only an intact 12-byte header.
pub fn synthesize_servfail(query: &[u8]) -> Option<Vec<u8>> {
    if query.len() < HEADER_LEN {
        return None;
    }

    let mut data = query.to_vec();
    data[2] |= 0x80; // QR: response
    data[3] = (data[3] & 0xF0) | RCODE_SERVFAIL;
    data[6..12].fill(0); // ANCOUNT, NSCOUNT, ARCOUNT
    Some(data)
}

/// Skip over a (possibly compressed) name, returning the offset just past it.
///
/// A length byte with the two top bits set is a 2-byte compression pointer;
/// everything after it belongs to the next field.
fn skip_name(data: &[u8], mut pos: usize) -> Option<usize> {
    while pos < data.len() {
        let b = data[pos];
        if b == 0 {
            return Some(pos + 1);
        }
        if b >= 0xC0 {
            if pos + 2 > data.len() {
                return None;
            }
            return Some(pos + 2);
        }
        pos += 1 + b as usize;
    }
    None
}

/// Offset one past the question section (terminating zero label + QTYPE +
/// QCLASS) of a single-question message.
fn question_end(query: &[u8]) -> Option<usize> {
    if query.len() < HEADER_LEN {
        return None;
    }
    let after_name = skip_name(query, HEADER_LEN)?;
    let end = after_name + 4;
    if end > query.len() {
        return None;
    }
    Some(end)
}
