//! TLS ClientHello SNI extraction and DNS QNAME extraction.
//!
//! Both parsers use an explicit-bounds-check, `Option`-returning style
//! rather than a general TLS/DNS library: a narrow, allocation-frugal
//! byte walk is enough for pulling a hostname out of a handshake or
//! query, not a conformant protocol stack.

/// Extract the SNI hostname from a TLS ClientHello record, per §4.5.5.
/// Every bounds check is explicit; any failure returns `None`.
pub fn extract_sni(payload: &[u8]) -> Option<String> {
    if payload.len() < 50 {
        return None;
    }
    if payload[0] != 0x16 || payload[5] != 0x01 {
        return None;
    }

    let mut cursor = 43usize;

    // Session ID: 1 length byte + body.
    let session_id_len = *payload.get(cursor)? as usize;
    cursor = cursor.checked_add(1)?.checked_add(session_id_len)?;

    // Cipher suites: 2 length bytes + body.
    let cipher_suites_len = read_u16(payload, cursor)? as usize;
    cursor = cursor.checked_add(2)?.checked_add(cipher_suites_len)?;

    // Compression methods: 1 length byte + body.
    let compression_len = *payload.get(cursor)? as usize;
    cursor = cursor.checked_add(1)?.checked_add(compression_len)?;

    // Extensions length.
    let extensions_len = read_u16(payload, cursor)? as usize;
    cursor = cursor.checked_add(2)?;
    let extensions_end = cursor.checked_add(extensions_len)?;
    if extensions_end > payload.len() {
        return None;
    }

    while cursor + 4 <= extensions_end {
        let ext_type = read_u16(payload, cursor)?;
        let ext_len = read_u16(payload, cursor + 2)? as usize;
        let ext_body_start = cursor + 4;
        let ext_body_end = ext_body_start.checked_add(ext_len)?;
        if ext_body_end > extensions_end {
            return None;
        }

        if ext_type == 0x0000 {
            return parse_sni_extension(&payload[ext_body_start..ext_body_end]);
        }

        cursor = ext_body_end;
    }

    None
}

fn parse_sni_extension(body: &[u8]) -> Option<String> {
    // SNI list length (2), SNI type (1, expect 0x00 = host_name), hostname
    // length (2), hostname bytes.
    let _list_len = read_u16(body, 0)?;
    let sni_type = *body.get(2)?;
    if sni_type != 0x00 {
        return None;
    }
    let name_len = read_u16(body, 3)? as usize;
    let name_start = 5usize;
    let name_end = name_start.checked_add(name_len)?;
    let bytes = body.get(name_start..name_end)?;
    String::from_utf8(bytes.to_vec()).ok()
}

fn read_u16(buf: &[u8], at: usize) -> Option<u16> {
    let b = buf.get(at..at + 2)?;
    Some(u16::from_be_bytes([b[0], b[1]]))
}

/// Returns `true` if `payload` looks like the start of a TLS ClientHello
/// record destined for the SNI extractor (§4.5.4 item 4).
pub fn looks_like_client_hello(payload: &[u8]) -> bool {
    payload.len() >= 6 && payload[0] == 0x16 && payload[5] == 0x01
}

/// Extract the QNAME of the first question in a DNS message, with the
/// trailing root dot stripped. Returns `None` on any malformed input.
pub fn extract_dns_qname(payload: &[u8]) -> Option<String> {
    // Header is 12 bytes; QDCOUNT at offset 4-5.
    if payload.len() < 12 {
        return None;
    }
    let qdcount = read_u16(payload, 4)?;
    if qdcount == 0 {
        return None;
    }

    let mut cursor = 12usize;
    let mut labels = Vec::new();
    loop {
        let len = *payload.get(cursor)? as usize;
        if len == 0 {
            cursor += 1;
            break;
        }
        // Compression pointers are not expected in the question section of
        // a query; treat one as malformed rather than following it.
        if len & 0xC0 != 0 {
            return None;
        }
        cursor += 1;
        let label = payload.get(cursor..cursor + len)?;
        labels.push(String::from_utf8_lossy(label).into_owned());
        cursor += len;
    }

    if labels.is_empty() {
        return None;
    }
    Some(labels.join("."))
}
