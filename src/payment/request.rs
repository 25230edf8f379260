//! Payment request wire format
//!
//! NUT-18 payment requests: a compact CBOR map `{a, u, m}` wrapped as
//! `"creqA" + base64url(bytes)` with no padding. This is a wire contract
//! shared with existing clients; the bytes must stay compatible.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::types::{ColloquyError, Result};

/// Textual prefix clients use to recognize an encoded payment request
pub const PAYMENT_REQUEST_PREFIX: &str = "creqA";

/// What a client must pay to be admitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub amount: u64,
    pub unit: String,
    pub mints: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct WirePayload {
    a: u64,
    u: String,
    m: Vec<WireMint>,
}

#[derive(Serialize, Deserialize)]
struct WireMint {
    u: String,
}

/// Encode a payment request for the `X-Cashu` response header.
pub fn encode_payment_request(amount: u64, unit: &str, mints: &[String]) -> Result<String> {
    let payload = WirePayload {
        a: amount,
        u: unit.to_string(),
        m: mints.iter().map(|u| WireMint { u: u.clone() }).collect(),
    };
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&payload, &mut bytes)
        .map_err(|e| ColloquyError::Serialize(e.to_string()))?;
    Ok(format!("{PAYMENT_REQUEST_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes)))
}

/// Decode an encoded payment request (client side and tests).
pub fn decode_payment_request(encoded: &str) -> Result<PaymentRequest> {
    let b64 = encoded
        .strip_prefix(PAYMENT_REQUEST_PREFIX)
        .ok_or_else(|| ColloquyError::Validation("missing payment request prefix".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(b64)
        .map_err(|e| ColloquyError::Validation(format!("bad payment request encoding: {e}")))?;
    let payload: WirePayload = ciborium::de::from_reader(bytes.as_slice())
        .map_err(|e| ColloquyError::Validation(format!("bad payment request payload: {e}")))?;
    Ok(PaymentRequest {
        amount: payload.a,
        unit: payload.u,
        mints: payload.m.into_iter().map(|m| m.u).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_prefix_and_round_trips() {
        let mints = vec!["https://mint.example.com".to_string()];
        let encoded = encode_payment_request(100, "sat", &mints).unwrap();

        assert!(encoded.starts_with(PAYMENT_REQUEST_PREFIX));
        assert!(!encoded.contains('='));

        let decoded = decode_payment_request(&encoded).unwrap();
        assert_eq!(decoded.amount, 100);
        assert_eq!(decoded.unit, "sat");
        assert_eq!(decoded.mints, mints);
    }

    #[test]
    fn encodes_multiple_mints() {
        let mints = vec![
            "https://mint1.example.com".to_string(),
            "https://mint2.example.com".to_string(),
        ];
        let encoded = encode_payment_request(50, "sat", &mints).unwrap();
        let decoded = decode_payment_request(&encoded).unwrap();
        assert_eq!(decoded.mints.len(), 2);
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_payment_request("garbage").is_err());
        assert!(decode_payment_request("creqA!!!not-base64!!!").is_err());
    }
}
