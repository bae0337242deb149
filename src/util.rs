use std::collections::BTreeSet;

/// Length in bytes of a SHA-256 digest.
pub const SHA256_DIGEST_LEN: usize = 32;

#[inline]
pub fn sha256(data: &[u8]) -> [u8; SHA256_DIGEST_LEN] {
    let digest = aws_lc_rs::digest::digest(&aws_lc_rs::digest::SHA256, data);
    let mut out = [0u8; SHA256_DIGEST_LEN];
    out.copy_from_slice(digest.as_ref());
    out
}

#[inline]
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// SHA-256 over `data`, rendered as 64 lowercase hex characters.
#[inline]
pub fn sha256_hex(data: &[u8]) -> String {
    to_hex(&sha256(data))
}

/// Parse SHA-256 fingerprints written as hex, with optional `:` separators
/// and whitespace (the format printed by `openssl x509 -fingerprint`).
pub fn process_fingerprints(
    fingerprints: &[String],
) -> std::io::Result<BTreeSet<[u8; SHA256_DIGEST_LEN]>> {
    let mut result = BTreeSet::new();

    for fingerprint in fingerprints {
        let clean_fp = fingerprint.replace([':', ' '], "");

        if clean_fp.len() != SHA256_DIGEST_LEN * 2 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "Invalid certificate fingerprint, expected {} hex chars: {}",
                    SHA256_DIGEST_LEN * 2,
                    fingerprint
                ),
            ));
        }

        let mut bytes = [0u8; SHA256_DIGEST_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = clean_fp
                .get(i * 2..i * 2 + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!(
                            "Invalid certificate fingerprint, could not convert to hex: {}",
                            fingerprint
                        ),
                    )
                })?;
        }

        result.insert(bytes);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(sha256_hex(b"abc").len(), 64);
    }

    #[test]
    fn test_process_fingerprints_accepts_colons_and_case() {
        let fp = "BA:78:16:BF:8F:01:CF:EA:41:41:40:DE:5D:AE:22:23:\
                  B0:03:61:A3:96:17:7A:9C:B4:10:FF:61:F2:00:15:AD"
            .to_string();
        let parsed = process_fingerprints(&[fp]).unwrap();
        assert!(parsed.contains(&sha256(b"abc")));
    }

    #[test]
    fn test_process_fingerprints_rejects_bad_input() {
        assert!(process_fingerprints(&["abcd".to_string()]).is_err());
        let not_hex = "zz".repeat(SHA256_DIGEST_LEN);
        assert!(process_fingerprints(&[not_hex]).is_err());
    }
}
