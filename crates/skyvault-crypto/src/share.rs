//! Share-link secrets
//!
//! A share link hands a recipient everything needed to decrypt one object
//! without ever contacting the server with key material: the unwrapped DEK,
//! the content base IV, and the encrypted filename with its IV. The bundle
//! travels exclusively in the URL fragment (after `#`), which HTTP clients
//! and browsers do not transmit, so a server that logs URLs never sees it.
//!
//! The fragment is a versionless minimal ABI: exactly four base64url fields
//! joined by `.`, in fixed order `DEK.cipherIv.metaNameEnc.metaNameIv`. Any
//! format change needs a new delimiter scheme or an explicit version tag —
//! silently reinterpreting old links is not an option.

use crate::{
    keys::DekKey,
    symmetric::Nonce,
    CryptoError, Result,
};
use base64::Engine;

/// Field delimiter inside the fragment
pub const FRAGMENT_DELIMITER: char = '.';

/// Number of fields a well-formed fragment carries
pub const FRAGMENT_FIELDS: usize = 4;

fn b64() -> base64::engine::general_purpose::GeneralPurpose {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
}

/// The out-of-band secret carried by a share link
#[derive(Clone)]
pub struct ShareSecret {
    /// The object's DEK, already unwrapped
    pub dek: DekKey,
    /// Base IV for content decryption
    pub cipher_iv: Nonce,
    /// Encrypted filename
    pub meta_name_enc: Vec<u8>,
    /// IV of the filename encryption
    pub meta_name_iv: Nonce,
}

impl std::fmt::Debug for ShareSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The DEK must not leak through logs
        f.debug_struct("ShareSecret")
            .field("dek", &"..")
            .field("cipher_iv", &self.cipher_iv)
            .finish_non_exhaustive()
    }
}

impl ShareSecret {
    /// Encode as a URL-fragment string.
    ///
    /// The caller appends this after `#` in the share URL and never attaches
    /// it to any outgoing request.
    pub fn export(&self) -> String {
        [
            self.dek.to_base64url(),
            self.cipher_iv.to_base64url(),
            b64().encode(&self.meta_name_enc),
            self.meta_name_iv.to_base64url(),
        ]
        .join(&FRAGMENT_DELIMITER.to_string())
    }

    /// Parse a fragment string, failing closed.
    ///
    /// Wrong field count, undecodable base64, or wrong key/nonce lengths all
    /// reject the whole fragment — a missing `metaNameIv` is never treated
    /// as "unencrypted filename".
    pub fn import(fragment: &str) -> Result<Self> {
        let fields: Vec<&str> = fragment.split(FRAGMENT_DELIMITER).collect();
        if fields.len() != FRAGMENT_FIELDS {
            return Err(CryptoError::MalformedShareLink(format!(
                "expected {} fields, got {}",
                FRAGMENT_FIELDS,
                fields.len()
            )));
        }
        if fields.iter().any(|f| f.is_empty()) {
            return Err(CryptoError::MalformedShareLink(
                "empty field in share fragment".to_string(),
            ));
        }

        let dek = DekKey::from_base64url(fields[0])
            .map_err(|e| CryptoError::MalformedShareLink(format!("bad key field: {e}")))?;
        let cipher_iv = Nonce::from_base64url(fields[1])
            .map_err(|e| CryptoError::MalformedShareLink(format!("bad content IV field: {e}")))?;
        let meta_name_enc = b64()
            .decode(fields[2])
            .map_err(|e| CryptoError::MalformedShareLink(format!("bad name field: {e}")))?;
        let meta_name_iv = Nonce::from_base64url(fields[3])
            .map_err(|e| CryptoError::MalformedShareLink(format!("bad name IV field: {e}")))?;

        Ok(Self {
            dek,
            cipher_iv,
            meta_name_enc,
            meta_name_iv,
        })
    }
}

/// Append a fragment to a share URL
pub fn append_fragment(url: &str, fragment: &str) -> String {
    format!("{}#{}", url.trim_end_matches('#'), fragment)
}

/// Split a full share link into its server-visible part and the fragment.
/// Returns `None` for the fragment when the link has none — the caller must
/// treat that as "decryption key missing", not as an unencrypted object.
pub fn split_fragment(link: &str) -> (&str, Option<&str>) {
    match link.split_once('#') {
        Some((base, fragment)) if !fragment.is_empty() => (base, Some(fragment)),
        Some((base, _)) => (base, None),
        None => (link, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_secret() -> ShareSecret {
        ShareSecret {
            dek: DekKey::generate(),
            cipher_iv: Nonce::generate(),
            meta_name_enc: vec![1, 2, 3, 4, 5, 6, 7, 8],
            meta_name_iv: Nonce::generate(),
        }
    }

    #[test]
    fn test_fragment_roundtrip() {
        let secret = sample_secret();
        let fragment = secret.export();
        let parsed = ShareSecret::import(&fragment).unwrap();

        assert_eq!(secret.dek.as_bytes(), parsed.dek.as_bytes());
        assert_eq!(secret.cipher_iv, parsed.cipher_iv);
        assert_eq!(secret.meta_name_enc, parsed.meta_name_enc);
        assert_eq!(secret.meta_name_iv, parsed.meta_name_iv);
    }

    #[test]
    fn test_fragment_is_url_safe() {
        for _ in 0..10 {
            let fragment = sample_secret().export();
            assert!(!fragment.contains('+'));
            assert!(!fragment.contains('/'));
            assert!(!fragment.contains('='));
            assert!(!fragment.contains('#'));
            assert_eq!(fragment.matches(FRAGMENT_DELIMITER).count(), 3);
        }
    }

    #[test]
    fn test_three_fields_rejected() {
        let secret = sample_secret();
        let fragment = secret.export();
        let truncated = fragment.rsplit_once(FRAGMENT_DELIMITER).unwrap().0;

        let err = ShareSecret::import(truncated).unwrap_err();
        assert!(matches!(err, CryptoError::MalformedShareLink(_)));
    }

    #[test]
    fn test_five_fields_rejected() {
        let fragment = format!("{}.extra", sample_secret().export());
        let err = ShareSecret::import(&fragment).unwrap_err();
        assert!(matches!(err, CryptoError::MalformedShareLink(_)));
    }

    #[test]
    fn test_empty_field_rejected() {
        let secret = sample_secret();
        let mut fields: Vec<String> = secret
            .export()
            .split(FRAGMENT_DELIMITER)
            .map(str::to_string)
            .collect();
        fields[3] = String::new(); // drop the name IV
        let err = ShareSecret::import(&fields.join(".")).unwrap_err();
        assert!(matches!(err, CryptoError::MalformedShareLink(_)));
    }

    #[test]
    fn test_bad_base64_rejected() {
        let secret = sample_secret();
        let mut fields: Vec<String> = secret
            .export()
            .split(FRAGMENT_DELIMITER)
            .map(str::to_string)
            .collect();
        fields[0] = "!!!not-base64!!!".to_string();
        let err = ShareSecret::import(&fields.join(".")).unwrap_err();
        assert!(matches!(err, CryptoError::MalformedShareLink(_)));
    }

    #[test]
    fn test_wrong_key_length_rejected() {
        let secret = sample_secret();
        let mut fields: Vec<String> = secret
            .export()
            .split(FRAGMENT_DELIMITER)
            .map(str::to_string)
            .collect();
        fields[0] = b64().encode([0u8; 16]); // 128-bit key is not a DEK
        let err = ShareSecret::import(&fields.join(".")).unwrap_err();
        assert!(matches!(err, CryptoError::MalformedShareLink(_)));
    }

    #[test]
    fn test_append_and_split_fragment() {
        let link = append_fragment("https://app.example/t/abc123", "a.b.c.d");
        assert_eq!(link, "https://app.example/t/abc123#a.b.c.d");

        let (base, fragment) = split_fragment(&link);
        assert_eq!(base, "https://app.example/t/abc123");
        assert_eq!(fragment, Some("a.b.c.d"));

        assert_eq!(split_fragment("https://app.example/t/abc123"), ("https://app.example/t/abc123", None));
        assert_eq!(split_fragment("https://app.example/t/abc123#"), ("https://app.example/t/abc123", None));
    }

    #[test]
    fn test_fragment_recipient_decrypts_without_master_key() {
        use crate::chunked::DEFAULT_CHUNK_SIZE;
        use crate::envelope::{open_with_dek, seal, unwrap_dek};
        use crate::keys::MasterKey;
        use crate::symmetric::AeadCipher;

        let mk = MasterKey::from_bytes(&[0x2c; 32]).unwrap();
        let sealed = seal(
            b"fragment-only content",
            "shared.txt",
            None,
            &mk,
            AeadCipher::Aes256Gcm,
            DEFAULT_CHUNK_SIZE,
        )
        .unwrap();

        // Owner side: unwrap the DEK and export the fragment
        let dek = unwrap_dek(&sealed.envelope.edek, &sealed.envelope.edek_iv, &mk).unwrap();
        let secret = ShareSecret {
            dek,
            cipher_iv: sealed.envelope.enc_meta.base_iv().clone(),
            meta_name_enc: sealed.envelope.meta_name_enc.clone(),
            meta_name_iv: sealed.envelope.meta_name_iv.clone(),
        };
        let fragment = secret.export();

        // Recipient side: only the fragment and the stored object
        let recovered = ShareSecret::import(&fragment).unwrap();
        let opened = open_with_dek(&sealed.envelope, &sealed.ciphertext, &recovered.dek).unwrap();
        assert_eq!(opened.data, b"fragment-only content");
        assert_eq!(opened.name, "shared.txt");
    }

    #[test]
    fn test_debug_redacts_dek() {
        let secret = sample_secret();
        let debug = format!("{:?}", secret);
        assert!(!debug.contains(&secret.dek.to_base64url()));
    }
}
