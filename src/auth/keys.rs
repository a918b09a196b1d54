// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ChattyCathy Contributors

//! RSA signing key management.
//!
//! ## Startup Behaviour
//!
//! 1. If both `JWT_PRIVATE_KEY` and `JWT_PUBLIC_KEY` are set, load the pair
//! 2. If loading fails for any reason (missing, unreadable, corrupt,
//!    mismatched), generate a fresh 2048-bit pair
//! 3. If paths are set, persist the new pair (private key `0600`)
//!
//! Only a failure of key generation itself is fatal. The resulting
//! [`SigningKeys`] is immutable and shared behind an `Arc`.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::{info, warn};

/// Modulus size for generated keys.
pub const RSA_KEY_BITS: usize = 2048;

/// Errors raised while preparing signing keys.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// Key generation failed (entropy source failure). Fatal at startup.
    #[error("failed to generate RSA key: {0}")]
    Generation(String),

    /// Key material could not be parsed or does not form a pair.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Key material could not be serialized.
    #[error("failed to encode key: {0}")]
    Encoding(String),

    #[error("key file I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Where the signing keys live on disk.
#[derive(Debug, Clone, Default)]
pub struct KeyConfig {
    pub private_key_path: Option<PathBuf>,
    pub public_key_path: Option<PathBuf>,
}

impl KeyConfig {
    /// Both paths, or `None` when either is unset.
    fn paths(&self) -> Option<(&Path, &Path)> {
        match (&self.private_key_path, &self.public_key_path) {
            (Some(private), Some(public)) => Some((private.as_path(), public.as_path())),
            _ => None,
        }
    }
}

/// How the active key pair was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrigin {
    Loaded,
    Generated,
}

/// The process-wide RS256 key pair.
#[derive(Clone)]
pub struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    public_pem: String,
    origin: KeyOrigin,
}

impl std::fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeys")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl SigningKeys {
    /// Load the configured pair, or generate (and persist) a new one.
    pub fn initialize(config: &KeyConfig) -> Result<Self, KeyError> {
        if let Some((private_path, public_path)) = config.paths() {
            match Self::load(private_path, public_path) {
                Ok(keys) => {
                    info!(path = %private_path.display(), "JWT signing keys loaded from files");
                    return Ok(keys);
                }
                Err(e) => {
                    warn!(error = %e, "JWT signing keys not usable, generating a new pair");
                }
            }
        }

        info!(bits = RSA_KEY_BITS, "Generating new RSA key pair for JWT");
        let private = generate_private_key()?;

        if let Some((private_path, public_path)) = config.paths() {
            if let Err(e) = persist(&private, private_path, public_path) {
                warn!(error = %e, "Failed to save JWT keys to files");
            }
        }

        Self::from_private(&private, KeyOrigin::Generated)
    }

    /// Generate an in-memory pair without touching the filesystem.
    pub fn generate() -> Result<Self, KeyError> {
        let private = generate_private_key()?;
        Self::from_private(&private, KeyOrigin::Generated)
    }

    /// Build from PEM text. Accepts PKCS#1 or PKCS#8 private keys and SPKI
    /// or PKCS#1 public keys, regardless of the PEM label.
    pub fn from_pem(private_pem: &str, public_pem: &str) -> Result<Self, KeyError> {
        let private = parse_private_key(private_pem)?;
        let public = parse_public_key(public_pem)?;
        if RsaPublicKey::from(&private) != public {
            return Err(KeyError::InvalidKey(
                "public key does not match private key".to_string(),
            ));
        }
        Self::from_private(&private, KeyOrigin::Loaded)
    }

    fn load(private_path: &Path, public_path: &Path) -> Result<Self, KeyError> {
        let private_pem = fs::read_to_string(private_path)?;
        let public_pem = fs::read_to_string(public_path)?;
        Self::from_pem(&private_pem, &public_pem)
    }

    fn from_private(private: &RsaPrivateKey, origin: KeyOrigin) -> Result<Self, KeyError> {
        let public = RsaPublicKey::from(private);
        let private_der = private
            .to_pkcs1_der()
            .map_err(|e| KeyError::Encoding(e.to_string()))?;
        let public_der = public
            .to_pkcs1_der()
            .map_err(|e| KeyError::Encoding(e.to_string()))?;
        let public_pem = public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyError::Encoding(e.to_string()))?;

        Ok(Self {
            encoding: EncodingKey::from_rsa_der(private_der.as_bytes()),
            decoding: DecodingKey::from_rsa_der(public_der.as_bytes()),
            public_pem,
            origin,
        })
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    /// Public key as an SPKI PEM, for verification by other services.
    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    pub fn origin(&self) -> KeyOrigin {
        self.origin
    }
}

fn generate_private_key() -> Result<RsaPrivateKey, KeyError> {
    RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS).map_err(|e| KeyError::Generation(e.to_string()))
}

fn parse_private_key(text: &str) -> Result<RsaPrivateKey, KeyError> {
    let block = pem::parse(text).map_err(|e| KeyError::InvalidKey(e.to_string()))?;
    RsaPrivateKey::from_pkcs1_der(block.contents())
        .or_else(|_| RsaPrivateKey::from_pkcs8_der(block.contents()))
        .map_err(|e| KeyError::InvalidKey(format!("private key: {e}")))
}

fn parse_public_key(text: &str) -> Result<RsaPublicKey, KeyError> {
    let block = pem::parse(text).map_err(|e| KeyError::InvalidKey(e.to_string()))?;
    RsaPublicKey::from_public_key_der(block.contents())
        .or_else(|_| RsaPublicKey::from_pkcs1_der(block.contents()))
        .map_err(|e| KeyError::InvalidKey(format!("public key: {e}")))
}

fn persist(private: &RsaPrivateKey, private_path: &Path, public_path: &Path) -> Result<(), KeyError> {
    let private_pem = private
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| KeyError::Encoding(e.to_string()))?;
    let public_pem = RsaPublicKey::from(private)
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| KeyError::Encoding(e.to_string()))?;

    write_key_file(private_path, private_pem.as_bytes(), 0o600)?;
    write_key_file(public_path, public_pem.as_bytes(), 0o644)?;
    Ok(())
}

fn write_key_file(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;

    // `mode` only applies when the file is created
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> KeyConfig {
        KeyConfig {
            private_key_path: Some(dir.path().join("keys/private.pem")),
            public_key_path: Some(dir.path().join("keys/public.pem")),
        }
    }

    #[test]
    fn generates_and_persists_when_files_missing() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let keys = SigningKeys::initialize(&config).unwrap();
        assert_eq!(keys.origin(), KeyOrigin::Generated);
        assert!(config.private_key_path.as_ref().unwrap().exists());
        assert!(config.public_key_path.as_ref().unwrap().exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(config.private_key_path.as_ref().unwrap())
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o077, 0, "private key must not be group/world accessible");
        }
    }

    #[test]
    fn second_start_loads_the_persisted_pair() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let first = SigningKeys::initialize(&config).unwrap();
        let second = SigningKeys::initialize(&config).unwrap();

        assert_eq!(second.origin(), KeyOrigin::Loaded);
        assert_eq!(first.public_key_pem(), second.public_key_pem());
    }

    #[test]
    fn corrupt_key_file_triggers_regeneration() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        fs::create_dir_all(dir.path().join("keys")).unwrap();
        fs::write(config.private_key_path.as_ref().unwrap(), "not a key").unwrap();
        fs::write(config.public_key_path.as_ref().unwrap(), "not a key").unwrap();

        let keys = SigningKeys::initialize(&config).unwrap();
        assert_eq!(keys.origin(), KeyOrigin::Generated);

        let reloaded = SigningKeys::initialize(&config).unwrap();
        assert_eq!(reloaded.origin(), KeyOrigin::Loaded);
    }

    #[test]
    fn without_paths_nothing_is_written() {
        let keys = SigningKeys::initialize(&KeyConfig::default()).unwrap();
        assert_eq!(keys.origin(), KeyOrigin::Generated);
        assert!(keys.public_key_pem().starts_with("-----BEGIN PUBLIC KEY-----"));
    }

    #[test]
    fn mismatched_pair_is_rejected() {
        let a = generate_private_key().unwrap();
        let b = generate_private_key().unwrap();
        let private_pem = a.to_pkcs1_pem(LineEnding::LF).unwrap();
        let public_pem = RsaPublicKey::from(&b).to_public_key_pem(LineEnding::LF).unwrap();

        let err = SigningKeys::from_pem(&private_pem, &public_pem).unwrap_err();
        assert!(matches!(err, KeyError::InvalidKey(_)));
    }

    #[test]
    fn accepts_spki_bytes_under_rsa_public_key_label() {
        let private = generate_private_key().unwrap();
        let private_pem = private.to_pkcs1_pem(LineEnding::LF).unwrap();
        let spki = RsaPublicKey::from(&private).to_public_key_der().unwrap();
        let public_pem = pem::encode(&pem::Pem::new("RSA PUBLIC KEY", spki.as_bytes().to_vec()));

        let keys = SigningKeys::from_pem(&private_pem, &public_pem).unwrap();
        assert_eq!(keys.origin(), KeyOrigin::Loaded);
    }
}
