//! # Key Store Collaborator
//!
//! Settlement acts on behalf of parties, which means it needs their secret
//! keys at the moment a party takes a step: the seller decrypting a price,
//! the buyer ring-signing. The [`KeyStore`] trait is how it gets them.
//!
//! Two implementations:
//!
//! - [`MemoryKeyStore`]: a `DashMap`. Tests and single-process demos.
//! - [`FileKeyStore`]: one JSON file per party under a directory, mode
//!   `0600` on Unix. Loaded eagerly on open, written through on insert.
//!
//! Public material ([`PublicIdentity`]) is what other parties see. Secret
//! material ([`Party`]) never leaves the store except as an `Arc` handed to
//! the step that needs it.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::crypto::{derive_address, CurveKeypair, CurvePublicKey, SigningKeypair, SigningPublicKey};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("unknown party: {0}")]
    UnknownParty(String),

    #[error("party already registered: {0}")]
    Duplicate(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed key file {path}: {reason}")]
    Malformed { path: String, reason: String },
}

pub type KeyStoreResult<T> = Result<T, KeyStoreError>;

// ---------------------------------------------------------------------------
// Party / PublicIdentity
// ---------------------------------------------------------------------------

/// A party with its secrets.
#[derive(Clone)]
pub struct Party {
    pub name: String,
    pub cipher: CurveKeypair,
    pub signing: SigningKeypair,
}

/// What everyone else gets to know about a party.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIdentity {
    pub name: String,
    pub address: String,
    pub cipher_key: CurvePublicKey,
    pub verifying_key: SigningPublicKey,
}

impl Party {
    pub fn generate(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cipher: CurveKeypair::generate(),
            signing: SigningKeypair::generate(),
        }
    }

    pub fn address(&self) -> String {
        derive_address(&self.cipher.public_key(), &self.signing.public_key())
    }

    pub fn identity(&self) -> PublicIdentity {
        PublicIdentity {
            name: self.name.clone(),
            address: self.address(),
            cipher_key: self.cipher.public_key(),
            verifying_key: self.signing.public_key(),
        }
    }
}

impl fmt::Debug for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Party({}, {})", self.name, self.address())
    }
}

/// On-disk form of a party. Secret fields are hex.
#[derive(Serialize, Deserialize)]
struct PartyFile {
    name: String,
    address: String,
    cipher_secret: String,
    signing_seed: String,
}

impl PartyFile {
    fn from_party(party: &Party) -> Self {
        Self {
            name: party.name.clone(),
            address: party.address(),
            cipher_secret: hex::encode(party.cipher.secret_bytes()),
            signing_seed: hex::encode(party.signing.secret_bytes()),
        }
    }

    fn into_party(self) -> Result<Party, String> {
        let party = Party {
            name: self.name,
            cipher: CurveKeypair::from_hex(&self.cipher_secret).map_err(|e| e.to_string())?,
            signing: SigningKeypair::from_hex(&self.signing_seed).map_err(|e| e.to_string())?,
        };
        if party.address() != self.address {
            return Err("stored address does not match keys".to_string());
        }
        Ok(party)
    }
}

// ---------------------------------------------------------------------------
// KeyStore trait
// ---------------------------------------------------------------------------

pub trait KeyStore: Send + Sync {
    /// Secret handle for the party at `address`.
    fn party(&self, address: &str) -> KeyStoreResult<Arc<Party>>;

    /// Register a party. Returns its address.
    fn insert(&self, party: Party) -> KeyStoreResult<String>;

    /// Every registered party's public identity, sorted by name.
    fn identities(&self) -> Vec<PublicIdentity>;

    fn identity(&self, address: &str) -> KeyStoreResult<PublicIdentity> {
        Ok(self.party(address)?.identity())
    }

    fn find_by_name(&self, name: &str) -> Option<PublicIdentity> {
        self.identities().into_iter().find(|id| id.name == name)
    }
}

// ---------------------------------------------------------------------------
// MemoryKeyStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryKeyStore {
    parties: DashMap<String, Arc<Party>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_identities(parties: &DashMap<String, Arc<Party>>) -> Vec<PublicIdentity> {
    let mut ids: Vec<PublicIdentity> = parties.iter().map(|e| e.value().identity()).collect();
    ids.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.address.cmp(&b.address)));
    ids
}

impl KeyStore for MemoryKeyStore {
    fn party(&self, address: &str) -> KeyStoreResult<Arc<Party>> {
        self.parties
            .get(address)
            .map(|p| Arc::clone(p.value()))
            .ok_or_else(|| KeyStoreError::UnknownParty(address.to_string()))
    }

    fn insert(&self, party: Party) -> KeyStoreResult<String> {
        let address = party.address();
        if self.parties.contains_key(&address) {
            return Err(KeyStoreError::Duplicate(address));
        }
        self.parties.insert(address.clone(), Arc::new(party));
        Ok(address)
    }

    fn identities(&self) -> Vec<PublicIdentity> {
        sorted_identities(&self.parties)
    }
}

// ---------------------------------------------------------------------------
// FileKeyStore
// ---------------------------------------------------------------------------

/// A directory of `<address>.json` key files.
pub struct FileKeyStore {
    dir: PathBuf,
    parties: DashMap<String, Arc<Party>>,
}

impl FileKeyStore {
    /// Open (creating if needed) `dir` and load every key file in it.
    pub fn open<P: AsRef<Path>>(dir: P) -> KeyStoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let parties = DashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let malformed = |reason: String| KeyStoreError::Malformed {
                path: path.display().to_string(),
                reason,
            };
            let raw = std::fs::read(&path)?;
            let file: PartyFile =
                serde_json::from_slice(&raw).map_err(|e| malformed(e.to_string()))?;
            let party = file.into_party().map_err(malformed)?;
            parties.insert(party.address(), Arc::new(party));
        }
        info!(dir = %dir.display(), parties = parties.len(), "key store opened");
        Ok(Self { dir, parties })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_file(&self, party: &Party, address: &str) -> KeyStoreResult<()> {
        let path = self.dir.join(format!("{address}.json"));
        let body = serde_json::to_vec_pretty(&PartyFile::from_party(party)).map_err(|e| {
            KeyStoreError::Malformed {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;
        std::fs::write(&path, body)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl KeyStore for FileKeyStore {
    fn party(&self, address: &str) -> KeyStoreResult<Arc<Party>> {
        self.parties
            .get(address)
            .map(|p| Arc::clone(p.value()))
            .ok_or_else(|| KeyStoreError::UnknownParty(address.to_string()))
    }

    fn insert(&self, party: Party) -> KeyStoreResult<String> {
        let address = party.address();
        if self.parties.contains_key(&address) {
            return Err(KeyStoreError::Duplicate(address));
        }
        self.write_file(&party, &address)?;
        info!(name = %party.name, address = %address, "party registered");
        self.parties.insert(address.clone(), Arc::new(party));
        Ok(address)
    }

    fn identities(&self) -> Vec<PublicIdentity> {
        sorted_identities(&self.parties)
    }
}
