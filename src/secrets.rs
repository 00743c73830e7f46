//! Release-signing material
//!
//! Secrets are fetched from a [`ConfigProvider`], the keystore is written to
//! disk only for as long as a [`SecretFile`] guard lives, and the file is
//! overwritten with zeros before it is deleted.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, info, warn};

use crate::config::{
    ConfigProvider, DEFAULT_KEY_ALIAS_KEY, DEFAULT_KEY_PASSWORD_KEY, DEFAULT_STORE_PASSWORD_KEY,
    SigningConfig,
};

/// File name of the materialized keystore
pub const KEYSTORE_FILE_NAME: &str = "release.keystore";

/// Variable pointing the child command at the materialized keystore
pub const KEYSTORE_FILE_ENV: &str = "SIGNING_KEYSTORE_FILE";

#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
    #[error("Missing secret: {0}")]
    Missing(String),

    #[error("Secret {key} is not valid base64: {source}")]
    Decode {
        key: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Secret file error: {0}")]
    Io(#[from] io::Error),

    #[error("No command given")]
    NoCommand,

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Everything needed to sign a release
pub struct SigningSecrets {
    pub keystore: Vec<u8>,
    pub store_password: String,
    pub key_alias: String,
    pub key_password: String,
}

impl SigningSecrets {
    /// Fetch all signing values; any missing or blank one is an error.
    pub fn fetch(
        provider: &dyn ConfigProvider,
        config: &SigningConfig,
    ) -> Result<Self, SecretsError> {
        let encoded = required(provider, &config.keystore_key)?;
        let keystore = STANDARD
            .decode(encoded.trim())
            .map_err(|source| SecretsError::Decode {
                key: config.keystore_key.clone(),
                source,
            })?;

        let secrets = Self {
            keystore,
            store_password: required(provider, &config.store_password_key)?,
            key_alias: required(provider, &config.key_alias_key)?,
            key_password: required(provider, &config.key_password_key)?,
        };
        debug!(
            "Fetched signing secrets (keystore {} bytes)",
            secrets.keystore.len()
        );
        Ok(secrets)
    }
}

impl fmt::Debug for SigningSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningSecrets")
            .field("keystore", &format_args!("<{} bytes>", self.keystore.len()))
            .field("store_password", &"<redacted>")
            .field("key_alias", &"<redacted>")
            .field("key_password", &"<redacted>")
            .finish()
    }
}

fn required(provider: &dyn ConfigProvider, key: &str) -> Result<String, SecretsError> {
    provider
        .get(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| SecretsError::Missing(key.to_string()))
}

/// Secret bytes materialized on disk
///
/// The file is wiped (zero-filled, synced, removed) when the guard is dropped,
/// including during unwinding.
#[derive(Debug)]
pub struct SecretFile {
    path: PathBuf,
    len: u64,
    wiped: bool,
}

impl SecretFile {
    /// Create `dir/name` holding `bytes`. Fails if the file already exists.
    pub fn create(dir: &Path, name: &str, bytes: &[u8]) -> Result<Self, SecretsError> {
        let path = dir.join(name);
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&path)?;
        // From here on the guard owns the path, so a failed write still wipes it
        let mut guard = Self {
            path,
            len: 0,
            wiped: false,
        };
        file.write_all(bytes)?;
        file.sync_all()?;
        guard.len = bytes.len() as u64;

        info!("Materialized secret file {:?}", guard.path);
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the file with zeros and delete it.
    pub fn wipe(mut self) -> Result<(), SecretsError> {
        self.wipe_in_place()
    }

    fn wipe_in_place(&mut self) -> Result<(), SecretsError> {
        if self.wiped {
            return Ok(());
        }
        self.wiped = true;

        let overwrite = overwrite_with_zeros(&self.path, self.len);
        // Delete even when the overwrite failed
        let remove = std::fs::remove_file(&self.path);
        overwrite?;
        remove?;

        info!("Wiped secret file {:?}", self.path);
        Ok(())
    }
}

impl Drop for SecretFile {
    fn drop(&mut self) {
        if let Err(e) = self.wipe_in_place() {
            warn!("Failed to wipe secret file {:?}: {}", self.path, e);
        }
    }
}

/// Run `command` with the release keystore materialized in `dir`.
///
/// The child sees the keystore path in `SIGNING_KEYSTORE_FILE` and the signing
/// values under the default `SIGNING_*` names, whatever keys they were read
/// from. The keystore is wiped before returning, whether the child succeeded,
/// failed, or could not be started.
pub fn run_with_keystore(
    provider: &dyn ConfigProvider,
    config: &SigningConfig,
    dir: &Path,
    command: &[String],
) -> Result<ExitStatus, SecretsError> {
    let (program, args) = command.split_first().ok_or(SecretsError::NoCommand)?;
    let secrets = SigningSecrets::fetch(provider, config)?;
    let keystore = SecretFile::create(dir, KEYSTORE_FILE_NAME, &secrets.keystore)?;

    info!("Running {} with keystore {:?}", program, keystore.path());
    let status = Command::new(program)
        .args(args)
        .env(KEYSTORE_FILE_ENV, keystore.path())
        .env(DEFAULT_STORE_PASSWORD_KEY, &secrets.store_password)
        .env(DEFAULT_KEY_ALIAS_KEY, &secrets.key_alias)
        .env(DEFAULT_KEY_PASSWORD_KEY, &secrets.key_password)
        .status()
        .map_err(|source| SecretsError::Spawn {
            program: program.clone(),
            source,
        });

    keystore.wipe()?;
    let status = status?;
    info!("{} exited with {}", program, status);
    Ok(status)
}

fn overwrite_with_zeros(path: &Path, len: u64) -> io::Result<()> {
    const CHUNK: [u8; 4096] = [0; 4096];

    let mut file = OpenOptions::new().write(true).open(path)?;
    let len = len.max(file.metadata()?.len());
    file.seek(SeekFrom::Start(0))?;

    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(CHUNK.len() as u64) as usize;
        file.write_all(&CHUNK[..n])?;
        remaining -= n as u64;
    }
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapProvider;
    use std::panic::AssertUnwindSafe;
    use tempfile::TempDir;

    fn provider_with(keystore: &str) -> MapProvider {
        MapProvider::new()
            .with_value("SIGNING_KEYSTORE_BASE64", keystore)
            .with_value("SIGNING_STORE_PASSWORD", "store-pass")
            .with_value("SIGNING_KEY_ALIAS", "release")
            .with_value("SIGNING_KEY_PASSWORD", "key-pass")
    }

    #[test]
    fn fetch_decodes_keystore_and_reads_passwords() {
        let provider = provider_with(" a2V5c3RvcmU=\n");

        let secrets = SigningSecrets::fetch(&provider, &SigningConfig::default()).unwrap();

        assert_eq!(secrets.keystore, b"keystore");
        assert_eq!(secrets.store_password, "store-pass");
        assert_eq!(secrets.key_alias, "release");
        assert_eq!(secrets.key_password, "key-pass");
    }

    #[test]
    fn fetch_reports_missing_key() {
        let provider = MapProvider::new().with_value("SIGNING_KEYSTORE_BASE64", "a2V5c3RvcmU=");

        let err = SigningSecrets::fetch(&provider, &SigningConfig::default()).unwrap_err();

        assert!(matches!(err, SecretsError::Missing(ref key) if key == "SIGNING_STORE_PASSWORD"));
    }

    #[test]
    fn fetch_reports_invalid_base64() {
        let err = SigningSecrets::fetch(&provider_with("not base64!"), &SigningConfig::default())
            .unwrap_err();

        assert!(matches!(err, SecretsError::Decode { .. }));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let secrets =
            SigningSecrets::fetch(&provider_with("a2V5c3RvcmU="), &SigningConfig::default())
                .unwrap();

        let output = format!("{:?}", secrets);

        assert!(output.contains("<8 bytes>"));
        assert!(!output.contains("store-pass"));
        assert!(!output.contains("key-pass"));
    }

    #[test]
    fn secret_file_is_removed_on_drop() {
        let dir = TempDir::new().unwrap();

        let path = {
            let file = SecretFile::create(dir.path(), "release.jks", b"secret").unwrap();
            assert_eq!(std::fs::read(file.path()).unwrap(), b"secret");
            file.path().to_path_buf()
        };

        assert!(!path.exists());
    }

    #[test]
    fn secret_file_wipe_removes_file() {
        let dir = TempDir::new().unwrap();
        let file = SecretFile::create(dir.path(), "release.jks", b"secret").unwrap();
        let path = file.path().to_path_buf();

        file.wipe().unwrap();

        assert!(!path.exists());
    }

    #[test]
    fn secret_file_is_removed_when_consumer_panics() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("release.jks");

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let _file = SecretFile::create(dir.path(), "release.jks", b"secret").unwrap();
            panic!("signing failed");
        }));

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn secret_file_refuses_to_overwrite_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("release.jks");
        std::fs::write(&path, b"existing").unwrap();

        let err = SecretFile::create(dir.path(), "release.jks", b"secret").unwrap_err();

        assert!(matches!(err, SecretsError::Io(_)));
        assert_eq!(std::fs::read(&path).unwrap(), b"existing");
    }

    #[test]
    fn overwrite_with_zeros_clears_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, vec![0xAB; 5000]).unwrap();

        overwrite_with_zeros(&path, 5000).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![0; 5000]);
    }
}
