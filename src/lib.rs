//! Version name normalization, Android version code encoding, and the
//! configuration and signing-secret plumbing around them.
//!
//! - [`codec`]: pure `normalize` / `encode` functions
//! - [`config`]: `ConfigProvider` trait, config file, raw version resolution
//! - [`secrets`]: signing secrets and self-wiping secret files

pub mod codec;
pub mod config;
pub mod secrets;

pub use codec::{
    CodecError, NormalizedVersion, VersionCode, compute_version_code, normalize,
    normalize_version_string,
};
pub use config::{ConfigProvider, EnvProvider, MapProvider};
