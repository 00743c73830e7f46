//! Version name normalization and version code encoding
//!
//! A version name such as `2.65.97-SNAPSHOT` is reduced to exactly three
//! dot-separated components and then packed into a single integer:
//!
//! ```text
//! major % 1000 * 1_000_000 + minor % 1000 * 1_000 + build % 1000
//! ```
//!
//! Examples:
//! - "2.65.97 feature/2681-bla-bla" -> "2.65.97" -> 2065097
//! - "2.6" -> "2.6.0" -> 2006000
//! - "2.2657.1912" -> "2.2657.1912" -> 2057912

use std::fmt;
use std::num::ParseIntError;
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;
use tracing::debug;

/// Number of components in a normalized version
pub const COMPONENT_COUNT: usize = 3;

/// Each component occupies three decimal digits of the version code
const COMPONENT_RADIX: u32 = 1_000;

/// Substituted for a computed code of 0, which build tools treat as unset
pub const FALLBACK_VERSION_CODE: VersionCode = 42;

/// Largest value `encode` can produce
pub const MAX_VERSION_CODE: VersionCode = 999_999_999;

/// Integer build ordinal derived from a version name
pub type VersionCode = u32;

static SUFFIX_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\s-]+").expect("suffix separator pattern is valid")
});

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Invalid version component '{component}': {source}")]
    InvalidComponent {
        component: String,
        #[source]
        source: ParseIntError,
    },
}

/// A version name reduced to exactly three components
///
/// Components are not validated here; a non-numeric component is only
/// rejected when the version is encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedVersion {
    components: [String; COMPONENT_COUNT],
}

impl NormalizedVersion {
    pub fn major(&self) -> &str {
        &self.components[0]
    }

    pub fn minor(&self) -> &str {
        &self.components[1]
    }

    pub fn build(&self) -> &str {
        &self.components[2]
    }

    pub fn components(&self) -> &[String; COMPONENT_COUNT] {
        &self.components
    }

    /// Converts to a semver version carrying the same values the version code does
    /// (each component reduced mod 1000).
    pub fn to_semver(&self) -> Result<Version, CodecError> {
        let [major, minor, build] = self.reduced_components()?;
        Ok(Version::new(major.into(), minor.into(), build.into()))
    }

    fn reduced_components(&self) -> Result<[u32; COMPONENT_COUNT], CodecError> {
        let mut reduced = [0; COMPONENT_COUNT];
        for (slot, component) in reduced.iter_mut().zip(&self.components) {
            *slot = reduce_component(component)?;
        }
        Ok(reduced)
    }
}

impl fmt::Display for NormalizedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join("."))
    }
}

/// Reduce a raw version name to exactly three components.
///
/// Only the first token before any whitespace or `-` is considered. Extra
/// components are dropped from the front, so "2.65.97.5" becomes "65.97.5";
/// missing ones are padded with "0" at the end.
pub fn normalize(raw: &str) -> NormalizedVersion {
    let payload = SUFFIX_SEPARATOR
        .split(raw.trim())
        .next()
        .unwrap_or_default();

    let mut parts: Vec<&str> = payload.split('.').collect();
    if parts.len() > COMPONENT_COUNT {
        parts.drain(..parts.len() - COMPONENT_COUNT);
    }

    let mut components: [String; COMPONENT_COUNT] = Default::default();
    for (index, slot) in components.iter_mut().enumerate() {
        *slot = parts.get(index).copied().unwrap_or("0").to_string();
    }

    let normalized = NormalizedVersion { components };
    debug!("Normalized version '{}' to '{}'", raw, normalized);
    normalized
}

/// Encode a normalized version into a version code.
///
/// Each component contributes its value mod 1000. A result of 0 is replaced
/// with [`FALLBACK_VERSION_CODE`].
pub fn encode(version: &NormalizedVersion) -> Result<VersionCode, CodecError> {
    let code = version
        .reduced_components()?
        .into_iter()
        .fold(0, |acc, component| acc * COMPONENT_RADIX + component);

    if code == 0 {
        Ok(FALLBACK_VERSION_CODE)
    } else {
        Ok(code)
    }
}

/// Split a version code back into its three components.
///
/// This is lossy: values above 999 and the zero fallback cannot be recovered.
pub fn decode(code: VersionCode) -> Version {
    let radix = u64::from(COMPONENT_RADIX);
    let code = u64::from(code);
    Version::new(code / (radix * radix), code / radix % radix, code % radix)
}

/// Normalize a raw version name and return its canonical dotted form.
pub fn normalize_version_string(input: &str) -> String {
    normalize(input).to_string()
}

/// Normalize and encode a raw version name in one step.
pub fn compute_version_code(input: &str) -> Result<VersionCode, CodecError> {
    encode(&normalize(input))
}

fn reduce_component(component: &str) -> Result<u32, CodecError> {
    if let Some(source) = invalid_digit(component) {
        return Err(CodecError::InvalidComponent {
            component: component.to_string(),
            source,
        });
    }

    // Reduce while folding so components of any length are accepted
    Ok(component.bytes().fold(0, |acc, digit| {
        (acc * 10 + u32::from(digit - b'0')) % COMPONENT_RADIX
    }))
}

/// Returns the parse error for a component that is not a plain run of ASCII digits.
///
/// Signs are rejected even though integer parsing would accept a leading `+`.
fn invalid_digit(component: &str) -> Option<ParseIntError> {
    if component.is_empty() {
        return component.parse::<u32>().err();
    }
    component
        .chars()
        .find(|c| !c.is_ascii_digit())
        .and_then(|c| c.to_string().parse::<u32>().err())
}
