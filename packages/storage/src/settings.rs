//! Endpoint and credential resolution.

use crate::StorageError;

/// Explicit S3-compatible endpoint URL.
pub const ENDPOINT_VAR: &str = "OSS_ENDPOINT_URL";
/// Object storage namespace used to build the OCI endpoint.
pub const NAMESPACE_VAR: &str = "OCI_NAMESPACE";
/// OCI region used to build the OCI endpoint.
pub const OCI_REGION_VAR: &str = "OCI_REGION";
/// Signing region override.
pub const REGION_VAR: &str = "OSS_REGION";
/// Access key.
pub const ACCESS_KEY_VAR: &str = "OSS_ACCESS_KEY_ID";
/// Secret key.
pub const SECRET_KEY_VAR: &str = "OSS_SECRET_ACCESS_KEY";

const DEFAULT_REGION: &str = "us-east-1";

/// Everything needed to build a [`crate::StorageClient`].
#[derive(Clone, PartialEq, Eq)]
pub struct StorageSettings {
    /// S3-compatible endpoint URL.
    pub endpoint: String,
    /// Signing region.
    pub region: String,
    /// Access key.
    pub access_key_id: String,
    /// Secret key.
    pub secret_access_key: String,
}

impl std::fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSettings")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

impl StorageSettings {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::MissingEnv`] if the credentials or an
    /// endpoint source are missing.
    pub fn from_env() -> Result<Self, StorageError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`, which maps a variable name to its
    /// value. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::MissingEnv`] naming the first missing
    /// variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StorageError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require = |name: &str| {
            get(name).ok_or_else(|| StorageError::MissingEnv {
                name: name.to_string(),
            })
        };

        let oci_region = get(OCI_REGION_VAR);
        let endpoint = match get(ENDPOINT_VAR) {
            Some(url) => url,
            None => {
                let namespace = require(NAMESPACE_VAR)?;
                let region = oci_region.clone().ok_or_else(|| StorageError::MissingEnv {
                    name: OCI_REGION_VAR.to_string(),
                })?;
                oci_endpoint(&namespace, &region)
            }
        };

        let region = get(REGION_VAR)
            .or(oci_region)
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        Ok(Self {
            endpoint,
            region,
            access_key_id: require(ACCESS_KEY_VAR)?,
            secret_access_key: require(SECRET_KEY_VAR)?,
        })
    }
}

/// Builds the OCI Object Storage S3-compatibility endpoint.
#[must_use]
pub fn oci_endpoint(namespace: &str, region: &str) -> String {
    format!("https://{namespace}.compat.objectstorage.{region}.oraclecloud.com")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn builds_oci_endpoint_from_namespace_and_region() {
        let settings = StorageSettings::from_lookup(lookup(&[
            (NAMESPACE_VAR, "acme"),
            (OCI_REGION_VAR, "us-ashburn-1"),
            (ACCESS_KEY_VAR, "ak"),
            (SECRET_KEY_VAR, "sk"),
        ]))
        .unwrap();

        assert_eq!(
            settings.endpoint,
            "https://acme.compat.objectstorage.us-ashburn-1.oraclecloud.com"
        );
        assert_eq!(settings.region, "us-ashburn-1");
    }

    #[test]
    fn explicit_endpoint_wins_and_region_defaults() {
        let settings = StorageSettings::from_lookup(lookup(&[
            (ENDPOINT_VAR, "http://localhost:9000"),
            (NAMESPACE_VAR, "ignored"),
            (ACCESS_KEY_VAR, "ak"),
            (SECRET_KEY_VAR, "sk"),
        ]))
        .unwrap();

        assert_eq!(settings.endpoint, "http://localhost:9000");
        assert_eq!(settings.region, "us-east-1");
    }

    #[test]
    fn region_override_beats_oci_region() {
        let settings = StorageSettings::from_lookup(lookup(&[
            (ENDPOINT_VAR, "http://localhost:9000"),
            (OCI_REGION_VAR, "eu-frankfurt-1"),
            (REGION_VAR, "auto"),
            (ACCESS_KEY_VAR, "ak"),
            (SECRET_KEY_VAR, "sk"),
        ]))
        .unwrap();

        assert_eq!(settings.region, "auto");
    }

    #[test]
    fn missing_secret_is_reported_by_name() {
        let err = StorageSettings::from_lookup(lookup(&[
            (ENDPOINT_VAR, "http://localhost:9000"),
            (ACCESS_KEY_VAR, "ak"),
            (SECRET_KEY_VAR, "  "),
        ]))
        .unwrap_err();

        assert!(matches!(err, StorageError::MissingEnv { ref name } if name == SECRET_KEY_VAR));
    }

    #[test]
    fn missing_endpoint_source_names_namespace() {
        let err = StorageSettings::from_lookup(lookup(&[
            (ACCESS_KEY_VAR, "ak"),
            (SECRET_KEY_VAR, "sk"),
        ]))
        .unwrap_err();

        assert_eq!(err.to_string(), "Missing environment variable: OCI_NAMESPACE");
    }

    #[test]
    fn debug_output_redacts_secret() {
        let settings = StorageSettings::from_lookup(lookup(&[
            (ENDPOINT_VAR, "http://localhost:9000"),
            (ACCESS_KEY_VAR, "ak"),
            (SECRET_KEY_VAR, "very-secret"),
        ]))
        .unwrap();

        assert!(!format!("{settings:?}").contains("very-secret"));
    }
}
