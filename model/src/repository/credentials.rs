use super::error::{self, Result};
use crate::constants::{ACCESS_KEY_ENTRY, SECRET_KEY_ENTRY};
use k8s_openapi::api::core::v1::Secret;
use rand::seq::SliceRandom;
use rand::Rng;
use snafu::{ensure, ResultExt};

const KEY_LENGTH: usize = 64;
const KEY_DIGITS: usize = 10;
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";

/// The keys of the repository and where they are stored, so that pods can reference them.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub secret_name: String,
    pub access_key_entry: String,
    pub access_key: String,
    pub secret_key_entry: String,
    pub secret_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("secret_name", &self.secret_name)
            .field("access_key_entry", &self.access_key_entry)
            .field("secret_key_entry", &self.secret_key_entry)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Fresh random keys to be stored in `secret_name`.
    pub(crate) fn generate(secret_name: &str) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            secret_name: secret_name.to_string(),
            access_key_entry: ACCESS_KEY_ENTRY.to_string(),
            access_key: generate_key(&mut rng, &[LOWER, UPPER]),
            secret_key_entry: SECRET_KEY_ENTRY.to_string(),
            secret_key: generate_key(&mut rng, &[LOWER]),
        }
    }

    pub(crate) fn from_secret(secret: &Secret) -> Result<Self> {
        let secret_name = secret.metadata.name.clone().unwrap_or_default();
        let access_key = entry(secret, &secret_name, ACCESS_KEY_ENTRY)?;
        let secret_key = entry(secret, &secret_name, SECRET_KEY_ENTRY)?;
        Ok(Self {
            secret_name,
            access_key_entry: ACCESS_KEY_ENTRY.to_string(),
            access_key,
            secret_key_entry: SECRET_KEY_ENTRY.to_string(),
            secret_key,
        })
    }
}

fn entry(secret: &Secret, secret_name: &str, entry: &str) -> Result<String> {
    let value = secret
        .data
        .as_ref()
        .and_then(|data| data.get(entry))
        .map(|value| String::from_utf8(value.0.clone()))
        .transpose()
        .context(error::KeyEncodingSnafu {
            secret: secret_name,
            entry,
        })?
        .unwrap_or_default();
    ensure!(
        !value.is_empty(),
        error::EmptyKeySnafu {
            secret: secret_name,
            entry,
        }
    );
    Ok(value)
}

/// A key of exactly [`KEY_DIGITS`] digits, the rest drawn from `letters`, in random order.
fn generate_key<R: Rng>(rng: &mut R, letters: &[&[u8]]) -> String {
    let letters: Vec<u8> = letters.concat();
    let mut key: Vec<u8> = (0..KEY_LENGTH)
        .map(|i| {
            let alphabet = if i < KEY_DIGITS { DIGITS } else { letters.as_slice() };
            alphabet[rng.gen_range(0..alphabet.len())]
        })
        .collect();
    key.shuffle(rng);
    key.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use maplit::btreemap;

    #[test]
    fn generated_keys() {
        let credentials = Credentials::generate("repository");
        for key in [&credentials.access_key, &credentials.secret_key] {
            assert_eq!(key.len(), KEY_LENGTH);
            assert_eq!(key.chars().filter(char::is_ascii_digit).count(), KEY_DIGITS);
            assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        }
        assert!(!credentials
            .secret_key
            .chars()
            .any(|c| c.is_ascii_uppercase()));
        assert_ne!(
            credentials.access_key,
            Credentials::generate("repository").access_key
        );
    }

    #[test]
    fn keys_are_not_printed() {
        let credentials = Credentials::generate("repository");
        let printed = format!("{:?}", credentials);
        assert!(!printed.contains(&credentials.access_key));
        assert!(!printed.contains(&credentials.secret_key));
    }

    #[test]
    fn empty_entry_is_rejected() {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some("repository".into()),
                ..ObjectMeta::default()
            },
            data: Some(btreemap! {
                ACCESS_KEY_ENTRY.to_string() => ByteString(b"abc".to_vec()),
                SECRET_KEY_ENTRY.to_string() => ByteString(Vec::new()),
            }),
            ..Secret::default()
        };
        let error = Credentials::from_secret(&secret).unwrap_err();
        assert!(error.to_string().contains(SECRET_KEY_ENTRY), "{}", error);
    }
}
