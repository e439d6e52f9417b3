//! Phone → platform id resolution, one phone or a batch

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, ProfileResult};
use crate::phone::{mask_phone, normalize_phone, NormalizedPhone};
use crate::platform::{PlatformDirectory, PlatformUser};

/// Upper bound on phones accepted by one batch call
pub const MAX_BATCH_SIZE: usize = 100;

/// Lookups in flight at once for one batch
const LOOKUP_CONCURRENCY: usize = 8;

/// Result for one input phone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneMapping {
    /// Phone exactly as the caller supplied it
    pub original_phone: String,
    pub resolved_id: Option<String>,
    pub found: bool,
}

/// Platform identity found for one phone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneProfile {
    pub phone: String,
    pub user_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Resolves up to [`MAX_BATCH_SIZE`] phones per call through a
/// [`PlatformDirectory`], tolerating individual lookup failures.
#[derive(Clone)]
pub struct BatchLookup {
    directory: Arc<dyn PlatformDirectory>,
}

impl BatchLookup {
    pub fn new(directory: Arc<dyn PlatformDirectory>) -> Self {
        Self { directory }
    }

    /// Resolve one raw phone.
    ///
    /// Fails with [`ProfileError::InvalidPhone`] before any lookup when the
    /// phone does not normalize.
    pub async fn resolve_one(&self, phone: &str) -> ProfileResult<String> {
        let normalized = normalize_phone(phone)?;
        let id = self.directory.resolve_phone(normalized.as_str()).await?;
        tracing::debug!(phone = %mask_phone(normalized.as_str()), "Phone resolved");
        Ok(id)
    }

    /// Platform id plus whatever name the directory knows for a phone.
    ///
    /// Names are empty when the directory has no profile; webhooks fill
    /// them in later.
    pub async fn profile(&self, phone: &str) -> ProfileResult<PhoneProfile> {
        let normalized = normalize_phone(phone)?;
        let user_id = self.directory.resolve_phone(normalized.as_str()).await?;
        let user = match self.directory.profile_by_phone(normalized.as_str()).await {
            Ok(user) => user.unwrap_or_default(),
            Err(e) => {
                tracing::debug!(
                    phone = %mask_phone(normalized.as_str()),
                    error = %e,
                    "Directory profile unavailable, returning id only"
                );
                PlatformUser::default()
            }
        };

        Ok(PhoneProfile {
            phone: normalized.into_inner(),
            user_id,
            first_name: user.first_name,
            last_name: user.last_name,
        })
    }

    /// Resolve a batch of raw phone strings.
    ///
    /// Phones that fail normalization produce no mapping at all. Every
    /// normalizable phone produces exactly one mapping, in input order.
    pub async fn resolve(&self, phones: &[String]) -> ProfileResult<Vec<PhoneMapping>> {
        if phones.len() > MAX_BATCH_SIZE {
            return Err(ProfileError::BatchTooLarge {
                size: phones.len(),
                max: MAX_BATCH_SIZE,
            });
        }

        let entries: Vec<(String, NormalizedPhone)> = phones
            .iter()
            .filter_map(|raw| match normalize_phone(raw) {
                Ok(normalized) => Some((raw.clone(), normalized)),
                Err(_) => {
                    tracing::debug!(phone = %mask_phone(raw), "Dropping unnormalizable phone from batch");
                    None
                }
            })
            .collect();

        let dropped = phones.len() - entries.len();

        let mappings: Vec<PhoneMapping> = stream::iter(entries)
            .map(|(raw, normalized)| {
                let directory = self.directory.clone();
                async move {
                    match directory.resolve_phone(normalized.as_str()).await {
                        Ok(id) => PhoneMapping {
                            original_phone: raw,
                            resolved_id: Some(id),
                            found: true,
                        },
                        Err(e) => {
                            tracing::debug!(
                                phone = %mask_phone(normalized.as_str()),
                                error = %e,
                                "Phone lookup failed"
                            );
                            PhoneMapping {
                                original_phone: raw,
                                resolved_id: None,
                                found: false,
                            }
                        }
                    }
                }
            })
            .buffered(LOOKUP_CONCURRENCY)
            .collect()
            .await;

        let found = mappings.iter().filter(|m| m.found).count();
        tracing::info!(
            requested = phones.len(),
            dropped = dropped,
            found = found,
            not_found = mappings.len() - found,
            "Batch phone lookup complete"
        );

        Ok(mappings)
    }
}
