//! Chain building: from a script to an entry point and three stage records.
//!
//! Build order follows data dependencies. The payload comes first because
//! the decrypt stage embeds its checksum; the decrypt stage comes before the
//! verification stage for the same reason; the entry point's fetch
//! expression only depends on the verification stage's id and header, so
//! its checksum is known before the verification stage is rendered.

use std::time::Duration;

use bytes::Bytes;
use rand::RngCore;
use tracing::debug;

use crate::cipher;
use crate::error::{ChainError, Result};
use crate::integrity::checksum;
use crate::loader::{self, EntryPoint, NextStage};
use crate::random::{NameAllocator, RandomMaterial};
use crate::types::{AccessHeader, KeySplit, StageId, StageInput, StageRecord, StageRole};
use crate::validation::validate_chain;

/// Default path under which stages are served.
pub const DEFAULT_STAGE_PATH: &str = "/api/scripts/";

/// Configuration for chain generation.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Length of the full payload key.
    pub key_len: usize,
    /// Byte offset at which the key is split.
    pub split_at: usize,
    /// Length of each stage id.
    pub id_len: usize,
    /// Length of each access-header value.
    pub header_value_len: usize,
    /// Fixed prefix of the shared access-header name.
    pub header_prefix: String,
    /// Random characters appended to `header_prefix`.
    pub header_suffix_len: usize,
    /// How long stages stay readable.
    pub stage_ttl: Duration,
    /// Prepended to a stage id to form its fetch URL.
    pub stage_url_prefix: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            key_len: 48,
            split_at: 24,
            id_len: 16,
            header_value_len: 24,
            header_prefix: "X-Auth-".to_string(),
            header_suffix_len: 8,
            stage_ttl: Duration::from_secs(3600),
            stage_url_prefix: DEFAULT_STAGE_PATH.to_string(),
        }
    }
}

impl ChainConfig {
    /// Check the configuration for values that would produce a weak or
    /// malformed chain.
    pub fn validate(&self) -> Result<()> {
        if self.split_at == 0 || self.split_at >= self.key_len {
            return Err(ChainError::InvalidConfig(format!(
                "split_at must be in 1..{}, got {}",
                self.key_len, self.split_at
            )));
        }
        if self.id_len < 16 {
            return Err(ChainError::InvalidConfig(format!(
                "id_len must be at least 16, got {}",
                self.id_len
            )));
        }
        if self.header_value_len == 0 || self.header_suffix_len == 0 {
            return Err(ChainError::InvalidConfig(
                "header name suffix and value must be non-empty".into(),
            ));
        }
        if self.stage_url_prefix.is_empty() {
            return Err(ChainError::InvalidConfig("stage_url_prefix is empty".into()));
        }
        // Both values are spliced into string literals and then minified.
        if !is_literal_safe(&self.stage_url_prefix) {
            return Err(ChainError::InvalidConfig(format!(
                "stage_url_prefix contains forbidden characters: {:?}",
                self.stage_url_prefix
            )));
        }
        if !is_literal_safe(&self.header_prefix) {
            return Err(ChainError::InvalidConfig(format!(
                "header_prefix contains forbidden characters: {:?}",
                self.header_prefix
            )));
        }
        Ok(())
    }

    /// Fetch URL of a stage.
    pub fn stage_url(&self, id: &StageId) -> String {
        format!("{}{}", self.stage_url_prefix, id)
    }
}

/// True when `value` survives being placed inside a double-quoted literal
/// and passed through `minify` unchanged.
fn is_literal_safe(value: &str) -> bool {
    !value.contains("--")
        && !value
            .chars()
            .any(|c| c == '"' || c == '\\' || c.is_whitespace() || c.is_control())
}

/// The output of one protection run.
#[derive(Debug, Clone)]
pub struct Chain {
    entry_point: EntryPoint,
    stages: Vec<StageRecord>,
    key_split: KeySplit,
    header_name: String,
    url_prefix: String,
    bindings: Vec<String>,
}

impl Chain {
    /// The statement returned to the caller.
    pub fn entry_point(&self) -> &EntryPoint {
        &self.entry_point
    }

    /// Stage records in fetch order.
    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    /// The stage playing `role`.
    pub fn stage(&self, role: StageRole) -> &StageRecord {
        let idx = StageRole::FETCH_ORDER
            .iter()
            .position(|r| *r == role)
            .unwrap_or_default();
        &self.stages[idx]
    }

    /// Stage records paired with their roles, in fetch order.
    pub fn roles(&self) -> impl Iterator<Item = (StageRole, &StageRecord)> {
        StageRole::FETCH_ORDER.iter().copied().zip(self.stages.iter())
    }

    /// The payload key as split across the chain.
    pub fn key_split(&self) -> &KeySplit {
        &self.key_split
    }

    /// Access-header name shared by every stage of this chain.
    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    /// URL prefix the stages were addressed with.
    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// Every identifier bound by the generated loaders.
    pub fn bound_names(&self) -> &[String] {
        &self.bindings
    }

    /// Consume the chain, keeping the stage records.
    pub fn into_stages(self) -> Vec<StageRecord> {
        self.stages
    }

    #[cfg(test)]
    pub(crate) fn stages_mut(&mut self) -> &mut Vec<StageRecord> {
        &mut self.stages
    }
}

/// Builds stage chains.
#[derive(Debug, Clone)]
pub struct ChainBuilder {
    config: ChainConfig,
}

impl ChainBuilder {
    /// Create a builder, rejecting an unusable configuration.
    pub fn new(config: ChainConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The builder's configuration.
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Build a chain using thread-local randomness and the current time.
    pub fn build(&self, script: &str) -> Result<Chain> {
        let mut material = RandomMaterial::thread_local();
        self.build_with(script, &mut material, now_millis())
    }

    /// Build a chain from explicit randomness and creation time (Unix ms).
    pub fn build_with<R: RngCore>(
        &self,
        script: &str,
        material: &mut RandomMaterial<R>,
        now: i64,
    ) -> Result<Chain> {
        if script.trim().is_empty() {
            return Err(ChainError::InvalidInput(
                "script content is required".into(),
            ));
        }
        let cfg = &self.config;

        // Step 1: key material, header name, ids and per-stage header values.
        let key = material.key_bytes(cfg.key_len);
        let key_split = KeySplit::split(&key, cfg.split_at)?;
        let header_name = format!(
            "{}{}",
            cfg.header_prefix,
            material.token(cfg.header_suffix_len)
        );
        let ids = distinct_ids(material, cfg.id_len);
        let [verify_id, decrypt_id, payload_id] = ids;
        let verify_header = AccessHeader::new(&header_name, material.token(cfg.header_value_len));
        let decrypt_header = AccessHeader::new(&header_name, material.token(cfg.header_value_len));
        let payload_header = AccessHeader::new(&header_name, material.token(cfg.header_value_len));

        let ttl_ms = i64::try_from(cfg.stage_ttl.as_millis()).map_err(|_| {
            ChainError::GenerationFailure("stage ttl does not fit in i64 milliseconds".into())
        })?;
        let expires_at = now.checked_add(ttl_ms).ok_or_else(|| {
            ChainError::GenerationFailure("stage expiry overflows".into())
        })?;

        // Step 2: payload.
        let payload_content = cipher::encrypt(script.as_bytes(), key.as_bytes())?;
        let payload_url = cfg.stage_url(&payload_id);
        let decrypt_url = cfg.stage_url(&decrypt_id);
        let verify_url = cfg.stage_url(&verify_id);

        let mut names = NameAllocator::new(material);

        // Step 3: decrypt-and-execute stage.
        let decrypt = loader::decrypt_stage(
            &mut names,
            NextStage {
                url: &payload_url,
                header: &payload_header,
                checksum: checksum(payload_content.as_bytes()),
            },
            key_split.part2(),
        );

        // Step 5 runs before step 4: the verification stage embeds the
        // entry-point checksum.
        let entry_point = EntryPoint::new(&verify_url, &verify_header);

        // Step 4: verification-and-forward stage.
        let verification = loader::verification_stage(
            &mut names,
            entry_point.checksum(),
            NextStage {
                url: &decrypt_url,
                header: &decrypt_header,
                checksum: checksum(decrypt.text.as_bytes()),
            },
            &StageInput::Decrypt {
                key_part1: key_split.part1().to_string(),
            },
        );

        let mut bindings = decrypt.bindings;
        bindings.extend(verification.bindings);

        let stages = vec![
            StageRecord {
                id: verify_id,
                content: Bytes::from(verification.text),
                access: Some(verify_header),
                expires_at,
            },
            StageRecord {
                id: decrypt_id,
                content: Bytes::from(decrypt.text),
                access: Some(decrypt_header),
                expires_at,
            },
            StageRecord {
                id: payload_id,
                content: Bytes::from(payload_content),
                access: Some(payload_header),
                expires_at,
            },
        ];

        let chain = Chain {
            entry_point,
            stages,
            key_split,
            header_name,
            url_prefix: cfg.stage_url_prefix.clone(),
            bindings,
        };

        // Generated chains are always well formed; a failure here is a bug
        // in the templates, never bad input.
        validate_chain(&chain).map_err(|e| ChainError::GenerationFailure(e.to_string()))?;

        debug!(
            verification = %chain.stages[0].id,
            decrypt = %chain.stages[1].id,
            payload = %chain.stages[2].id,
            "built stage chain"
        );
        Ok(chain)
    }
}

/// Three pairwise-distinct stage ids.
fn distinct_ids<R: RngCore>(material: &mut RandomMaterial<R>, len: usize) -> [StageId; 3] {
    let first = StageId::new(material.token(len));
    let mut second = StageId::new(material.token(len));
    while second == first {
        second = StageId::new(material.token(len));
    }
    let mut third = StageId::new(material.token(len));
    while third == first || third == second {
        third = StageId::new(material.token(len));
    }
    [first, second, third]
}

/// Get current time in milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
