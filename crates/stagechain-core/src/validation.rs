//! Chain validation: structural checks over a generated chain.
//!
//! These checks read the stage contents the same way a client would see
//! them, so they catch template mistakes that would break the chain at
//! runtime.

use crate::cipher;
use crate::chain::Chain;
use crate::error::{ChainError, Result};
use crate::integrity::checksum;
use crate::loader::http_get;
use crate::types::{StageId, StageRecord, StageRole};

/// Validate a chain before it is persisted.
///
/// This performs:
/// - Stage count and id uniqueness
/// - Access header presence and shared header name
/// - Next-hop references (id and header value) for each forwarding stage
/// - Entry-point and adjacent-stage checksum bindings
/// - Key split placement
pub fn validate_chain(chain: &Chain) -> Result<()> {
    // 1. Exactly one stage per role
    if chain.stages().len() != StageRole::FETCH_ORDER.len() {
        return Err(broken(format!(
            "expected {} stages, got {}",
            StageRole::FETCH_ORDER.len(),
            chain.stages().len()
        )));
    }

    // 2. Unique ids
    let stages = chain.stages();
    for (i, a) in stages.iter().enumerate() {
        if stages[i + 1..].iter().any(|b| b.id == a.id) {
            return Err(broken(format!("duplicate stage id {}", a.id)));
        }
    }

    // 3. Every stage requires the chain's header
    for stage in stages {
        match &stage.access {
            Some(access) if access.name == chain.header_name() => {}
            Some(_) => {
                return Err(broken(format!("stage {} uses a foreign header name", stage.id)))
            }
            None => return Err(broken(format!("stage {} has no access header", stage.id))),
        }
    }

    let verification = chain.stage(StageRole::Verification);
    let decrypt = chain.stage(StageRole::Decrypt);
    let payload = chain.stage(StageRole::Payload);
    let verification_text = text(verification)?;
    let decrypt_text = text(decrypt)?;
    let payload_text = text(payload)?;

    // 4. Each hop references its successor exactly
    let entry = chain.entry_point().text();
    require_hop(&entry, "entry point", chain, verification)?;
    require_hop(verification_text, "verification stage", chain, decrypt)?;
    require_hop(decrypt_text, "decrypt stage", chain, payload)?;

    // 5. Checksum bindings
    let entry_sum = checksum(chain.entry_point().fetch_expression().as_bytes());
    if entry_sum != chain.entry_point().checksum() {
        return Err(broken("entry point checksum does not cover its fetch expression"));
    }
    require_guard(verification_text, entry_sum, "entry point checksum")?;
    require_guard(verification_text, checksum(&decrypt.content), "decrypt stage checksum")?;
    require_guard(decrypt_text, checksum(&payload.content), "payload checksum")?;

    // 6. Key split placement
    let split = chain.key_split();
    if !verification_text.ends_with(&format!("(\"{}\")", split.part1())) {
        return Err(broken("verification stage does not forward the first key part"));
    }
    if !decrypt_text.contains(&format!("\"{}\"", split.part2())) {
        return Err(broken("decrypt stage does not embed the second key part"));
    }
    let full = split.full();
    if stages.iter().any(|s| s.content.windows(full.len()).any(|w| w == full.as_bytes())) {
        return Err(broken("a single stage holds the whole key"));
    }

    // 7. The reassembled key decodes the payload
    cipher::decrypt(payload_text, full.as_bytes())?;

    Ok(())
}

fn broken(msg: impl Into<String>) -> ChainError {
    ChainError::BrokenChain(msg.into())
}

fn text(stage: &StageRecord) -> Result<&str> {
    stage
        .content_str()
        .ok_or_else(|| broken(format!("stage {} is not UTF-8", stage.id)))
}

fn stage_url(chain: &Chain, id: &StageId) -> String {
    format!("{}{}", chain.url_prefix(), id)
}

fn require_hop(haystack: &str, what: &str, chain: &Chain, next: &StageRecord) -> Result<()> {
    let Some(access) = &next.access else {
        return Err(broken(format!("stage {} has no access header", next.id)));
    };
    let fetch = http_get(&stage_url(chain, &next.id), access);
    if haystack.contains(&fetch) {
        Ok(())
    } else {
        Err(broken(format!("{} does not fetch stage {}", what, next.id)))
    }
}

fn require_guard(haystack: &str, sum: u8, what: &str) -> Result<()> {
    if haystack.contains(&format!(" ~= {} then return end", sum)) {
        Ok(())
    } else {
        Err(broken(format!("missing {} guard", what)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainBuilder, ChainConfig};
    use crate::random::RandomMaterial;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generated_chains_validate() {
        let builder = ChainBuilder::new(ChainConfig::default()).unwrap();
        for seed in 0..50 {
            let mut material = RandomMaterial::new(StdRng::seed_from_u64(seed));
            let chain = builder
                .build_with("print(1)", &mut material, 0)
                .unwrap();
            validate_chain(&chain).unwrap();
        }
    }

    fn chain() -> Chain {
        let builder = ChainBuilder::new(ChainConfig::default()).unwrap();
        let mut material = RandomMaterial::new(StdRng::seed_from_u64(77));
        builder.build_with("print(1)", &mut material, 0).unwrap()
    }

    #[test]
    fn test_missing_header_rejected() {
        let mut chain = chain();
        chain.stages_mut()[1].access = None;
        assert!(matches!(validate_chain(&chain), Err(ChainError::BrokenChain(_))));
    }

    #[test]
    fn test_tampered_successor_rejected() {
        let mut chain = chain();
        let mut content = chain.stages()[1].content.to_vec();
        content.push(b' ');
        // Keep the tampered sum clear of the entry guard in the same stage.
        if checksum(&content) == chain.entry_point().checksum() {
            content.push(b' ');
        }
        chain.stages_mut()[1].content = content.into();
        assert!(validate_chain(&chain).is_err());
    }

    #[test]
    fn test_swapped_ids_rejected() {
        let mut chain = chain();
        let stages = chain.stages_mut();
        let id = stages[2].id.clone();
        stages[2].id = stages[1].id.clone();
        stages[1].id = id;
        assert!(validate_chain(&chain).is_err());
    }

    #[test]
    fn test_require_guard_matches_exact_value() {
        let text = "if x ~= 12 then return end";
        assert!(require_guard(text, 12, "t").is_ok());
        assert!(require_guard(text, 1, "t").is_err());
        assert!(require_guard(text, 2, "t").is_err());
    }
}
