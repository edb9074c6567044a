//! Simulator binding pipeline (spec §4.9, §4.10): archive extraction,
//! binary-XML decode, action-schema parsing/diffing, and export/import
//! of rebinding files.

pub mod archive;
pub mod binxml;
pub mod export;
pub mod schema;

use crate::error::Result;
use schema::{Installation, ParsedSchema, SchemaCache};

/// Run the full pipeline for one installation: cache check, archive
/// extraction, binary-XML decode, and action parsing (spec §4.9 steps
/// 1-5).
pub fn load_schema_for_installation(
    installation: &Installation,
    entry_name: &str,
    cache: &SchemaCache,
) -> Result<ParsedSchema> {
    let key = schema::CacheKey::for_installation(installation)?;

    let blob = match cache.get(&key) {
        Some(cached) => cached,
        None => {
            let archive_bytes = std::fs::read(&installation.archive_path)?;
            let extracted = archive::extract_entry(&archive_bytes, entry_name)?;
            cache.put(&key, &extracted)?;
            extracted
        }
    };

    let node = binxml::decode(&blob)?;
    schema::parse_schema(&node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::binxml::decode;

    #[test]
    fn pipeline_decodes_and_parses_without_touching_archive_on_cache_hit() {
        let tmp = std::env::temp_dir().join(format!("asteriq-schema-cache-test-{}", std::process::id()));
        let cache = SchemaCache::new(&tmp);
        let key = schema::CacheKey::BuildId {
            environment: "LIVE".to_string(),
            build_id: "1".to_string(),
        };
        let xml = br#"<ActionMaps><actionmap name="m"><action name="v_pitch"><joystick input="js1_roty"/></action></actionmap></ActionMaps>"#;
        cache.put(&key, xml).unwrap();

        let blob = cache.get(&key).unwrap();
        let node = decode(&blob).unwrap();
        let parsed = schema::parse_schema(&node).unwrap();
        assert_eq!(parsed.actions.len(), 1);

        std::fs::remove_dir_all(&tmp).ok();
    }
}
