//! Merge/deduplication store: prior-run loading, keyed field-by-field merge,
//! CSV + JSON persistence.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::record::Listing;

/// Load the previously persisted set: first path that exists and parses as a
/// JSON array wins; anything unreadable or malformed falls through to the
/// next path, then to an empty baseline.
pub fn load_existing(primary: &Path, secondary: &Path) -> Vec<Listing> {
    for path in [primary, secondary] {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => continue,
        };
        if let Ok(listings) = serde_json::from_str::<Vec<Listing>>(&content) {
            return listings;
        }
    }
    Vec::new()
}

/// Non-empty existing value wins; a new value only fills a gap.
fn keep_filled(existing: &str, new: &str) -> String {
    if existing.is_empty() && !new.is_empty() {
        new.to_string()
    } else {
        existing.to_string()
    }
}

/// Long-text rule: a strictly longer new value replaces the stored one.
fn longer_of(existing: &str, new: &str) -> String {
    if new.len() > existing.len() {
        new.to_string()
    } else {
        existing.to_string()
    }
}

fn merge_listing(existing: &Listing, new: &Listing) -> Listing {
    Listing {
        ville: keep_filled(&existing.ville, &new.ville),
        description: keep_filled(&existing.description, &new.description),
        texte: longer_of(&existing.texte, &new.texte),
        mise_a_prix: keep_filled(&existing.mise_a_prix, &new.mise_a_prix),
        adresse: keep_filled(&existing.adresse, &new.adresse),
        photo: keep_filled(&existing.photo, &new.photo),
        date_visite: keep_filled(&existing.date_visite, &new.date_visite),
        date_vente: keep_filled(&existing.date_vente, &new.date_vente),
        latitude: keep_filled(&existing.latitude, &new.latitude),
        longitude: keep_filled(&existing.longitude, &new.longitude),
        additional_text: longer_of(&existing.additional_text, &new.additional_text),
        court: keep_filled(&existing.court, &new.court),
        sous_lot: keep_filled(&existing.sous_lot, &new.sous_lot),
        first_sous_lot: keep_filled(&existing.first_sous_lot, &new.first_sous_lot),
        trusts: keep_filled(&existing.trusts, &new.trusts),
        number: keep_filled(&existing.number, &new.number),
        lien: keep_filled(&existing.lien, &new.lien),
    }
}

/// Merge newly crawled listings into the existing set, keyed by identity.
/// The keyed map governs output order; merging a set into itself is a no-op.
pub fn merge(existing: Vec<Listing>, new_items: Vec<Listing>) -> Vec<Listing> {
    let mut merged: BTreeMap<String, Listing> = BTreeMap::new();
    for listing in existing {
        merged.insert(listing.identity_key(), listing);
    }
    for listing in new_items {
        let key = listing.identity_key();
        let value = match merged.get(&key) {
            Some(base) => merge_listing(base, &listing),
            None => listing,
        };
        merged.insert(key, value);
    }
    merged.into_values().collect()
}

fn write_csv(records: &[Listing], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to open CSV: {}", path.display()))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json(records: &[Listing], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(records)?;
    fs::write(path, json).with_context(|| format!("Failed to write: {}", path.display()))?;
    Ok(())
}

/// Write the full merged set to every destination. A failure on one file is
/// logged and does not stop the others.
fn write_outputs(records: &[Listing], csv_path: &Path, public_json: &Path, local_json: &Path) {
    if let Err(e) = write_csv(records, csv_path) {
        eprintln!("Error writing CSV {}: {}", csv_path.display(), e);
    }
    for path in [public_json, local_json] {
        match write_json(records, path) {
            Ok(()) => println!("Wrote: {}", path.display()),
            Err(e) => eprintln!("Error writing JSON {}: {}", path.display(), e),
        }
    }
}

/// Full persistence step for one crawl run: load prior state, merge, write.
/// An empty crawl skips everything and leaves existing files untouched.
pub fn persist_run(
    new_items: Vec<Listing>,
    csv_path: &Path,
    public_json: &Path,
    local_json: &Path,
) -> bool {
    if new_items.is_empty() {
        eprintln!("No listings collected. Check connectivity, the site, or the selectors.");
        return false;
    }
    let existing = load_existing(public_json, local_json);
    let merged = merge(existing, new_items);
    println!("{} listings after merge.", merged.len());
    write_outputs(&merged, csv_path, public_json, local_json);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::path::PathBuf;

    fn listing(number: &str, ville: &str, texte: &str) -> Listing {
        Listing {
            number: number.to_string(),
            ville: ville.to_string(),
            texte: texte.to_string(),
            ..Default::default()
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("licitor_store_{}_{}", std::process::id(), name));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_merge_is_idempotent() {
        let set = vec![
            listing("1", "Paris", "Un texte descriptif"),
            listing("2", "Lyon", ""),
        ];
        let merged = merge(set.clone(), set.clone());
        assert_eq!(merged.len(), 2);
        for original in &set {
            assert!(merged.contains(original));
        }
    }

    #[test]
    fn test_merge_does_not_regress_filled_fields() {
        let existing = vec![Listing {
            number: "1".to_string(),
            adresse: "10 rue X".to_string(),
            ..Default::default()
        }];
        let new = vec![Listing {
            number: "1".to_string(),
            adresse: String::new(),
            ..Default::default()
        }];
        let merged = merge(existing, new);
        assert_eq!(merged[0].adresse, "10 rue X");
    }

    #[test]
    fn test_merge_fills_empty_fields() {
        let existing = vec![Listing {
            number: "1".to_string(),
            ..Default::default()
        }];
        let new = vec![Listing {
            number: "1".to_string(),
            adresse: "10 rue X".to_string(),
            ..Default::default()
        }];
        let merged = merge(existing, new);
        assert_eq!(merged[0].adresse, "10 rue X");
    }

    #[test]
    fn test_longer_text_wins_either_way() {
        let existing = vec![listing("1", "Paris", "short")];
        let new = vec![listing("1", "Paris", "a much longer description")];
        let merged = merge(existing, new);
        assert_eq!(merged[0].texte, "a much longer description");

        // Shorter new text must not clobber the stored one
        let existing = vec![listing("1", "Paris", "a much longer description")];
        let new = vec![listing("1", "Paris", "short")];
        let merged = merge(existing, new);
        assert_eq!(merged[0].texte, "a much longer description");
    }

    #[test]
    fn test_merge_inserts_unknown_keys() {
        let existing = vec![listing("1", "Paris", "")];
        let new = vec![listing("2", "Lyon", "")];
        let merged = merge(existing, new);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_load_existing_falls_back_on_malformed_primary() {
        let dir = scratch_dir("load_fallback");
        let primary = dir.join("primary.json");
        let secondary = dir.join("secondary.json");
        fs::write(&primary, "{not json").unwrap();
        fs::write(
            &secondary,
            serde_json::to_string(&vec![listing("7", "Paris", "")]).unwrap(),
        )
        .unwrap();

        let loaded = load_existing(&primary, &secondary);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].number, "7");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_existing_defaults_to_empty() {
        let dir = scratch_dir("load_empty");
        let loaded = load_existing(&dir.join("missing.json"), &dir.join("also_missing.json"));
        assert!(loaded.is_empty());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_empty_crawl_touches_nothing() {
        let dir = scratch_dir("empty_crawl");
        let csv_path = dir.join("out.csv");
        let public_json = dir.join("public/out.json");
        let local_json = dir.join("out.json");
        fs::write(&local_json, "[{\"ville\": \"Paris\"}]").unwrap();
        let before = fs::read(&local_json).unwrap();

        assert!(!persist_run(Vec::new(), &csv_path, &public_json, &local_json));
        assert!(!csv_path.exists());
        assert!(!public_json.exists());
        assert_eq!(fs::read(&local_json).unwrap(), before);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_persist_run_writes_all_outputs() {
        let dir = scratch_dir("persist_all");
        let csv_path = dir.join("out.csv");
        let public_json = dir.join("public/out.json");
        let local_json = dir.join("out.json");

        let items = vec![listing("1", "Paris", "Un texte")];
        assert!(persist_run(items, &csv_path, &public_json, &local_json));
        assert!(csv_path.exists());
        assert!(public_json.exists());
        assert!(local_json.exists());

        let loaded: Vec<Listing> =
            serde_json::from_str(&fs::read_to_string(&public_json).unwrap()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].ville, "Paris");

        let csv_content = fs::read_to_string(&csv_path).unwrap();
        assert!(csv_content.starts_with("ville,"));
        assert!(csv_content.contains("Paris"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_persist_run_merges_with_prior_state() {
        let dir = scratch_dir("persist_merge");
        let csv_path = dir.join("out.csv");
        let public_json = dir.join("public/out.json");
        let local_json = dir.join("out.json");

        let first = vec![Listing {
            number: "1".to_string(),
            ville: "Paris".to_string(),
            adresse: "10 rue X".to_string(),
            ..Default::default()
        }];
        assert!(persist_run(first, &csv_path, &public_json, &local_json));

        // Second run: same key, empty address, new date
        let second = vec![Listing {
            number: "1".to_string(),
            ville: "Paris".to_string(),
            date_vente: "Jeudi 12 Juin 2025".to_string(),
            ..Default::default()
        }];
        assert!(persist_run(second, &csv_path, &public_json, &local_json));

        let loaded: Vec<Listing> =
            serde_json::from_str(&fs::read_to_string(&public_json).unwrap()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].adresse, "10 rue X");
        assert_eq!(loaded[0].date_vente, "Jeudi 12 Juin 2025");

        fs::remove_dir_all(&dir).unwrap();
    }
}
