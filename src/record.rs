//! Listing record shape and deduplication identity

use serde::{Deserialize, Serialize};

/// One auction listing, as persisted to CSV/JSON.
///
/// Every field is a display string and defaults to empty when the site
/// doesn't yield a value; the persisted shape never has missing keys.
/// External names are kept as the front-end expects them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    #[serde(default)]
    pub ville: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub texte: String,
    #[serde(default)]
    pub mise_a_prix: String,
    #[serde(default)]
    pub adresse: String,
    #[serde(default)]
    pub photo: String,
    #[serde(default)]
    pub date_visite: String,
    #[serde(default)]
    pub date_vente: String,
    #[serde(default)]
    pub latitude: String,
    #[serde(default)]
    pub longitude: String,
    #[serde(rename = "AdditionalText", default)]
    pub additional_text: String,
    #[serde(rename = "Court", default)]
    pub court: String,
    #[serde(rename = "SousLot", default)]
    pub sous_lot: String,
    #[serde(rename = "FirstSousLot", default)]
    pub first_sous_lot: String,
    #[serde(rename = "Trusts", default)]
    pub trusts: String,
    #[serde(rename = "Number", default)]
    pub number: String,
    #[serde(default)]
    pub lien: String,
}

impl Listing {
    /// Deduplication key: listing number first, then the detail URL, then a
    /// normalized (city, address, price) composite for cards that never had
    /// a detail link.
    pub fn identity_key(&self) -> String {
        let number = self.number.trim();
        if !number.is_empty() {
            return format!("NUM:{}", number);
        }
        let lien = self.lien.trim();
        if !lien.is_empty() {
            return format!("URL:{}", lien);
        }
        format!(
            "FALL:{}|{}|{}",
            self.ville.trim().to_lowercase(),
            self.adresse.trim().to_lowercase(),
            self.mise_a_prix.trim()
        )
    }
}
