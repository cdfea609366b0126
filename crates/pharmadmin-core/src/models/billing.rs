use serde::{Deserialize, Serialize};

use super::PharmacyDrug;

/// Result of uploading a bill image: the stored file name and the catalog
/// drugs recognised on it, ready to be reviewed and saved to inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillUpload {
    pub invoice_filename: String,
    #[serde(default)]
    pub matched_drugs: Vec<PharmacyDrug>,
}

impl BillUpload {
    /// Drop a matched drug once it has been saved or deleted.
    pub fn take_matched(&mut self, id: i64) -> Option<PharmacyDrug> {
        let index = self.matched_drugs.iter().position(|d| d.id == id)?;
        Some(self.matched_drugs.remove(index))
    }
}
