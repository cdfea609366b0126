use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::api::request::to_json_body;
use crate::api::{ApiError, FieldErrors};
use crate::utils::payload::{clean_payload, prepare_drug_submission};

/// Decimal fields arrive as strings ("12.50") from most endpoints and as
/// numbers from a few.
fn decimal_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

fn default_true() -> bool {
    true
}

/// Entry in the master drug catalog (`/pharmacy/drugs/`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drug {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub formulation: Option<String>,
    #[serde(default)]
    pub strength: Option<String>,
    #[serde(default, deserialize_with = "decimal_string")]
    pub unit_price: Option<String>,
    #[serde(default)]
    pub drug_type: Option<String>,
    #[serde(default = "default_true")]
    pub in_stock: bool,
}

impl Drug {
    /// Body for `PUT /pharmacy/drugs/{id}/`, blanks removed.
    pub fn submission_payload(&self) -> Result<Value, ApiError> {
        Ok(clean_payload(to_json_body(self)?))
    }

    pub fn display_label(&self) -> String {
        match (&self.brand, &self.strength) {
            (Some(brand), Some(strength)) if !brand.is_empty() && !strength.is_empty() => {
                format!("{} ({}, {})", self.name, brand, strength)
            }
            (Some(brand), _) if !brand.is_empty() => format!("{} ({})", self.name, brand),
            _ => self.name.clone(),
        }
    }
}

/// Form for adding a catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDrug {
    pub name: String,
    pub brand: String,
    pub formulation: String,
    pub strength: String,
    pub unit_price: String,
    pub drug_type: String,
    pub in_stock: bool,
}

impl Default for NewDrug {
    fn default() -> Self {
        Self {
            name: String::new(),
            brand: String::new(),
            formulation: String::new(),
            strength: String::new(),
            unit_price: "0.00".to_string(),
            drug_type: "pain".to_string(),
            in_stock: true,
        }
    }
}

impl NewDrug {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::Validation(FieldErrors::single("name", "This field may not be blank.")));
        }
        Ok(())
    }
}

/// Stock row of a pharmacy (`/pharmacy/pharmacy-drugs/`). Also the shape of
/// drugs matched from an uploaded bill. Fields the client does not model
/// are kept in `extra` so a save sends them back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PharmacyDrug {
    pub id: i64,
    #[serde(default)]
    pub drug_id: Option<i64>,
    #[serde(default)]
    pub drug_name: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub strength: Option<String>,
    #[serde(default, deserialize_with = "decimal_string")]
    pub actual_rate: Option<String>,
    #[serde(default, deserialize_with = "decimal_string")]
    pub sell_rate: Option<String>,
    #[serde(default, deserialize_with = "decimal_string")]
    pub discount_percentage: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PharmacyDrug {
    /// Id used in `/pharmacy/pharmacy-drugs/{id}/`.
    pub fn resource_id(&self) -> i64 {
        self.drug_id.unwrap_or(self.id)
    }

    pub fn display_name(&self) -> &str {
        self.drug_name.as_deref().unwrap_or("(unnamed)")
    }

    /// Body for saving this row: re-keyed for the backend, blanks removed.
    pub fn submission_payload(&self) -> Result<Value, ApiError> {
        Ok(prepare_drug_submission(to_json_body(self)?))
    }
}

/// Form for adding a stock row; `drug_id` picks the catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryDraft {
    pub drug_id: Option<i64>,
    pub brand: Option<String>,
    pub strength: Option<String>,
    pub actual_rate: Option<String>,
    pub sell_rate: Option<String>,
    pub discount_percentage: Option<String>,
}

impl InventoryDraft {
    pub fn submission_payload(&self) -> Result<Value, ApiError> {
        if self.drug_id.is_none() {
            return Err(ApiError::Validation(FieldErrors::single(
                "drug_id",
                "Please select a drug before adding.",
            )));
        }
        Ok(clean_payload(to_json_body(self)?))
    }
}
