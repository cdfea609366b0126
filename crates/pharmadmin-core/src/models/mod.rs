//! Data models for the pharmacy admin backend.
//!
//! - `Drug`, `NewDrug`: master drug catalog
//! - `PharmacyDrug`, `InventoryDraft`: a pharmacy's stock rows
//! - `BillUpload`: drugs matched from an uploaded bill
//! - `ChatRequest`, `ChatReply`: chatbot widget

pub mod billing;
pub mod chat;
pub mod drug;

pub use billing::BillUpload;
pub use chat::{ChatReply, ChatRequest, GeoPoint};
pub use drug::{Drug, InventoryDraft, NewDrug, PharmacyDrug};
