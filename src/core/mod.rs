pub mod catalog;
pub mod checkout;
pub mod engine;
pub mod export;
pub mod inventory;
pub mod summary;
pub mod totals;

pub use crate::domain::model::{Actor, Sale, SaleItem};
pub use crate::domain::ports::{DocumentStore, Storage};
pub use crate::utils::error::Result;
