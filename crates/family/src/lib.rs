//! Family aggregate and the people in it.

pub mod error;
pub mod family;
pub mod person;

pub use error::FamilyError;
pub use family::{DivorceSettlement, Family, FamilyStatus};
pub use person::{Child, Parent};
