//! Pure triage building blocks
//!
//! Text normalization, emergency screening and department resolution. Nothing
//! in here touches storage or the network.

pub mod department;
pub mod emergency;
pub mod normalize;

pub use department::{resolve_department, DepartmentResolution};
pub use emergency::is_emergency;
pub use normalize::normalize_symptoms;
