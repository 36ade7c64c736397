//! Persona domain module.
//!
//! # Module Structure
//!
//! - `model`: Core persona domain model (`Persona`, `PersonaKind`)
//! - `preset`: Built-in personas and sub-agent templates
//! - `request`: Custom persona creation (`CreatePersonaRequest`) and the staff prompt envelope

mod model;
mod preset;
pub mod request;

pub use model::{Persona, PersonaKind};
pub use preset::{
    APP_BUILDER_ID, STAFF_ANALYST_ID, STAFF_OPERATOR_ID, SubAgentType, get_default_presets,
};
pub use request::{CreatePersonaRequest, action_tool, staff_envelope};
