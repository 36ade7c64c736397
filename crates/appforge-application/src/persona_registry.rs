//! In-memory persona registry.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use appforge_core::persona::{CreatePersonaRequest, Persona, PersonaKind, get_default_presets};
use appforge_core::{ForgeError, Result};
use tracing::{debug, info};

/// Named agent identities, seeded with the built-in presets.
///
/// Read-mostly: lookups take a shared lock, registration an exclusive one.
/// Custom personas live only in memory.
pub struct PersonaRegistry {
    personas: RwLock<HashMap<String, Persona>>,
}

impl Default for PersonaRegistry {
    fn default() -> Self {
        Self::with_presets()
    }
}

impl PersonaRegistry {
    /// Creates an empty registry.
    pub fn empty() -> Self {
        Self {
            personas: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry holding the built-in personas.
    pub fn with_presets() -> Self {
        let registry = Self::empty();
        for persona in get_default_presets() {
            registry.register(persona);
        }
        registry
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Persona>> {
        self.personas.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Persona>> {
        self.personas.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a persona, replacing any persona with the same id.
    pub fn register(&self, persona: Persona) {
        debug!(persona_id = %persona.id, kind = ?persona.kind, "[PersonaRegistry] Registered");
        self.write().insert(persona.id.clone(), persona);
    }

    pub fn unregister(&self, persona_id: &str) -> Option<Persona> {
        let removed = self.write().remove(persona_id);
        if removed.is_some() {
            debug!(persona_id, "[PersonaRegistry] Unregistered");
        }
        removed
    }

    pub fn get(&self, persona_id: &str) -> Option<Persona> {
        self.read().get(persona_id).cloned()
    }

    pub fn contains(&self, persona_id: &str) -> bool {
        self.read().contains_key(persona_id)
    }

    /// All personas sorted by id.
    pub fn list_all(&self) -> Vec<Persona> {
        let mut personas: Vec<Persona> = self.read().values().cloned().collect();
        personas.sort_by(|a, b| a.id.cmp(&b.id));
        personas
    }

    /// Personas a user can open a session with (enabled, not transient).
    pub fn list_selectable(&self) -> Vec<Persona> {
        self.list_all()
            .into_iter()
            .filter(|p| p.enabled && p.kind != PersonaKind::Transient)
            .collect()
    }

    /// Builds and registers a custom staff persona.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` when the request is invalid or the explicit id is
    /// already taken.
    pub fn register_custom(&self, request: CreatePersonaRequest) -> Result<Persona> {
        request.validate().map_err(ForgeError::invalid_schema)?;
        let persona = request.into_persona();
        let mut personas = self.write();
        if personas.contains_key(&persona.id) {
            return Err(ForgeError::invalid_schema(format!(
                "persona id '{}' is already registered",
                persona.id
            )));
        }
        info!(persona_id = %persona.id, tools = ?persona.tool_filter, "[PersonaRegistry] Custom persona created");
        personas.insert(persona.id.clone(), persona.clone());
        Ok(persona)
    }

    /// Resolves the persona for a new turn.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids and `PermissionDenied` for disabled
    /// personas (sub-agent templates are only reachable through `task`).
    pub fn resolve(&self, persona_id: &str) -> Result<Persona> {
        let persona = self
            .get(persona_id)
            .ok_or_else(|| ForgeError::not_found("persona", persona_id))?;
        if !persona.enabled {
            return Err(ForgeError::PermissionDenied(format!(
                "persona '{persona_id}' is disabled"
            )));
        }
        Ok(persona)
    }
}
