use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;

use crate::{builtins::Builtins, errors::RuntimeError, object::Kit, value::Value};

#[derive(Default)]
struct State {
    globals: IndexMap<Rc<str>, Value>,
    kits: IndexMap<Rc<str>, Rc<Kit>>,
    builtins: Rc<Builtins>,
}

/// Global table, registered kits and built-in type descriptors, shared by
/// every VM created from the same handle. Nothing here synchronizes access
/// between VMs.
#[derive(Clone, Default)]
pub struct SharedState(Rc<RefCell<State>>);

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a global, falling back to a kit registered under that name.
    /// Unknown names load as null.
    pub fn load(&self, name: &str) -> Value {
        let state = self.0.borrow();
        if let Some(value) = state.globals.get(name) {
            return value.clone();
        }
        match state.kits.get(name) {
            Some(kit) => Value::Kit(kit.clone()),
            None => Value::Null,
        }
    }

    /// Stores without following a reference held by the global.
    pub fn store_raw(&self, name: &str, value: Value) {
        self.0.borrow_mut().globals.insert(Rc::from(name), value);
    }

    /// Descriptors of the built-in value kinds for this state.
    pub fn builtins(&self) -> Rc<Builtins> {
        self.0.borrow().builtins.clone()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.0.borrow().globals.contains_key(name)
    }

    pub fn register_kit(&self, kit: Kit) -> Rc<Kit> {
        let kit = Rc::new(kit);
        tracing::debug!(kit = %kit.name, "registered kit");
        self.0.borrow_mut().kits.insert(kit.name.clone(), kit.clone());
        kit
    }

    pub fn kit(&self, name: &str) -> Option<Rc<Kit>> {
        self.0.borrow().kits.get(name).cloned()
    }

    /// Copies every field of a registered kit into the global table.
    pub fn use_all(&self, kit_name: &str) -> Result<(), RuntimeError> {
        let kit = self.require_kit(kit_name)?;
        let mut state = self.0.borrow_mut();
        for (name, value) in kit.fields() {
            state.globals.insert(name, value);
        }
        Ok(())
    }

    /// Copies the named fields of a registered kit into the global table.
    pub fn use_fields(&self, kit_name: &str, names: &[&str]) -> Result<(), RuntimeError> {
        let kit = self.require_kit(kit_name)?;
        for name in names {
            let value = kit.get(name).ok_or_else(|| RuntimeError::MissingField {
                target: format!("kit {}", kit_name),
                field: name.to_string(),
            })?;
            self.store_raw(name, value);
        }
        Ok(())
    }

    fn require_kit(&self, kit_name: &str) -> Result<Rc<Kit>, RuntimeError> {
        self.kit(kit_name)
            .ok_or_else(|| RuntimeError::custom(format!("No kit named '{}' is registered.", kit_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globals_fall_back_to_kits() {
        let state = SharedState::new();
        assert!(matches!(state.load("math"), Value::Null));

        let kit = Kit::new("math");
        kit.set("pi", Value::float(3.14));
        state.register_kit(kit);
        assert!(matches!(state.load("math"), Value::Kit(_)));

        state.store_raw("math", Value::int(1));
        assert_eq!(state.load("math"), Value::int(1));
    }

    #[test]
    fn use_all_and_use_fields() {
        let state = SharedState::new();
        let kit = Kit::new("k");
        kit.set("a", Value::int(1));
        kit.set("b", Value::int(2));
        state.register_kit(kit);

        state.use_fields("k", &["b"]).unwrap();
        assert!(!state.is_defined("a"));
        assert_eq!(state.load("b"), Value::int(2));

        state.use_all("k").unwrap();
        assert_eq!(state.load("a"), Value::int(1));

        assert!(state.use_fields("k", &["c"]).is_err());
        assert!(state.use_all("nope").is_err());
    }

    #[test]
    fn clones_share_globals() {
        let state = SharedState::new();
        let other = state.clone();
        other.store_raw("x", Value::int(5));
        assert_eq!(state.load("x"), Value::int(5));
        assert!(Rc::ptr_eq(&state.builtins(), &other.builtins()));
    }

    #[test]
    fn separate_states_have_separate_descriptors() {
        let a = SharedState::new();
        let b = SharedState::new();
        a.builtins().type_def_of(&Value::int(1)).set_method("triple", Value::Null);
        assert!(b.builtins().type_def_of(&Value::int(1)).method("triple").is_none());
    }
}
