//! Local slot allocation
//!
//! Source variables get one slot each, allocated on first use. Temps are
//! released when their value is consumed and recycled by later temps.

use rustc_hash::FxHashMap;

use crate::features::codegen::domain::{LocalId, LocalInfo, LocalKind};

#[derive(Debug, Default)]
pub struct LocalSlots {
    locals: Vec<LocalInfo>,
    variables: FxHashMap<String, LocalId>,
    free_temps: Vec<LocalId>,
    return_slot: Option<LocalId>,
}

impl LocalSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of source variable `name`
    pub fn variable(&mut self, name: &str) -> LocalId {
        if let Some(id) = self.variables.get(name) {
            return *id;
        }
        let id = self.push(name, LocalKind::Variable);
        self.variables.insert(name.to_string(), id);
        id
    }

    /// Scratch slot; give it back with `release`
    pub fn temp(&mut self) -> LocalId {
        match self.free_temps.pop() {
            Some(id) => id,
            None => {
                let name = format!("<tmp{}>", self.locals.len());
                self.push(&name, LocalKind::Temp)
            }
        }
    }

    pub fn release(&mut self, id: LocalId) {
        if self.locals[id.index()].kind == LocalKind::Temp && !self.free_temps.contains(&id) {
            self.free_temps.push(id);
        }
    }

    /// Iterator slot; never recycled, a loop may re-enter its move-next block
    pub fn enumerator(&mut self) -> LocalId {
        let name = format!("<enumerator{}>", self.locals.len());
        self.push(&name, LocalKind::Enumerator)
    }

    pub fn return_slot(&mut self) -> LocalId {
        if let Some(id) = self.return_slot {
            return id;
        }
        let id = self.push("<ret>", LocalKind::ReturnValue);
        self.return_slot = Some(id);
        id
    }

    pub fn existing_return_slot(&self) -> Option<LocalId> {
        self.return_slot
    }

    pub fn len(&self) -> usize {
        self.locals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }

    pub fn into_locals(self) -> Vec<LocalInfo> {
        self.locals
    }

    fn push(&mut self, name: &str, kind: LocalKind) -> LocalId {
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(LocalInfo {
            name: name.to_string(),
            kind,
        });
        id
    }
}
