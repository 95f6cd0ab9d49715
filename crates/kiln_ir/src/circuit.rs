//! The circuit: a set of modules with a designated top.

use crate::arena::Arena;
use crate::ids::ModuleId;
use crate::module::{Module, Visibility};
use kiln_common::Ident;
use serde::{Deserialize, Serialize};

/// A path to a pinned port or operation: its module and its inner symbol.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct InnerRef {
    /// Name of the module holding the entity.
    pub module: Ident,
    /// The entity's inner symbol.
    pub sym: Ident,
}

impl InnerRef {
    /// Creates a reference to `sym` inside `module`.
    pub fn new(module: Ident, sym: Ident) -> Self {
        Self { module, sym }
    }
}

/// The whole design handed to the middle-end.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Circuit {
    /// Circuit name (the top module's name).
    pub name: Ident,
    modules: Arena<ModuleId, Module>,
    top: ModuleId,
    /// Inner references moved by optimization, oldest first.
    #[serde(default)]
    renamed_refs: Vec<(InnerRef, InnerRef)>,
}

impl Circuit {
    /// Creates a circuit around its top module, which is made public.
    pub fn new(mut top: Module) -> Self {
        top.visibility = Visibility::Public;
        let name = top.name;
        let mut modules = Arena::new();
        let top = modules.alloc(top);
        Self {
            name,
            modules,
            top,
            renamed_refs: Vec::new(),
        }
    }

    /// Adds a module and returns its ID.
    pub fn add_module(&mut self, module: Module) -> ModuleId {
        self.modules.alloc(module)
    }

    /// Removes a module. The top module cannot be removed.
    pub fn remove_module(&mut self, id: ModuleId) -> Option<Module> {
        if id == self.top {
            return None;
        }
        self.modules.remove(id)
    }

    /// The top module's ID.
    pub fn top(&self) -> ModuleId {
        self.top
    }

    /// Returns the module.
    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id]
    }

    /// Returns the module mutably.
    pub fn module_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id]
    }

    /// Returns the module if it still exists.
    pub fn try_module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.try_get(id)
    }

    /// Finds a module by symbol name.
    pub fn lookup(&self, name: Ident) -> Option<ModuleId> {
        self.modules
            .iter()
            .find(|(_, m)| m.name == name)
            .map(|(id, _)| id)
    }

    /// Iterates over modules in creation order.
    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules.iter()
    }

    /// Iterates mutably over modules in creation order.
    pub fn modules_mut(&mut self) -> impl Iterator<Item = &mut Module> {
        self.modules.values_mut()
    }

    /// Snapshot of module IDs.
    pub fn module_ids(&self) -> Vec<ModuleId> {
        self.modules.ids()
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Always `false`; a circuit has at least its top module.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Records that the entity reached through `from` is now reached through `to`.
    pub fn record_rename(&mut self, from: InnerRef, to: InnerRef) {
        if from != to {
            self.renamed_refs.push((from, to));
        }
    }

    /// Every rename recorded so far, in the order it happened.
    pub fn renamed_refs(&self) -> &[(InnerRef, InnerRef)] {
        &self.renamed_refs
    }

    /// Follows recorded renames from `reference` to where the entity lives now.
    pub fn resolve_ref(&self, reference: InnerRef) -> InnerRef {
        let mut current = reference;
        // Each rename is followed at most once, so chains always end.
        for (from, to) in &self.renamed_refs {
            if *from == current {
                current = *to;
            }
        }
        current
    }

    /// Total operation count over all modules.
    pub fn num_ops(&self) -> usize {
        self.modules.values().map(Module::num_ops).sum()
    }
}
