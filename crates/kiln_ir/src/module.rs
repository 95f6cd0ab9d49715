//! Modules: ports, SSA values with use-lists, and the operation set.
//!
//! Every mutation that changes data flow goes through [`Module`] methods so
//! that use-lists stay in sync with operand lists. Operation metadata (name
//! hint, symbol, annotations, location) may be edited in place.

use crate::arena::Arena;
use crate::ids::{OpId, ValueId};
use crate::op::{Annotation, ConnectKind, InstanceInfo, Op, OpKind};
use crate::types::Type;
use kiln_common::{Ident, Interner, InternalError, KilnResult, Loc};
use serde::{Deserialize, Serialize};

/// Port direction as seen from inside the module.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Direction {
    /// Driven by the instantiating module.
    Input,
    /// Driven by this module.
    Output,
}

/// A module port.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Port {
    /// Port name, unique within the module.
    pub name: Ident,
    /// Direction.
    pub direction: Direction,
    /// The SSA value standing for the port inside the module.
    pub value: ValueId,
    /// Inner symbol; pins the port.
    pub sym: Option<Ident>,
    /// Annotations attached to the port.
    pub annotations: Vec<Annotation>,
    /// Source location.
    pub loc: Loc,
}

impl Port {
    /// Returns `true` if a symbol or annotation forbids removing the port.
    pub fn is_pinned(&self) -> bool {
        self.sym.is_some() || self.annotations.iter().any(|a| a.pins())
    }
}

/// Where an SSA value is defined.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum ValueDef {
    /// The module port at this index.
    Port(u32),
    /// Result `index` of operation `op`.
    Result {
        /// Defining operation.
        op: OpId,
        /// Result position.
        index: u32,
    },
}

/// A single use of a value: operand `operand` of operation `op`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Use {
    /// The using operation.
    pub op: OpId,
    /// Operand position within the user.
    pub operand: u32,
}

/// Per-value data: type, definition site, and back-references to users.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValueData {
    /// The value's type.
    pub ty: Type,
    /// The single definition.
    pub def: ValueDef,
    /// Every use, in no particular order.
    pub uses: Vec<Use>,
}

/// Whether a module may be referenced from outside the circuit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Visibility {
    /// Externally visible; its port list is an interface contract.
    Public,
    /// Only reachable through instances inside the circuit.
    Private,
}

/// How the inliner treats a module.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum InlineMode {
    /// Left as a separate module.
    #[default]
    None,
    /// Substituted into each instantiation site.
    Inline,
    /// Its whole sub-hierarchy is substituted into it.
    Flatten,
}

/// A hardware module.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Module {
    /// Symbol name, unique within the circuit.
    pub name: Ident,
    /// Ordered port list.
    pub ports: Vec<Port>,
    /// Visibility.
    pub visibility: Visibility,
    /// Defined outside the circuit; the body is opaque and empty.
    pub external: bool,
    /// Inlining request.
    pub inline: InlineMode,
    /// Module annotations.
    pub annotations: Vec<Annotation>,
    /// Source location.
    pub loc: Loc,
    values: Arena<ValueId, ValueData>,
    ops: Arena<OpId, Op>,
}

impl Module {
    /// Creates an empty private module.
    pub fn new(name: Ident) -> Self {
        Self {
            name,
            ports: Vec::new(),
            visibility: Visibility::Private,
            external: false,
            inline: InlineMode::None,
            annotations: Vec::new(),
            loc: Loc::Unknown,
            values: Arena::new(),
            ops: Arena::new(),
        }
    }

    /// Returns `true` for public modules.
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    /// Returns `true` if the module carries the annotation.
    pub fn has_annotation(&self, annotation: Annotation) -> bool {
        self.annotations.contains(&annotation)
    }

    // -- ports --

    /// Appends a port and returns its value.
    pub fn add_port(&mut self, name: Ident, direction: Direction, ty: Type) -> ValueId {
        let index = self.ports.len() as u32;
        let value = self.values.alloc(ValueData {
            ty,
            def: ValueDef::Port(index),
            uses: Vec::new(),
        });
        self.ports.push(Port {
            name,
            direction,
            value,
            sym: None,
            annotations: Vec::new(),
            loc: Loc::Unknown,
        });
        value
    }

    /// Index of the port whose value is `value`.
    pub fn port_index(&self, value: ValueId) -> Option<usize> {
        match self.values.try_get(value)?.def {
            ValueDef::Port(index) => Some(index as usize),
            ValueDef::Result { .. } => None,
        }
    }

    /// Port types in port order.
    pub fn port_types(&self) -> Vec<Type> {
        self.ports
            .iter()
            .map(|p| self.values[p.value].ty.clone())
            .collect()
    }

    /// Removes the ports at `indices`.
    ///
    /// The port values must already be unused inside the module.
    pub fn erase_ports(&mut self, indices: &[usize]) -> KilnResult<()> {
        for &index in indices {
            let port = self
                .ports
                .get(index)
                .ok_or_else(|| InternalError::new(format!("port index {index} out of range")))?;
            if !self.values[port.value].uses.is_empty() {
                return Err(InternalError::new(format!(
                    "erasing port {index} that still has uses"
                )));
            }
        }
        let mut index = 0;
        let mut removed = Vec::new();
        self.ports.retain(|port| {
            let keep = !indices.contains(&index);
            if !keep {
                removed.push(port.value);
            }
            index += 1;
            keep
        });
        for value in removed {
            self.values.remove(value);
        }
        for (i, port) in self.ports.iter().enumerate() {
            self.values[port.value].def = ValueDef::Port(i as u32);
        }
        Ok(())
    }

    // -- values --

    /// Returns the value data.
    pub fn value(&self, value: ValueId) -> &ValueData {
        &self.values[value]
    }

    /// Returns the value data if the value is live.
    pub fn try_value(&self, value: ValueId) -> Option<&ValueData> {
        self.values.try_get(value)
    }

    /// Returns the value's type.
    pub fn value_type(&self, value: ValueId) -> &Type {
        &self.values[value].ty
    }

    /// Overwrites a value's type. Used by width resolution.
    pub fn set_value_type(&mut self, value: ValueId, ty: Type) {
        self.values[value].ty = ty;
    }

    /// Iterates over live values.
    pub fn values(&self) -> impl Iterator<Item = (ValueId, &ValueData)> {
        self.values.iter()
    }

    /// The defining operation, or `None` for ports.
    pub fn defining_op(&self, value: ValueId) -> Option<OpId> {
        match self.values.try_get(value)?.def {
            ValueDef::Result { op, .. } => Some(op),
            ValueDef::Port(_) => None,
        }
    }

    /// The defining operation's kind, or `None` for ports.
    pub fn defining_kind(&self, value: ValueId) -> Option<&OpKind> {
        self.defining_op(value).map(|op| &self.ops[op].kind)
    }

    /// All uses of a value.
    pub fn uses(&self, value: ValueId) -> &[Use] {
        &self.values[value].uses
    }

    /// Returns `true` if anything uses the value.
    pub fn has_uses(&self, value: ValueId) -> bool {
        !self.values[value].uses.is_empty()
    }

    /// Distinct operations using the value.
    pub fn users(&self, value: ValueId) -> Vec<OpId> {
        let mut users: Vec<OpId> = self.values[value].uses.iter().map(|u| u.op).collect();
        users.sort();
        users.dedup();
        users
    }

    /// Connect operations whose destination is `value`.
    pub fn drivers(&self, value: ValueId) -> Vec<OpId> {
        self.values[value]
            .uses
            .iter()
            .filter(|u| u.operand == 0 && matches!(self.ops[u.op].kind, OpKind::Connect(_)))
            .map(|u| u.op)
            .collect()
    }

    /// Returns `true` if every use of `value` is as a connect destination.
    pub fn only_written(&self, value: ValueId) -> bool {
        self.values[value]
            .uses
            .iter()
            .all(|u| u.operand == 0 && matches!(self.ops[u.op].kind, OpKind::Connect(_)))
    }

    /// Human-readable name of a value for diagnostics, e.g. `Top.count`.
    pub fn describe_value(&self, value: ValueId, interner: &Interner) -> String {
        let module = interner.resolve(self.name);
        let local = match self.values.try_get(value).map(|d| d.def) {
            Some(ValueDef::Port(index)) => interner.resolve(self.ports[index as usize].name).to_string(),
            Some(ValueDef::Result { op, index }) => {
                let data = &self.ops[op];
                match (data.name, data.results.len()) {
                    (Some(name), 1) => interner.resolve(name).to_string(),
                    (Some(name), _) => format!("{}.{index}", interner.resolve(name)),
                    (None, _) => format!("%{} ({})", value.as_raw(), data.kind.mnemonic()),
                }
            }
            None => format!("%{}", value.as_raw()),
        };
        format!("{module}.{local}")
    }

    /// Location of the entity defining `value`.
    pub fn value_loc(&self, value: ValueId) -> Loc {
        match self.values.try_get(value).map(|d| d.def) {
            Some(ValueDef::Port(index)) => self.ports[index as usize].loc,
            Some(ValueDef::Result { op, .. }) => self.ops[op].loc,
            None => Loc::Unknown,
        }
    }

    // -- operations --

    /// Creates an operation with fresh result values of the given types.
    pub fn add_op(&mut self, kind: OpKind, operands: Vec<ValueId>, result_types: Vec<Type>) -> OpId {
        let op = self.ops.alloc(Op {
            kind,
            operands: Vec::new(),
            results: Vec::new(),
            name: None,
            sym: None,
            annotations: Vec::new(),
            loc: Loc::Unknown,
        });
        let results = result_types
            .into_iter()
            .enumerate()
            .map(|(index, ty)| {
                self.values.alloc(ValueData {
                    ty,
                    def: ValueDef::Result {
                        op,
                        index: index as u32,
                    },
                    uses: Vec::new(),
                })
            })
            .collect();
        for (index, &operand) in operands.iter().enumerate() {
            self.values[operand].uses.push(Use {
                op,
                operand: index as u32,
            });
        }
        let data = &mut self.ops[op];
        data.operands = operands;
        data.results = results;
        op
    }

    /// Returns the operation.
    pub fn op(&self, op: OpId) -> &Op {
        &self.ops[op]
    }

    /// Returns the operation if it is live.
    pub fn try_op(&self, op: OpId) -> Option<&Op> {
        self.ops.try_get(op)
    }

    /// Returns the operation for metadata edits.
    ///
    /// Operands and results must be changed through [`set_operand`](Self::set_operand)
    /// and friends, never directly.
    pub fn op_mut(&mut self, op: OpId) -> &mut Op {
        &mut self.ops[op]
    }

    /// Returns `true` if the operation is live.
    pub fn contains_op(&self, op: OpId) -> bool {
        self.ops.contains(op)
    }

    /// Iterates over live operations in creation order.
    pub fn ops(&self) -> impl Iterator<Item = (OpId, &Op)> {
        self.ops.iter()
    }

    /// Snapshot of live operation IDs in creation order.
    pub fn op_ids(&self) -> Vec<OpId> {
        self.ops.ids()
    }

    /// Number of live operations.
    pub fn num_ops(&self) -> usize {
        self.ops.len()
    }

    /// The single result of a one-result operation.
    pub fn result(&self, op: OpId) -> KilnResult<ValueId> {
        self.ops[op].result().ok_or_else(|| {
            InternalError::new(format!(
                "{} does not have exactly one result",
                self.ops[op].kind.mnemonic()
            ))
        })
    }

    /// Instance operations in creation order.
    pub fn instances(&self) -> impl Iterator<Item = (OpId, &InstanceInfo)> {
        self.ops
            .iter()
            .filter_map(|(id, op)| op.instance().map(|info| (id, info)))
    }

    /// Redirects operand `index` of `op` to `value`.
    pub fn set_operand(&mut self, op: OpId, index: usize, value: ValueId) {
        let old = self.ops[op].operands[index];
        if old == value {
            return;
        }
        let slot = Use {
            op,
            operand: index as u32,
        };
        self.values[old].uses.retain(|u| *u != slot);
        self.values[value].uses.push(slot);
        self.ops[op].operands[index] = value;
    }

    /// Replaces every use of `old` with `new`, returning the affected users.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) -> Vec<OpId> {
        self.replace_uses_where(old, new, |_| true)
    }

    /// Replaces the uses of `old` accepted by `pred` with `new`.
    pub fn replace_uses_where(
        &mut self,
        old: ValueId,
        new: ValueId,
        pred: impl Fn(Use) -> bool,
    ) -> Vec<OpId> {
        if old == new {
            return Vec::new();
        }
        let uses = std::mem::take(&mut self.values[old].uses);
        let (moved, kept): (Vec<Use>, Vec<Use>) = uses.into_iter().partition(|u| pred(*u));
        self.values[old].uses = kept;
        let mut users = Vec::with_capacity(moved.len());
        for u in moved {
            self.ops[u.op].operands[u.operand as usize] = new;
            self.values[new].uses.push(u);
            users.push(u.op);
        }
        users.sort();
        users.dedup();
        users
    }

    /// Erases an operation whose results have no remaining uses.
    pub fn erase_op(&mut self, op: OpId) -> KilnResult<()> {
        let data = self
            .ops
            .try_get(op)
            .ok_or_else(|| InternalError::new("erasing an operation twice"))?;
        if data.results.iter().any(|r| !self.values[*r].uses.is_empty()) {
            return Err(InternalError::new(format!(
                "erasing {} whose results are still used",
                data.kind.mnemonic()
            )));
        }
        let Some(data) = self.ops.remove(op) else {
            return Ok(());
        };
        for (index, operand) in data.operands.iter().enumerate() {
            let slot = Use {
                op,
                operand: index as u32,
            };
            if let Some(v) = self.values.try_get_mut(*operand) {
                v.uses.retain(|u| *u != slot);
            }
        }
        for result in data.results {
            self.values.remove(result);
        }
        Ok(())
    }

    /// Replaces the single result of `op` with `value` and erases `op`.
    pub fn replace_op_with_value(&mut self, op: OpId, value: ValueId) -> KilnResult<Vec<OpId>> {
        let result = self.result(op)?;
        let users = self.replace_all_uses(result, value);
        self.erase_op(op)?;
        Ok(users)
    }

    /// Replaces `op` with a new operation whose results take over the old ones
    /// position by position. Metadata is carried over.
    pub fn rebuild_op(
        &mut self,
        op: OpId,
        kind: OpKind,
        operands: Vec<ValueId>,
        result_types: Vec<Type>,
    ) -> KilnResult<OpId> {
        if self.ops[op].results.len() != result_types.len() {
            return Err(InternalError::new(format!(
                "rebuilding {} with a different result count",
                self.ops[op].kind.mnemonic()
            )));
        }
        let new = self.add_op(kind, operands, result_types);
        self.copy_metadata(op, new);
        let pairs: Vec<(ValueId, ValueId)> = self.ops[op]
            .results
            .iter()
            .copied()
            .zip(self.ops[new].results.iter().copied())
            .collect();
        for (old, fresh) in pairs {
            self.replace_all_uses(old, fresh);
        }
        self.erase_op(op)?;
        Ok(new)
    }

    /// Copies name hint, symbol, annotations, and location from `from` to `to`.
    pub fn copy_metadata(&mut self, from: OpId, to: OpId) {
        let src = &self.ops[from];
        let (name, sym, annotations, loc) = (src.name, src.sym, src.annotations.clone(), src.loc);
        let dst = &mut self.ops[to];
        dst.name = name;
        dst.sym = sym;
        dst.annotations = annotations;
        dst.loc = loc;
    }

    /// Rebuilds an instance keeping only the ports at `keep` (ascending).
    ///
    /// Connects driving a dropped result are erased; any other remaining use
    /// of a dropped result is an internal error.
    pub fn rebuild_instance(&mut self, op: OpId, keep: &[usize]) -> KilnResult<OpId> {
        let Some(info) = self.ops[op].instance().cloned() else {
            return Err(InternalError::new("rebuild_instance on a non-instance"));
        };
        let old_results = self.ops[op].results.clone();
        for (index, &result) in old_results.iter().enumerate() {
            if keep.contains(&index) {
                continue;
            }
            for driver in self.drivers(result) {
                self.erase_op(driver)?;
            }
            if self.has_uses(result) {
                return Err(InternalError::new(format!(
                    "dropping instance port {index} that is still read"
                )));
            }
        }
        let port_names = keep.iter().map(|&i| info.port_names[i]).collect();
        let types = keep
            .iter()
            .map(|&i| self.values[old_results[i]].ty.clone())
            .collect();
        let new = self.add_op(
            OpKind::Instance(InstanceInfo {
                module: info.module,
                port_names,
            }),
            Vec::new(),
            types,
        );
        self.copy_metadata(op, new);
        for (pos, &index) in keep.iter().enumerate() {
            let fresh = self.ops[new].results[pos];
            self.replace_all_uses(old_results[index], fresh);
        }
        self.erase_op(op)?;
        Ok(new)
    }

    /// Returns `true` if the op is pure, unpinned, and its results are unused.
    pub fn is_trivially_dead(&self, op: OpId) -> bool {
        let data = &self.ops[op];
        data.kind.is_pure()
            && !data.is_pinned()
            && data.results.iter().all(|r| self.values[*r].uses.is_empty())
    }

    /// Erases trivially dead operations until none remain, returning the count.
    pub fn erase_trivially_dead(&mut self) -> KilnResult<usize> {
        let mut worklist = self.op_ids();
        let mut erased = 0;
        while let Some(op) = worklist.pop() {
            if !self.ops.contains(op) || !self.is_trivially_dead(op) {
                continue;
            }
            let operands = self.ops[op].operands.clone();
            self.erase_op(op)?;
            erased += 1;
            worklist.extend(operands.into_iter().filter_map(|v| self.defining_op(v)));
        }
        Ok(erased)
    }

    /// Adds a connect from `src` into `dest`.
    pub fn connect(&mut self, kind: ConnectKind, dest: ValueId, src: ValueId) -> OpId {
        self.add_op(OpKind::Connect(kind), vec![dest, src], Vec::new())
    }
}
