// Copyright 2026 the Bitstack Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Program-level metadata the VM consumes: function and module identities,
//! concrete type descriptors, symbolic bindings, per-module type-info tables,
//! and the bytecode cache that produces compiled callees on demand.
//!
//! The front-end compiler is an external collaborator; this module only
//! models the tables it hands over.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use hashbrown::HashMap;

use crate::bytecode::BytecodeFunction;

/// Module identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModuleId(pub u32);

/// Function identifier, unique across modules.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FnId(pub u32);

/// Identifier of one invocation site, used to look up instantiation
/// type-info for parametric callees.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct InvocationId(pub u32);

/// Declaration-level facts about a user function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FnDecl {
    /// Function identity.
    pub id: FnId,
    /// Owning module.
    pub module: ModuleId,
    /// Source name, for diagnostics.
    pub name: String,
    /// Number of formal parameters.
    pub param_count: usize,
    /// Whether the function has unresolved type parameters.
    pub parametric: bool,
}

/// An enum type definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumDef {
    /// Source name.
    pub name: String,
    /// Signedness of the underlying bits type.
    pub signed: bool,
    /// Width of the underlying bits type.
    pub width: usize,
}

/// A concrete type descriptor, as attached to `cast` and `width-slice`
/// opcodes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeDesc {
    /// Bits of fixed width and signedness.
    Bits {
        /// Two's-complement interpretation.
        signed: bool,
        /// Width in bits.
        width: usize,
    },
    /// Fixed-length array.
    Array {
        /// Element type.
        elem: Box<TypeDesc>,
        /// Element count.
        len: usize,
    },
    /// Fixed-arity tuple.
    Tuple(Vec<TypeDesc>),
    /// Enum over an underlying bits type.
    Enum(Rc<EnumDef>),
    /// The token type.
    Token,
}

impl TypeDesc {
    /// An array descriptor.
    #[must_use]
    pub fn array_of(elem: TypeDesc, len: usize) -> Self {
        Self::Array {
            elem: Box::new(elem),
            len,
        }
    }

    /// Total flat bit count of the described type.
    #[must_use]
    pub fn total_bit_count(&self) -> usize {
        match self {
            Self::Bits { width, .. } => *width,
            Self::Array { elem, len } => elem.total_bit_count() * len,
            Self::Tuple(elems) => elems.iter().map(Self::total_bit_count).sum(),
            Self::Enum(def) => def.width,
            Self::Token => 0,
        }
    }
}

/// Resolved symbolic bindings: an ordered map from type-parameter names to
/// constants, identifying one instantiation of a parametric function.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SymBindings(Vec<(String, u64)>);

impl SymBindings {
    /// Builds bindings from `pairs`; order of insertion does not matter.
    #[must_use]
    pub fn new(mut pairs: Vec<(String, u64)>) -> Self {
        pairs.sort();
        Self(pairs)
    }

    /// The bound value of `name`, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<u64> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, v)| v)
    }

    /// The sorted `(name, value)` pairs.
    #[must_use]
    pub fn entries(&self) -> &[(String, u64)] {
        &self.0
    }
}

impl fmt::Display for SymBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

/// Type information for one module scope or one parametric instantiation.
///
/// The interpreter never inspects types through this beyond identity; it
/// threads the right table to each frame so the cache can compile callees
/// under the right instantiation.
#[derive(Debug)]
pub struct TypeInfo {
    module: ModuleId,
    instantiations: RefCell<HashMap<(InvocationId, SymBindings), Rc<TypeInfo>>>,
}

impl TypeInfo {
    /// An empty table for `module`.
    #[must_use]
    pub fn new(module: ModuleId) -> Self {
        Self {
            module,
            instantiations: RefCell::new(HashMap::new()),
        }
    }

    /// The owning module.
    #[must_use]
    pub fn module(&self) -> ModuleId {
        self.module
    }

    /// Registers the type-info for a parametric instantiation at
    /// `invocation` under `caller_bindings`.
    pub fn add_instantiation(
        &self,
        invocation: InvocationId,
        caller_bindings: SymBindings,
        type_info: Rc<TypeInfo>,
    ) {
        self.instantiations
            .borrow_mut()
            .insert((invocation, caller_bindings), type_info);
    }

    /// Looks up the instantiation type-info for `invocation` under
    /// `caller_bindings`.
    #[must_use]
    pub fn instantiation(
        &self,
        invocation: InvocationId,
        caller_bindings: &SymBindings,
    ) -> Option<Rc<TypeInfo>> {
        self.instantiations
            .borrow()
            .get(&(invocation, caller_bindings.clone()))
            .cloned()
    }
}

/// A bytecode cache error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheError {
    /// The cache has no bytecode for the requested function/bindings and
    /// cannot compile one.
    MissingFunction {
        /// Function name.
        name: String,
    },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFunction { name } => {
                write!(f, "no bytecode available for function `{name}`")
            }
        }
    }
}

impl core::error::Error for CacheError {}

/// The sole producer of compiled bytecode for invoked callees.
///
/// Implementations map `(function identity, resolved bindings)` to compiled
/// bytecode, compiling lazily where they can. The cache appends and never
/// evicts during an interpretation.
pub trait BytecodeCache {
    /// Returns (or compiles) the bytecode for `decl` under `bindings`, with
    /// `type_info` naming the instantiation scope.
    fn get_or_create(
        &mut self,
        decl: &Rc<FnDecl>,
        type_info: Option<&Rc<TypeInfo>>,
        bindings: Option<&SymBindings>,
    ) -> Result<Rc<BytecodeFunction>, CacheError>;
}

/// A [`BytecodeCache`] backed by pre-registered entries.
///
/// This stands in for the front-end emitter, which is out of scope; tests
/// and embedders insert already-compiled functions and the VM looks them up.
#[derive(Default)]
pub struct TableCache {
    entries: HashMap<(FnId, Option<SymBindings>), Rc<BytecodeFunction>>,
}

impl TableCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers bytecode for `id` under `bindings`.
    pub fn insert(
        &mut self,
        id: FnId,
        bindings: Option<SymBindings>,
        bf: Rc<BytecodeFunction>,
    ) {
        self.entries.insert((id, bindings), bf);
    }
}

impl BytecodeCache for TableCache {
    fn get_or_create(
        &mut self,
        decl: &Rc<FnDecl>,
        _type_info: Option<&Rc<TypeInfo>>,
        bindings: Option<&SymBindings>,
    ) -> Result<Rc<BytecodeFunction>, CacheError> {
        self.entries
            .get(&(decl.id, bindings.cloned()))
            .cloned()
            .ok_or_else(|| CacheError::MissingFunction {
                name: decl.name.clone(),
            })
    }
}

/// Embedding data handed to the interpreter: per-module root type-info plus
/// the bytecode cache.
#[derive(Default)]
pub struct ImportData {
    roots: HashMap<ModuleId, Rc<TypeInfo>>,
    cache: Option<RefCell<Box<dyn BytecodeCache>>>,
}

impl ImportData {
    /// Empty embedding data; user-function calls will fail until a cache is
    /// attached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the root type-info for a module.
    pub fn set_root_type_info(&mut self, type_info: Rc<TypeInfo>) {
        self.roots.insert(type_info.module(), type_info);
    }

    /// The root type-info of `module`, if registered.
    #[must_use]
    pub fn root_type_info(&self, module: ModuleId) -> Option<Rc<TypeInfo>> {
        self.roots.get(&module).cloned()
    }

    /// Attaches the bytecode cache.
    pub fn set_bytecode_cache(&mut self, cache: Box<dyn BytecodeCache>) {
        self.cache = Some(RefCell::new(cache));
    }

    /// The bytecode cache, if attached.
    #[must_use]
    pub fn bytecode_cache(&self) -> Option<&RefCell<Box<dyn BytecodeCache>>> {
        self.cache.as_ref()
    }
}

impl fmt::Debug for ImportData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportData")
            .field("modules", &self.roots.len())
            .field("has_cache", &self.cache.is_some())
            .finish()
    }
}
