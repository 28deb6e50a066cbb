//! Middle layer - compilation context, scopes and polymorph records

mod context;
mod polymorph;
mod scope;

pub use context::{CompilationContext, FnId, MethodEntry, Package, PackageId, Reification, Unit};
pub use polymorph::{Polymorph, PolymorphId};
pub use scope::{Binding, ReleasePlan, Scope, ScopeId, ScopeKind, Var, VarFlags, VarId};
