//! Built-in functions module
//!
//! The runtime only ships the builtins it depends on itself, organized by
//! category:
//! - Basic: copy, range, delete
//! - Types: type construction and the type-system container builders
//!
//! Hosts add their own through [`register_builtin`].

pub mod basic;
pub mod registry;
pub mod types;

pub use registry::{
    builtin_by_name, builtin_index, builtin_value, register_builtin, snapshot, BuiltinEntry,
    BuiltinRegistry,
};

/// Create and populate the built-in function registry
///
/// Index order is part of the bytecode contract: compilers emit these
/// indices in `GetBuiltin`.
pub fn create_builtin_registry() -> BuiltinRegistry {
    let mut registry = BuiltinRegistry::new();

    // ========================================================================
    // Basic
    // ========================================================================
    registry.register("copy", basic::builtin_copy, false);
    registry.register("range", basic::builtin_range, false);
    registry.register("delete", basic::builtin_delete, false);

    // ========================================================================
    // Types
    // ========================================================================
    registry.register("type", types::builtin_type, false);
    registry.register("typeof", types::builtin_typeof, false);
    registry.register("field", types::builtin_field, false);
    registry.register("fields", types::builtin_fields, false);
    registry.register("method", types::builtin_method, false);
    registry.register("methods", types::builtin_methods, false);
    registry.register("property", types::builtin_property, false);
    registry.register("properties", types::builtin_properties, false);
    registry.register("get_methods", types::builtin_get_methods, true);

    registry
}
