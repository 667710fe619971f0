//! The back end of the Cminor compiler: lowers a resolved, type-checked C
//! AST onto the JVM and produces verifier-ready class files.
//!
//! C and the JVM disagree on most things that matter here: raw pointers vs
//! typed references, value vs reference aggregates, addressable locals vs
//! plain slots, free-form `goto` vs verified branch targets. The lowering
//! answers each mismatch:
//!
//! - pointers become small wrapper objects (`__intPtr`, `__charPtr`, ...)
//!   holding a base array and an offset ([`jvm_types`]),
//! - struct and array assignment copies deeply,
//! - address-taken locals are boxed into one-element arrays ("heap lift"),
//! - structured and unstructured control flow runs through labels whose
//!   frames feed the `StackMapTable`.
//!
//! [`codegen::Codegen`] drives one translation unit into one class; the
//! class-file mechanics (constant pool, code builder, serializer) live in
//! the `crema` crate.

pub mod ast;
pub mod codegen;
pub mod context;
pub mod jvm_types;

pub use codegen::{Codegen, GeneratedClass};
