//! Mapping from C types to the JVM type system.
//!
//! Every non-`void*` pointer is represented by one of eight runtime wrapper
//! classes holding a `base` array and an `int` offset; `void*` maps straight
//! to `java/lang/Object`.

use anyhow::{anyhow, bail, Result};
use crema::frame::VerificationType;
use crate::ast::{CType, Decl};

/// The JVM-level category of a runtime value. Drives instruction selection
/// (`iadd` vs `ladd`, `istore` vs `astore`, `dup` vs `dup2`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValueCategory {
	Int,
	Long,
	Float,
	Double,
	Reference,
}

impl ValueCategory {
	/// `true` for the two-slot categories.
	pub fn is_wide(self) -> bool {
		matches!(self, ValueCategory::Long | ValueCategory::Double)
	}
}

/// The element-class category selecting the runtime pointer wrapper.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PointerKind {
	Char,
	Bool,
	Short,
	Int,
	Long,
	Float,
	Double,
	Object,
}

impl PointerKind {
	pub const ALL: [PointerKind; 8] = [
		PointerKind::Char, PointerKind::Bool, PointerKind::Short, PointerKind::Int,
		PointerKind::Long, PointerKind::Float, PointerKind::Double, PointerKind::Object,
	];

	/// The internal name of the wrapper class.
	pub fn class_name(self) -> &'static str {
		match self {
			PointerKind::Char => "__charPtr",
			PointerKind::Bool => "__boolPtr",
			PointerKind::Short => "__shortPtr",
			PointerKind::Int => "__intPtr",
			PointerKind::Long => "__longPtr",
			PointerKind::Float => "__floatPtr",
			PointerKind::Double => "__doublePtr",
			PointerKind::Object => "__objectPtr",
		}
	}

	/// The field descriptor of the wrapper's `base` field. Object wrappers
	/// share a single `Object[]` base regardless of the pointee class.
	pub fn base_descriptor(self) -> &'static str {
		match self {
			PointerKind::Char => "[B",
			PointerKind::Bool => "[Z",
			PointerKind::Short => "[S",
			PointerKind::Int => "[I",
			PointerKind::Long => "[J",
			PointerKind::Float => "[F",
			PointerKind::Double => "[D",
			PointerKind::Object => "[Ljava/lang/Object;",
		}
	}

	/// Whether elements of this kind occupy two stack slots.
	pub fn is_wide(self) -> bool {
		matches!(self, PointerKind::Long | PointerKind::Double)
	}
}

fn basic_descriptor(ty: &CType) -> Result<&'static str> {
	Ok(match ty {
		CType::Void => "V",
		CType::Char { .. } => "B", // Java byte for C char
		CType::Short { .. } => "S",
		CType::Bool => "Z",
		CType::Int { .. } => "I",
		CType::Long { .. } => "J",
		CType::Float => "F",
		CType::Double => "D",
		other => bail!("no basic descriptor for type {other:?}"),
	})
}

/// The field descriptor of a value of type `ty`, e.g. `I`, `[I` or
/// `L__intPtr;`.
pub fn descriptor(ty: &CType) -> Result<String> {
	Ok(match ty {
		CType::Pointer(pointee) if pointee.is_void() => "Ljava/lang/Object;".to_owned(),
		CType::Pointer(pointee) => {
			let kind = pointer_kind_of_element(pointee)?;
			format!("L{};", kind.class_name())
		},
		CType::Array { element, .. } => format!("[{}", descriptor(element)?),
		CType::Enum { .. } => "I".to_owned(),
		CType::Struct { name } => {
			if name.is_empty() {
				bail!("named type without a user type name");
			}
			format!("L{name};")
		},
		CType::Typedef { name } => bail!("unresolved typedef {name:?} in code generation"),
		basic => basic_descriptor(basic)?.to_owned(),
	})
}

/// The class form of a type, as used by `CONSTANT_Class_info`: an internal
/// class name (`java/lang/String`, `__intPtr`) or an array descriptor (`[I`).
/// Primitives come back as their single-character descriptor for uniformity.
pub fn internal_class_name(ty: &CType) -> Result<String> {
	Ok(match ty {
		CType::Pointer(pointee) if pointee.is_void() => "java/lang/Object".to_owned(),
		CType::Pointer(pointee) => pointer_kind_of_element(pointee)?.class_name().to_owned(),
		CType::Array { .. } => descriptor(ty)?,
		CType::Struct { name } => {
			if name.is_empty() {
				bail!("named type without a user type name");
			}
			name.clone()
		},
		CType::Typedef { name } => bail!("unresolved typedef {name:?} in code generation"),
		other => descriptor(other)?,
	})
}

fn pointer_kind_of_element(element: &CType) -> Result<PointerKind> {
	Ok(match element {
		CType::Pointer(_) | CType::Array { .. } | CType::Void | CType::Struct { .. } => PointerKind::Object,
		CType::Enum { .. } => PointerKind::Int,
		CType::Char { .. } => PointerKind::Char,
		CType::Bool => PointerKind::Bool,
		CType::Short { .. } => PointerKind::Short,
		CType::Int { .. } => PointerKind::Int,
		CType::Long { .. } => PointerKind::Long,
		CType::Float => PointerKind::Float,
		CType::Double => PointerKind::Double,
		CType::Typedef { name } => bail!("unresolved typedef {name:?} as pointer element"),
	})
}

/// The wrapper kind of a pointer type (or of an element type directly).
///
/// Stable: the same C type always maps to the same kind.
pub fn pointer_kind(ty: &CType) -> Result<PointerKind> {
	match ty {
		CType::Pointer(pointee) => pointer_kind_of_element(pointee),
		other => pointer_kind_of_element(other),
	}
}

/// The descriptor of the array a pointer's `base` field holds. Object-kind
/// pointers all use `[Ljava/lang/Object;`.
pub fn pointer_base_array_descriptor(ty: &CType) -> Result<String> {
	let pointee = match ty {
		CType::Pointer(pointee) => pointee,
		other => bail!("expected a pointer type, got {other:?}"),
	};
	let kind = pointer_kind_of_element(pointee)?;
	Ok(if kind == PointerKind::Object {
		kind.base_descriptor().to_owned()
	} else {
		format!("[{}", descriptor(pointee)?)
	})
}

pub fn value_category(ty: &CType) -> ValueCategory {
	match ty {
		CType::Enum { .. } => ValueCategory::Int,
		CType::Long { .. } => ValueCategory::Long,
		CType::Float => ValueCategory::Float,
		CType::Double => ValueCategory::Double,
		CType::Char { .. } | CType::Short { .. } | CType::Int { .. } | CType::Bool => ValueCategory::Int,
		_ => ValueCategory::Reference,
	}
}

/// The category of a declaration's storage. Heap-lifted variables live in a
/// one-element array, so their storage is a reference no matter the C type.
pub fn decl_value_category(decl: &Decl) -> ValueCategory {
	if decl.needs_heap_lift {
		ValueCategory::Reference
	} else {
		value_category(&decl.ty)
	}
}

/// The category of one array element, for `Xaload`/`Xastore` selection.
pub fn array_element_category(array_ty: &CType) -> Result<ValueCategory> {
	let element = array_ty.child()
		.ok_or_else(|| anyhow!("expected an array type, got {array_ty:?}"))?;
	Ok(value_category(element))
}

/// The descriptor of one element of an array type.
pub fn array_element_descriptor(array_ty: &CType) -> Result<String> {
	let element = array_ty.child()
		.ok_or_else(|| anyhow!("expected an array type, got {array_ty:?}"))?;
	descriptor(element)
}

/// The descriptor of the one-element array a heap-lifted variable is boxed
/// into. References box into `Object[]`.
pub fn heap_lift_array_descriptor(ty: &CType) -> &'static str {
	match ty {
		CType::Pointer(_) | CType::Array { .. } | CType::Struct { .. } => "[Ljava/lang/Object;",
		CType::Char { .. } => "[B",
		CType::Bool => "[Z",
		CType::Short { .. } => "[S",
		CType::Long { .. } => "[J",
		CType::Float => "[F",
		CType::Double => "[D",
		_ => "[I", // int, enum
	}
}

/// The `atype` operand of `newarray` for a primitive element type.
pub fn newarray_type_code(element: &CType) -> u8 {
	use crema::class_constants::atype;
	match element {
		CType::Double => atype::T_DOUBLE,
		CType::Float => atype::T_FLOAT,
		CType::Long { .. } => atype::T_LONG,
		CType::Char { .. } => atype::T_BYTE, // C char is a Java byte
		CType::Short { .. } => atype::T_SHORT,
		CType::Bool => atype::T_BOOLEAN,
		_ => atype::T_INT,
	}
}

/// The verification type of a value of type `ty`.
pub fn verification_type(ty: &CType) -> Result<VerificationType> {
	Ok(match value_category(ty) {
		ValueCategory::Int => VerificationType::Integer,
		ValueCategory::Long => VerificationType::Long,
		ValueCategory::Float => VerificationType::Float,
		ValueCategory::Double => VerificationType::Double,
		ValueCategory::Reference => VerificationType::Object(internal_class_name(ty)?),
	})
}

/// The verification type of a declaration's storage slot.
pub fn decl_verification_type(decl: &Decl) -> Result<VerificationType> {
	if decl.needs_heap_lift {
		Ok(VerificationType::object(heap_lift_array_descriptor(&decl.ty)))
	} else {
		verification_type(&decl.ty)
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::ast::{CType, Decl};
	use super::{decl_value_category, descriptor, internal_class_name, pointer_base_array_descriptor, pointer_kind, value_category, PointerKind, ValueCategory};

	#[test]
	fn primitive_descriptors() -> Result<()> {
		assert_eq!(descriptor(&CType::int())?, "I");
		assert_eq!(descriptor(&CType::char(false))?, "B");
		assert_eq!(descriptor(&CType::Bool)?, "Z");
		assert_eq!(descriptor(&CType::long())?, "J");
		assert_eq!(descriptor(&CType::Enum { name: "Color".to_owned() })?, "I");
		Ok(())
	}

	#[test]
	fn pointer_descriptors() -> Result<()> {
		assert_eq!(descriptor(&CType::pointer_to(CType::int()))?, "L__intPtr;");
		assert_eq!(descriptor(&CType::pointer_to(CType::Void))?, "Ljava/lang/Object;");
		assert_eq!(descriptor(&CType::pointer_to(CType::pointer_to(CType::int())))?, "L__objectPtr;");
		assert_eq!(descriptor(&CType::pointer_to(CType::struct_named("Point")))?, "L__objectPtr;");
		Ok(())
	}

	#[test]
	fn array_and_struct_descriptors() -> Result<()> {
		assert_eq!(descriptor(&CType::array_of(CType::int(), 4))?, "[I");
		assert_eq!(descriptor(&CType::array_of(CType::array_of(CType::Double, 2), 3))?, "[[D");
		assert_eq!(descriptor(&CType::struct_named("Point"))?, "LPoint;");
		Ok(())
	}

	#[test]
	fn unresolved_typedef_is_fatal() {
		assert!(descriptor(&CType::Typedef { name: "size_t".to_owned() }).is_err());
	}

	#[test]
	fn class_names() -> Result<()> {
		assert_eq!(internal_class_name(&CType::struct_named("Point"))?, "Point");
		assert_eq!(internal_class_name(&CType::pointer_to(CType::int()))?, "__intPtr");
		assert_eq!(internal_class_name(&CType::array_of(CType::int(), 2))?, "[I");
		assert_eq!(internal_class_name(&CType::int())?, "I");
		Ok(())
	}

	#[test]
	fn pointer_kinds() -> Result<()> {
		assert_eq!(pointer_kind(&CType::pointer_to(CType::char(true)))?, PointerKind::Char);
		assert_eq!(pointer_kind(&CType::pointer_to(CType::Enum { name: "E".to_owned() }))?, PointerKind::Int);
		assert_eq!(pointer_kind(&CType::pointer_to(CType::struct_named("S")))?, PointerKind::Object);
		assert_eq!(pointer_kind(&CType::pointer_to(CType::pointer_to(CType::Float)))?, PointerKind::Object);
		Ok(())
	}

	#[test]
	fn element_descriptors() -> Result<()> {
		use super::array_element_descriptor;
		assert_eq!(array_element_descriptor(&CType::array_of(CType::int(), 4))?, "I");
		assert_eq!(
			array_element_descriptor(&CType::array_of(CType::pointer_to(CType::char(false)), 2))?,
			"L__charPtr;",
		);
		assert!(array_element_descriptor(&CType::int()).is_err());
		Ok(())
	}

	#[test]
	fn base_array_descriptors() -> Result<()> {
		assert_eq!(pointer_base_array_descriptor(&CType::pointer_to(CType::int()))?, "[I");
		assert_eq!(pointer_base_array_descriptor(&CType::pointer_to(CType::char(false)))?, "[B");
		assert_eq!(pointer_base_array_descriptor(&CType::pointer_to(CType::struct_named("S")))?, "[Ljava/lang/Object;");
		assert_eq!(pointer_base_array_descriptor(&CType::pointer_to(CType::pointer_to(CType::int())))?, "[Ljava/lang/Object;");
		Ok(())
	}

	#[test]
	fn categories_follow_storage() {
		assert_eq!(value_category(&CType::char(false)), ValueCategory::Int);
		assert_eq!(value_category(&CType::long()), ValueCategory::Long);
		assert_eq!(value_category(&CType::pointer_to(CType::int())), ValueCategory::Reference);

		// heap-lifted storage is an array even for an int
		let mut decl = Decl::local("x", CType::int());
		decl.needs_heap_lift = true;
		assert_eq!(decl_value_category(&decl), ValueCategory::Reference);
	}
}
