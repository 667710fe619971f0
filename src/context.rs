//! Per-translation-unit code generation state.
//!
//! One [`Context`] is created per unit and dropped with it: the class-wide
//! constant pool, the registered struct classes and functions, the method
//! descriptor cache, and the set of pointer wrapper kinds the generated code
//! referenced.

use std::collections::HashSet;
use anyhow::{anyhow, Result};
use indexmap::IndexMap;
use crema::pool::{CalleeInfo, ConstantPool};
use crate::ast::{CType, FuncId, StructDef, TranslationUnit};
use crate::jvm_types::{self, PointerKind};

/// How a union is laid out on the JVM.
///
/// C unions have no direct JVM counterpart; the three shapes the compiler
/// accepts are lowered to a single physical field.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnionKind {
	NotUnion,
	/// `union { int; float; }` stored as `_bits: int`, float members go
	/// through `Float.intBitsToFloat`/`floatToRawIntBits`.
	PunIntFloat,
	/// `union { long; double; }` stored as `_bits: long`.
	PunLongDouble,
	/// A union of reference and/or boxed members stored as `_ref: Object`.
	Reference,
}

#[derive(Debug, Clone)]
pub struct ClassField {
	pub name: String,
	pub ty: CType,
}

/// A struct or union registered as a generated class.
#[derive(Debug, Clone)]
pub struct ClassDef {
	pub name: String,
	pub union_kind: UnionKind,
	pub fields: Vec<ClassField>,
}

impl ClassDef {
	pub fn field_index(&self, name: &str) -> Option<usize> {
		self.fields.iter().position(|f| f.name == name)
	}
}

fn classify_union(def: &StructDef) -> UnionKind {
	if !def.is_union {
		return UnionKind::NotUnion;
	}

	let all_int_float = def.fields.iter().all(|f| f.ty.is_int() || f.ty.is_float());
	if all_int_float && def.fields.iter().any(|f| f.ty.is_float()) {
		return UnionKind::PunIntFloat;
	}

	let all_long_double = def.fields.iter().all(|f| f.ty.is_long() || f.ty.is_double());
	if all_long_double && def.fields.iter().any(|f| f.ty.is_double()) {
		return UnionKind::PunLongDouble;
	}

	UnionKind::Reference
}

/// A function registered for the class being generated.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
	pub func: FuncId,
	pub pool_index: u16,
	pub is_main: bool,
}

#[derive(Debug)]
pub struct Context {
	pub class_name: String,
	pub pool: ConstantPool,
	pub class_defs: Vec<ClassDef>,
	pub functions: Vec<FunctionInfo>,
	method_descriptors: IndexMap<FuncId, String>,
	/// The wrapper kinds referenced by generated code, for selective emission
	/// of the runtime wrapper classes.
	ptr_usage: HashSet<PointerKind>,
}

impl Context {
	pub fn new(class_name: &str) -> Context {
		Context {
			class_name: class_name.to_owned(),
			pool: ConstantPool::new(),
			class_defs: Vec::new(),
			functions: Vec::new(),
			method_descriptors: IndexMap::new(),
			ptr_usage: HashSet::new(),
		}
	}

	pub fn mark_ptr_usage(&mut self, kind: PointerKind) {
		self.ptr_usage.insert(kind);
	}

	pub fn used_ptr_kinds(&self) -> Vec<PointerKind> {
		let mut kinds: Vec<PointerKind> = PointerKind::ALL.into_iter()
			.filter(|kind| self.ptr_usage.contains(kind))
			.collect();
		kinds.sort_by_key(|kind| kind.class_name());
		kinds
	}

	pub fn find_class(&self, name: &str) -> Option<&ClassDef> {
		self.class_defs.iter().find(|cd| cd.name == name)
	}

	pub fn require_class(&self, name: &str) -> Result<&ClassDef> {
		self.find_class(name)
			.ok_or_else(|| anyhow!("struct {name:?} not registered as a class"))
	}

	/// Registers one struct definition as a class, folding unions to their
	/// physical single-field layout. Duplicates (headers included in several
	/// units) are ignored.
	pub fn register_struct(&mut self, def: &StructDef) {
		if def.name.is_empty() || self.find_class(&def.name).is_some() {
			return;
		}

		let union_kind = classify_union(def);
		let fields = match union_kind {
			UnionKind::PunIntFloat => vec![ClassField { name: "_bits".to_owned(), ty: CType::int() }],
			UnionKind::PunLongDouble => vec![ClassField { name: "_bits".to_owned(), ty: CType::long() }],
			UnionKind::Reference => vec![ClassField {
				name: "_ref".to_owned(),
				ty: CType::struct_named("java/lang/Object"),
			}],
			UnionKind::NotUnion => def.fields.iter()
				.map(|f| ClassField { name: f.name.clone(), ty: f.ty.clone() })
				.collect(),
		};

		self.class_defs.push(ClassDef {
			name: def.name.clone(),
			union_kind,
			fields,
		});
	}

	pub fn union_kind_of(&self, ty: &CType) -> UnionKind {
		ty.user_type_name()
			.and_then(|name| self.find_class(name))
			.map(|cd| cd.union_kind)
			.unwrap_or(UnionKind::NotUnion)
	}

	/// `true` if `main` takes `(int argc, char *argv[])` (or `char **`).
	fn main_has_argc_argv(unit: &TranslationUnit, func: FuncId) -> bool {
		let function = unit.function(func);
		let [argc, argv] = function.params.as_slice() else {
			return false;
		};
		if !unit.decl(*argc).ty.is_int() {
			return false;
		}
		let argv_ty = &unit.decl(*argv).ty;
		if !(argv_ty.is_pointer() || argv_ty.is_array()) {
			return false;
		}
		argv_ty.child().is_some_and(|inner| {
			inner.is_pointer() && inner.child().is_some_and(CType::is_char)
		})
	}

	/// The JVM descriptor of a function, built once and cached.
	///
	/// Variadic functions carry a trailing `[Ljava/lang/Object;` for the
	/// boxed varargs array. A C `main` keeps its C-level signature, mapped to
	/// `()I` or `(I[L__charPtr;)I`.
	pub fn method_descriptor(&mut self, unit: &TranslationUnit, func: FuncId) -> Result<String> {
		if let Some(cached) = self.method_descriptors.get(&func) {
			return Ok(cached.clone());
		}

		let function = unit.function(func);
		let descriptor = if function.name == "main" {
			if Context::main_has_argc_argv(unit, func) {
				"(I[L__charPtr;)I".to_owned()
			} else {
				"()I".to_owned()
			}
		} else {
			let mut descriptor = String::from("(");
			for &param in &function.params {
				descriptor.push_str(&jvm_types::descriptor(&unit.decl(param).ty)?);
			}
			if function.is_variadic {
				descriptor.push_str("[Ljava/lang/Object;");
			}
			descriptor.push(')');
			descriptor.push_str(&jvm_types::descriptor(&function.return_type)?);
			descriptor
		};

		self.method_descriptors.insert(func, descriptor.clone());
		Ok(descriptor)
	}

	/// Interns the method reference for a call to `func` and remembers its
	/// argument count for in-class call resolution.
	pub fn add_method(&mut self, unit: &TranslationUnit, func: FuncId) -> Result<u16> {
		let descriptor = self.method_descriptor(unit, func)?;
		let function = unit.function(func);
		let class_name = function.class_name.as_deref().unwrap_or(&self.class_name).to_owned();

		let mut arg_count = function.params.len();
		if function.is_variadic {
			arg_count += 1;
		}
		let arg_count = u16::try_from(arg_count)
			.map_err(|_| anyhow!("function {:?} has too many parameters", function.name))?;

		self.pool.put_method_ref_typed(&class_name, &function.name, &descriptor, CalleeInfo { arg_count })
	}

	/// Registers the functions of the class being generated: everything with
	/// a body that is not an attribute-mapped intrinsic.
	pub fn register_functions(&mut self, unit: &TranslationUnit) -> Result<()> {
		for (index, function) in unit.functions.iter().enumerate() {
			let func = FuncId(index as u32);

			let class_name = function.class_name.as_deref().unwrap_or(&self.class_name);
			if class_name != self.class_name {
				continue;
			}
			if function.has_intrinsic_attribute() || function.body.is_none() {
				continue;
			}

			let pool_index = self.add_method(unit, func)?;
			self.functions.push(FunctionInfo {
				func,
				pool_index,
				is_main: function.name == "main",
			});
		}
		Ok(())
	}

	/// Registers every struct definition of the unit.
	pub fn register_structs(&mut self, unit: &TranslationUnit) {
		for def in &unit.structs {
			self.register_struct(def);
		}
	}

	/// The descriptor of a struct field, from the registered class table.
	pub fn struct_field_descriptor(&self, class_name: &str, field_name: &str) -> Result<String> {
		let class_def = self.require_class(class_name)?;
		let field = class_def.fields.iter()
			.find(|f| f.name == field_name)
			.ok_or_else(|| anyhow!("field {field_name:?} not found in struct {class_name:?}"))?;
		jvm_types::descriptor(&field.ty)
	}

	/// Interns a field reference to a struct field, using the registered
	/// descriptor.
	pub fn add_struct_field(&mut self, class_name: &str, field_name: &str) -> Result<u16> {
		let descriptor = self.struct_field_descriptor(class_name, field_name)?;
		self.pool.put_field_ref(class_name, field_name, &descriptor)
	}

	pub fn union_kind_by_name(&self, class_name: &str) -> UnionKind {
		self.find_class(class_name).map(|cd| cd.union_kind).unwrap_or(UnionKind::NotUnion)
	}

	/// Checked access for lowering paths that must never see an unregistered
	/// struct.
	pub fn class_field(&self, class_name: &str, index: usize) -> Result<&ClassField> {
		let class_def = self.require_class(class_name)?;
		class_def.fields.get(index)
			.ok_or_else(|| anyhow!("field index {index} out of range for struct {class_name:?}"))
	}
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use crate::ast::{CType, StructDef, StructField};
	use super::{Context, UnionKind};

	fn field(name: &str, ty: CType) -> StructField {
		StructField { name: name.to_owned(), ty }
	}

	#[test]
	fn union_classification() {
		let pun = StructDef {
			name: "Bits".to_owned(),
			is_union: true,
			fields: vec![field("i", CType::int()), field("f", CType::Float)],
		};
		let pun_wide = StructDef {
			name: "Bits64".to_owned(),
			is_union: true,
			fields: vec![field("l", CType::long()), field("d", CType::Double)],
		};
		let refs = StructDef {
			name: "Any".to_owned(),
			is_union: true,
			fields: vec![
				field("p", CType::pointer_to(CType::int())),
				field("s", CType::struct_named("S")),
			],
		};

		let mut ctx = Context::new("Main");
		ctx.register_struct(&pun);
		ctx.register_struct(&pun_wide);
		ctx.register_struct(&refs);

		let bits = ctx.find_class("Bits").expect("registered");
		assert_eq!(bits.union_kind, UnionKind::PunIntFloat);
		assert_eq!(bits.fields.len(), 1);
		assert_eq!(bits.fields[0].name, "_bits");

		assert_eq!(ctx.union_kind_by_name("Bits64"), UnionKind::PunLongDouble);
		assert_eq!(ctx.union_kind_by_name("Any"), UnionKind::Reference);
		assert_eq!(ctx.union_kind_by_name("NoSuch"), UnionKind::NotUnion);
	}

	#[test]
	fn struct_registration_deduplicates() {
		let def = StructDef {
			name: "S".to_owned(),
			is_union: false,
			fields: vec![field("a", CType::int())],
		};
		let mut ctx = Context::new("Main");
		ctx.register_struct(&def);
		ctx.register_struct(&def);
		assert_eq!(ctx.class_defs.len(), 1);
	}
}
