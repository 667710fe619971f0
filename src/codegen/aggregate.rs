//! Struct and array value-semantics lowering.
//!
//! C aggregates copy on assignment; JVM aggregates are references. Every
//! place an aggregate value crosses an assignment, a call boundary or a
//! return therefore runs through a deep copy, and struct construction
//! default-initializes whatever the initializer list left out.

use anyhow::{anyhow, Result};
use crema::code::IntCmpCond;
use crema::frame::VerificationType;
use crate::ast::{ArrayLength, CType};
use crate::jvm_types::{self, PointerKind, ValueCategory};
use super::Codegen;

/// A struct type that is stored by value inside another aggregate: named,
/// not a pointer target, and not one of the host or wrapper classes.
pub(crate) fn is_embedded_struct_type(ty: &CType) -> bool {
	if !ty.is_struct_or_union() {
		return false;
	}
	let Some(name) = ty.user_type_name() else {
		return false;
	};
	!name.is_empty() && !name.starts_with("java/") && !name.starts_with("__")
}

impl Codegen<'_> {
	/// `[src]` → `[dst]`: allocates a fresh instance and copies every field;
	/// pointer fields are cloned, arrays and embedded structs copied deeply.
	pub(crate) fn emit_struct_deep_copy(&mut self, ty: &CType) -> Result<()> {
		if !ty.is_struct_or_union() {
			return Ok(());
		}
		let Some(struct_name) = ty.user_type_name().map(str::to_owned) else {
			return Ok(());
		};
		let class_def = self.ctx.require_class(&struct_name)?.clone();

		self.cb.begin_block();

		let object = VerificationType::object("java/lang/Object");
		let temp_src = self.cb.allocate_local(object.clone());
		let temp_new = self.cb.allocate_local(object);

		self.cb.astore(temp_src)?;

		let class_index = self.ctx.pool.put_class(&struct_name)?;
		let init_index = self.ctx.pool.put_method_ref(&struct_name, "<init>", "()V")?;
		self.cb.new_object(class_index, &struct_name);
		self.cb.dup()?;
		self.cb.invokespecial(init_index, "()V")?;
		self.cb.astore(temp_new)?;

		for field in &class_def.fields {
			let field_index = self.ctx.add_struct_field(&struct_name, &field.name)?;
			let field_type = jvm_types::verification_type(&field.ty)?;

			if is_embedded_struct_type(&field.ty) {
				self.cb.aload(temp_new)?;
				self.cb.aload(temp_src)?;
				self.cb.getfield(field_index, field_type)?;
				self.emit_struct_deep_copy(&field.ty)?;
				self.cb.putfield(field_index)?;
				continue;
			}

			if field.ty.is_array() {
				self.cb.aload(temp_new)?;
				self.cb.aload(temp_src)?;
				self.cb.getfield(field_index, field_type)?;
				let element = field.ty.child()
					.ok_or_else(|| anyhow!("array field {:?} has no element type", field.name))?
					.clone();
				self.emit_array_deep_copy(&element)?;
				self.cb.putfield(field_index)?;
				continue;
			}

			if field.ty.is_pointer() && !field.ty.is_void_pointer() {
				self.cb.aload(temp_new)?;
				self.cb.aload(temp_src)?;
				self.cb.getfield(field_index, field_type)?;
				self.emit_ptr_clone(&field.ty)?;
				self.cb.putfield(field_index)?;
				continue;
			}

			// primitives (and raw void* references): plain field copy
			self.cb.aload(temp_new)?;
			self.cb.aload(temp_src)?;
			self.cb.getfield(field_index, field_type)?;
			self.cb.putfield(field_index)?;
		}

		self.cb.aload(temp_new)?;
		self.cb.end_block()
	}

	/// `[src_array]` → `[new_array]`. A null source stays null. Primitive and
	/// enum elements go through `System.arraycopy`; struct, pointer and
	/// nested-array elements are copied one by one.
	pub(crate) fn emit_array_deep_copy(&mut self, element: &CType) -> Result<()> {
		let null_label = self.cb.create_label();
		let end_label = self.cb.create_label();

		self.cb.dup()?;
		self.cb.jump_if_null(null_label)?;

		self.cb.begin_block();

		let array_descriptor = format!("[{}", jvm_types::descriptor(element)?);
		let array_type = VerificationType::object(&array_descriptor);
		let src_local = self.cb.allocate_local(array_type.clone());
		let new_local = self.cb.allocate_local(array_type);

		self.cb.astore(src_local)?;
		self.cb.aload(src_local)?;
		self.cb.arraylength()?;

		if element.is_primitive() || element.is_enum() {
			self.cb.newarray(jvm_types::newarray_type_code(element))?;
		} else {
			let element_class = jvm_types::internal_class_name(element)?;
			let class_index = self.ctx.pool.put_class(&element_class)?;
			self.cb.anewarray(class_index, &element_class)?;
		}
		self.cb.astore(new_local)?;

		let needs_deep_copy = is_embedded_struct_type(element)
			|| (element.is_pointer() && !element.is_void_pointer())
			|| element.is_array();

		if needs_deep_copy {
			let i_local = self.cb.allocate_local(VerificationType::Integer);

			let loop_start = self.cb.create_label();
			let loop_end = self.cb.create_label();

			self.cb.iconst(&mut self.ctx.pool, 0)?;
			self.cb.istore(i_local)?;

			self.cb.mark_loop_header(loop_start);
			self.cb.place_label(loop_start)?;

			self.cb.iload(i_local)?;
			self.cb.aload(src_local)?;
			self.cb.arraylength()?;
			self.cb.jump_if_icmp(IntCmpCond::Ge, loop_end)?;

			self.cb.aload(new_local)?;
			self.cb.iload(i_local)?;
			self.cb.aload(src_local)?;
			self.cb.iload(i_local)?;
			self.cb.aaload()?;

			if is_embedded_struct_type(element) {
				self.emit_struct_deep_copy(element)?;
			} else if element.is_pointer() {
				self.emit_ptr_clone(element)?;
			} else if element.is_array() {
				let inner = element.child()
					.ok_or_else(|| anyhow!("nested array without element type"))?
					.clone();
				self.emit_array_deep_copy(&inner)?;
			}

			self.cb.aastore()?;

			self.cb.iinc(i_local, 1);
			self.cb.jump(loop_start)?;

			self.cb.place_label(loop_end)?;
		} else {
			self.cb.aload(src_local)?;
			self.cb.iconst(&mut self.ctx.pool, 0)?;
			self.cb.aload(new_local)?;
			self.cb.iconst(&mut self.ctx.pool, 0)?;
			self.cb.aload(src_local)?;
			self.cb.arraylength()?;

			let copy_index = self.ctx.pool.put_method_ref(
				"java/lang/System", "arraycopy",
				"(Ljava/lang/Object;ILjava/lang/Object;II)V",
			)?;
			self.cb.invokestatic(copy_index, "(Ljava/lang/Object;ILjava/lang/Object;II)V")?;
		}

		self.cb.aload(new_local)?;

		self.cb.end_block()?;
		self.cb.jump(end_label)?;

		// null case: the dup'd null is still on the stack
		self.cb.place_label(null_label)?;
		self.cb.place_label(end_label)
	}

	/// `[val_0, ..., val_n-1]` → `[struct_ref]`: allocates the struct,
	/// assigns the given values (positionally, or through `field_indices`
	/// for designated initializers), and default-initializes every field the
	/// initializer left out.
	pub(crate) fn emit_struct_from_init_values(
		&mut self,
		struct_name: &str,
		field_indices: Option<&[Option<usize>]>,
		value_count: usize,
		value_types: &[Option<CType>],
	) -> Result<()> {
		let class_def = self.ctx.require_class(struct_name)?.clone();

		self.cb.begin_block();

		let class_index = self.ctx.pool.put_class(struct_name)?;
		let init_index = self.ctx.pool.put_method_ref(struct_name, "<init>", "()V")?;
		self.cb.new_object(class_index, struct_name);
		self.cb.dup()?;
		self.cb.invokespecial(init_index, "()V")?;

		let struct_local = self.cb.allocate_local(VerificationType::object("java/lang/Object"));
		self.cb.astore(struct_local)?;
		// stack: [val_0, ..., val_n-1]

		let mut field_initialized = vec![false; class_def.fields.len()];

		// assign in reverse, the last value sits on top of the stack
		for i in (0..value_count).rev() {
			let fi = match field_indices {
				Some(indices) => match indices.get(i).copied().flatten() {
					Some(fi) => fi,
					None => continue,
				},
				None => i,
			};
			if fi >= class_def.fields.len() {
				continue;
			}
			field_initialized[fi] = true;
			let field = &class_def.fields[fi];

			self.cb.aload(struct_local)?;
			// bring the value back on top: [.., val, struct] -> [.., struct, val]
			let value_category = value_types.get(i)
				.and_then(|t| t.as_ref())
				.map(jvm_types::value_category)
				.unwrap_or_else(|| jvm_types::value_category(&field.ty));
			if value_category.is_wide() {
				self.cb.dup_x2()?;
				self.cb.pop()?;
			} else {
				self.cb.swap()?;
			}

			// array initializer for a pointer field decays to a pointer
			if field.ty.is_pointer() {
				if let Some(Some(value_ty)) = value_types.get(i) {
					if value_ty.is_array() {
						self.cb.iconst(&mut self.ctx.pool, 0)?;
						self.emit_ptr_create(&field.ty)?;
					}
				}
			}

			let field_name = field.name.clone();
			let field_index = self.ctx.add_struct_field(struct_name, &field_name)?;
			self.cb.putfield(field_index)?;
		}

		// embedded structs the initializer skipped get fresh instances
		for fi in 0..class_def.fields.len() {
			if field_initialized[fi] {
				continue;
			}
			let field = class_def.fields[fi].clone();
			if !is_embedded_struct_type(&field.ty) {
				continue;
			}
			let Some(embedded_name) = field.ty.user_type_name().map(str::to_owned) else {
				continue;
			};

			self.emit_struct_from_init_values(&embedded_name, None, 0, &[])?;
			self.cb.aload(struct_local)?;
			self.cb.swap()?;
			let field_index = self.ctx.add_struct_field(struct_name, &field.name)?;
			self.cb.putfield(field_index)?;
		}

		// pointer fields the initializer skipped become null pointers
		for fi in 0..class_def.fields.len() {
			if field_initialized[fi] {
				continue;
			}
			let field = class_def.fields[fi].clone();
			if !field.ty.is_pointer() || field.ty.is_void_pointer() {
				continue;
			}

			let kind = jvm_types::pointer_kind(&field.ty)?;
			let refs = self.ptr_refs(kind)?;
			// base and offset are null/0 straight out of the constructor
			self.cb.new_object(refs.class_index, refs.class_name);
			self.cb.dup()?;
			self.cb.invokespecial(refs.init_index, "()V")?;

			self.cb.aload(struct_local)?;
			self.cb.swap()?;
			let field_index = self.ctx.add_struct_field(struct_name, &field.name)?;
			self.cb.putfield(field_index)?;
		}

		// fixed-size array fields the initializer skipped get fresh arrays
		for fi in 0..class_def.fields.len() {
			if field_initialized[fi] {
				continue;
			}
			let field = class_def.fields[fi].clone();
			let Some(&ArrayLength::Fixed(length)) = field.ty.array_length() else {
				continue;
			};
			if length <= 0 {
				continue;
			}
			let element = field.ty.child()
				.ok_or_else(|| anyhow!("array field {:?} has no element type", field.name))?
				.clone();

			self.cb.iconst(&mut self.ctx.pool, length)?;
			if element.is_primitive() || element.is_enum() {
				self.cb.newarray(jvm_types::newarray_type_code(&element))?;
			} else {
				let element_class = jvm_types::internal_class_name(&element)?;
				let class_index = self.ctx.pool.put_class(&element_class)?;
				self.cb.anewarray(class_index, &element_class)?;
			}

			// struct elements are populated with fresh instances per slot
			if is_embedded_struct_type(&element) {
				let element_name = element.user_type_name()
					.ok_or_else(|| anyhow!("struct array element without a name"))?
					.to_owned();
				let array_local = self.cb.allocate_local(VerificationType::object("java/lang/Object"));
				self.cb.astore(array_local)?;

				for i in 0..length {
					self.cb.aload(array_local)?;
					self.cb.iconst(&mut self.ctx.pool, i)?;
					self.emit_struct_from_init_values(&element_name, None, 0, &[])?;
					self.cb.aastore()?;
				}

				self.cb.aload(array_local)?;
			}

			self.cb.aload(struct_local)?;
			self.cb.swap()?;
			let field_index = self.ctx.add_struct_field(struct_name, &field.name)?;
			self.cb.putfield(field_index)?;
		}

		self.cb.aload(struct_local)?;
		self.cb.end_block()
	}

	/// `[value, box]` → `[box]` with `box[0] = value`, for heap-lift storage.
	/// The shuffle differs for wide values, which `swap` cannot move.
	pub(crate) fn emit_store_into_box(&mut self, ty: &CType) -> Result<()> {
		if jvm_types::value_category(ty).is_wide() {
			self.cb.dup_x2()?;                  // [box, value, box]
			self.cb.iconst(&mut self.ctx.pool, 0)?;
			self.cb.dup2_x2()?;                 // [box, box, 0, value, box, 0]
			self.cb.pop2()?;                    // [box, box, 0, value]
		} else {
			self.cb.dup_x1()?;                  // [box, value, box]
			self.cb.swap()?;                    // [box, box, value]
			self.cb.iconst(&mut self.ctx.pool, 0)?;
			self.cb.swap()?;                    // [box, box, 0, value]
		}
		match jvm_types::value_category(ty) {
			ValueCategory::Reference => self.cb.aastore(),
			_ => self.emit_array_element_store(ty),
		}
	}

	/// A null pointer wrapper for `ptr_ty`: `[base=null, offset=0]` wrapped.
	pub(crate) fn emit_null_pointer(&mut self, ptr_ty: &CType) -> Result<()> {
		self.cb.aconst_null();
		self.cb.iconst(&mut self.ctx.pool, 0)?;
		self.emit_ptr_create(ptr_ty)
	}

	/// `calloc(n, sizeof(T))` for a struct `T`: a length-`n` array whose
	/// every slot is a distinct fresh instance, wrapped in `__objectPtr`.
	pub(crate) fn emit_calloc_struct(&mut self, struct_name: &str) -> Result<()> {
		self.cb.begin_block();

		let temp_n = self.cb.allocate_local(VerificationType::Integer);
		let temp_arr = self.cb.allocate_local(VerificationType::object("java/lang/Object"));
		let temp_i = self.cb.allocate_local(VerificationType::Integer);

		// stack: [n]
		self.cb.istore(temp_n)?;
		self.cb.iload(temp_n)?;
		let struct_class = self.ctx.pool.put_class(struct_name)?;
		self.cb.anewarray(struct_class, struct_name)?;
		self.cb.astore(temp_arr)?;

		self.cb.iconst(&mut self.ctx.pool, 0)?;
		self.cb.istore(temp_i)?;

		let loop_start = self.cb.create_label();
		let loop_end = self.cb.create_label();
		self.cb.mark_loop_header(loop_start);
		self.cb.place_label(loop_start)?;

		self.cb.iload(temp_i)?;
		self.cb.iload(temp_n)?;
		self.cb.jump_if_icmp(IntCmpCond::Ge, loop_end)?;

		self.cb.aload(temp_arr)?;
		self.cb.iload(temp_i)?;
		self.emit_struct_from_init_values(struct_name, None, 0, &[])?;
		self.cb.aastore()?;

		self.cb.iinc(temp_i, 1);
		self.cb.jump(loop_start)?;

		self.cb.place_label(loop_end)?;

		self.cb.aload(temp_arr)?;
		self.cb.iconst(&mut self.ctx.pool, 0)?;
		self.emit_ptr_create_by_kind(PointerKind::Object)?;

		self.cb.end_block()
	}

	/// `calloc(n, sizeof(T*))`: an `Object[n]` whose slots hold fresh null
	/// pointer wrappers, wrapped in `__objectPtr`.
	pub(crate) fn emit_calloc_pointer(&mut self, element_ptr_ty: &CType) -> Result<()> {
		self.cb.begin_block();

		let temp_n = self.cb.allocate_local(VerificationType::Integer);
		let temp_arr = self.cb.allocate_local(VerificationType::object("java/lang/Object"));
		let temp_i = self.cb.allocate_local(VerificationType::Integer);

		self.cb.istore(temp_n)?;
		self.cb.iload(temp_n)?;
		let object_class = self.ctx.pool.put_class("java/lang/Object")?;
		self.cb.anewarray(object_class, "java/lang/Object")?;
		self.cb.astore(temp_arr)?;

		self.cb.iconst(&mut self.ctx.pool, 0)?;
		self.cb.istore(temp_i)?;

		let loop_start = self.cb.create_label();
		let loop_end = self.cb.create_label();
		self.cb.mark_loop_header(loop_start);
		self.cb.place_label(loop_start)?;

		self.cb.iload(temp_i)?;
		self.cb.iload(temp_n)?;
		self.cb.jump_if_icmp(IntCmpCond::Ge, loop_end)?;

		self.cb.aload(temp_arr)?;
		self.cb.iload(temp_i)?;
		self.emit_null_pointer(element_ptr_ty)?;
		self.cb.aastore()?;

		self.cb.iinc(temp_i, 1);
		self.cb.jump(loop_start)?;

		self.cb.place_label(loop_end)?;

		self.cb.aload(temp_arr)?;
		self.cb.iconst(&mut self.ctx.pool, 0)?;
		self.emit_ptr_create_by_kind(PointerKind::Object)?;

		self.cb.end_block()
	}

	/// `calloc(n, sizeof(primitive))`: the primitive array directly, wrapped
	/// in the matching pointer class.
	pub(crate) fn emit_calloc_primitive(&mut self, element_ty: &CType) -> Result<()> {
		// stack: [n]
		self.cb.newarray(jvm_types::newarray_type_code(element_ty))?;
		self.cb.iconst(&mut self.ctx.pool, 0)?;
		let kind = jvm_types::pointer_kind(element_ty)?;
		self.emit_ptr_create_by_kind(kind)
	}

	/// Boxes the top-of-stack primitive into its wrapper object for varargs
	/// passing. References pass through untouched.
	pub(crate) fn emit_box_value(&mut self, ty: &CType) -> Result<()> {
		let (owner, descriptor) = match jvm_types::value_category(ty) {
			ValueCategory::Int => ("java/lang/Integer", "(I)Ljava/lang/Integer;"),
			ValueCategory::Long => ("java/lang/Long", "(J)Ljava/lang/Long;"),
			ValueCategory::Float => ("java/lang/Float", "(F)Ljava/lang/Float;"),
			ValueCategory::Double => ("java/lang/Double", "(D)Ljava/lang/Double;"),
			ValueCategory::Reference => return Ok(()),
		};
		let index = self.ctx.pool.put_method_ref(owner, "valueOf", descriptor)?;
		self.cb.invokestatic(index, descriptor)
	}

	/// Unboxes the top-of-stack `Object` into the primitive `ty` asks for
	/// (`Integer.intValue` and friends), or checkcasts reference types.
	pub(crate) fn emit_unbox_value(&mut self, ty: &CType) -> Result<()> {
		let (owner, name, descriptor) = match ty {
			CType::Int { .. } | CType::Char { .. } | CType::Short { .. } | CType::Bool
			| CType::Enum { .. } => ("java/lang/Integer", "intValue", "()I"),
			CType::Long { .. } => ("java/lang/Long", "longValue", "()J"),
			CType::Float => ("java/lang/Float", "floatValue", "()F"),
			CType::Double => ("java/lang/Double", "doubleValue", "()D"),
			CType::Pointer(pointee) => {
				return if pointee.is_void() {
					// void* is a raw Object already
					Ok(())
				} else {
					self.emit_checkcast_for_pointer_type(ty)
				};
			},
			_ => return Ok(()),
		};
		self.emit_checkcast_class(owner)?;
		let index = self.ctx.pool.put_method_ref(owner, name, descriptor)?;
		self.cb.invokevirtual(index, descriptor)
	}
}
