//! Value-producing expressions: literals, identifiers, member access, array
//! subscripts.

use anyhow::{anyhow, bail, Result};
use crema::frame::VerificationType;
use crate::ast::{CType, DeclId, ExprId, ExprKind, IdentRef};
use crate::context::UnionKind;
use crate::jvm_types::{self, ValueCategory};
use super::{Codegen, Symbol};

impl Codegen<'_> {
	/// The field reference of a file-scope variable.
	pub(crate) fn field_ref_for_decl(&mut self, decl_id: DeclId) -> Result<u16> {
		let decl = self.unit.decl(decl_id);
		let class_name = decl.class_name.clone().unwrap_or_else(|| self.ctx.class_name.clone());
		let descriptor = jvm_types::descriptor(&decl.ty)?;
		let name = decl.name.clone();
		self.ctx.pool.put_field_ref(&class_name, &name, &descriptor)
	}

	/// `NULL` in a pointer context becomes a null wrapper, not a raw
	/// `aconst_null`, so control-flow merges stay well-typed.
	pub(crate) fn leave_null(&mut self, id: ExprId) -> Result<()> {
		let ty = self.unit.expr(id).ty.clone();
		if ty.is_pointer() && !ty.is_void_pointer() {
			self.emit_null_pointer(&ty)
		} else {
			self.cb.aconst_null();
			Ok(())
		}
	}

	/// A string literal becomes a `__charPtr` over the literal's UTF-8 bytes
	/// with a trailing NUL.
	pub(crate) fn leave_string(&mut self, id: ExprId) -> Result<()> {
		let ExprKind::StringLit(value) = &self.unit.expr(id).kind else {
			bail!("expected a string literal");
		};

		// keep the terminating NUL so byte-level consumers see a C string
		let mut value = value.clone();
		value.push('\0');
		let string_index = self.ctx.pool.put_string(&value)?;
		self.cb.ldc(string_index, VerificationType::object("java/lang/String"));

		let utf8_field = self.ctx.pool.put_field_ref(
			"java/nio/charset/StandardCharsets", "UTF_8", "Ljava/nio/charset/Charset;",
		)?;
		self.cb.getstatic(utf8_field, VerificationType::object("java/nio/charset/Charset"));

		let get_bytes = self.ctx.pool.put_method_ref(
			"java/lang/String", "getBytes", "(Ljava/nio/charset/Charset;)[B",
		)?;
		self.cb.invokevirtual(get_bytes, "(Ljava/nio/charset/Charset;)[B")?;

		self.cb.iconst(&mut self.ctx.pool, 0)?;
		self.emit_ptr_create_by_kind(crate::jvm_types::PointerKind::Char)
	}

	pub(crate) fn leave_sizeof(&mut self, id: ExprId) -> Result<()> {
		match &self.unit.expr(id).kind {
			// sizeof(T) produces no code of its own, calloc inspects the type
			ExprKind::SizeOfType { .. } => Ok(()),
			ExprKind::SizeOfValue { size } => {
				let size = *size;
				self.cb.iconst(&mut self.ctx.pool, size)
			},
			_ => bail!("expected a sizeof expression"),
		}
	}

	pub(crate) fn leave_identifier(&mut self, id: ExprId) -> Result<()> {
		let ExprKind::Ident(ident) = &self.unit.expr(id).kind else {
			bail!("expected an identifier");
		};

		let decl_id = match ident {
			IdentRef::Function(_) => return Ok(()),
			IdentRef::EnumConst { value, .. } => {
				let value = *value;
				return self.cb.iconst(&mut self.ctx.pool, value);
			},
			IdentRef::Decl(decl_id) => *decl_id,
		};

		let symbol = self.ensure_symbol(decl_id)?;
		let decl = self.unit.decl(decl_id);
		let needs_heap_lift = decl.needs_heap_lift;
		let decl_ty = decl.ty.clone();

		if self.inc_target == Some(id) {
			// increment/decrement loads through its own path
			return Ok(());
		}

		if self.assign_target == Some(id) {
			// assignment target: only heap-lifted variables preload anything
			// (their box reference)
			if needs_heap_lift {
				match symbol {
					Symbol::Static => {
						let field = self.field_ref_for_decl(decl_id)?;
						self.cb.getstatic(field, VerificationType::object(jvm_types::heap_lift_array_descriptor(&decl_ty)));
					},
					Symbol::Local { slot } => self.cb.aload(slot)?,
				}
			}
			return Ok(());
		}

		match symbol {
			Symbol::Static => {
				let field = self.field_ref_for_decl(decl_id)?;
				let t = jvm_types::verification_type(&decl_ty)?;
				self.cb.getstatic(field, t);
			},
			Symbol::Local { slot } => {
				match jvm_types::decl_value_category(self.unit.decl(decl_id)) {
					ValueCategory::Int => self.cb.iload(slot)?,
					ValueCategory::Long => self.cb.lload(slot)?,
					ValueCategory::Float => self.cb.fload(slot)?,
					ValueCategory::Double => self.cb.dload(slot)?,
					ValueCategory::Reference => self.cb.aload(slot)?,
				}
			},
		}

		// heap-lifted variables live in a one-element array: unwrap, unless
		// `&x` wants the box itself
		if needs_heap_lift && self.addr_target != Some(id) {
			self.cb.iconst(&mut self.ctx.pool, 0)?;
			self.emit_heap_lift_element_load(&decl_ty)?;
		}

		Ok(())
	}

	/// Loads element 0 of a heap-lift box; `[box, 0]` → `[value]`. Reference
	/// values need a `checkcast` after the generic `Object[]` load.
	pub(crate) fn emit_heap_lift_element_load(&mut self, ty: &CType) -> Result<()> {
		match jvm_types::value_category(ty) {
			ValueCategory::Reference => {
				self.cb.aaload()?;
				if ty.is_pointer() || ty.is_array() {
					self.emit_checkcast_for_pointer_type(ty)?;
				} else if ty.is_struct_or_union() {
					let class_name = jvm_types::internal_class_name(ty)?;
					self.emit_checkcast_class(&class_name)?;
				}
				Ok(())
			},
			_ => self.emit_array_element_load(ty),
		}
	}

	pub(crate) fn leave_index(&mut self, id: ExprId) -> Result<()> {
		let ExprKind::Index { array, .. } = self.unit.expr(id).kind else {
			bail!("expected a subscript expression");
		};
		let array_ty = self.unit.expr(array).ty.clone();
		let line = self.unit.expr(id).line;

		let is_assign_target = self.assign_target == Some(id);
		let is_addr_target = self.addr_target == Some(id);

		if array_ty.is_pointer() {
			let pointee = array_ty.child()
				.ok_or_else(|| anyhow!("{}: pointer without pointee type", self.at(line)))?
				.clone();

			if is_assign_target || is_addr_target {
				// leave [ptr, index] for the store or address path
				return Ok(());
			}

			if pointee.is_struct_or_union() {
				// struct pointer subscript through __objectPtr, then cast
				// Object down to the struct class
				let struct_name = jvm_types::internal_class_name(&pointee)?;
				self.emit_ptr_subscript(&array_ty)?;
				self.emit_checkcast_class(&struct_name)?;
				return Ok(());
			}

			if pointee.is_pointer() {
				self.emit_ptr_subscript(&array_ty)?;
				self.emit_checkcast_for_pointer_type(&pointee)?;
				return Ok(());
			}

			return self.emit_ptr_subscript(&array_ty);
		}

		if !array_ty.is_array() {
			bail!("{}: subscript target is neither a pointer nor an array", self.at(line));
		}

		if is_assign_target || is_addr_target {
			// leave [array, index] on the stack
			return Ok(());
		}

		let element = array_ty.child()
			.ok_or_else(|| anyhow!("{}: array without element type", self.at(line)))?
			.clone();

		if element.is_array() {
			// outer dimension of a nested array: the inner array reference
			return self.cb.aaload();
		}

		self.emit_array_element_load(&element)?;
		if element.is_char() && element.is_unsigned() {
			self.cb.iconst(&mut self.ctx.pool, 255)?;
			self.cb.iand()?;
		}
		Ok(())
	}

	pub(crate) fn leave_member(&mut self, id: ExprId) -> Result<()> {
		let ExprKind::Member { target, member, via_pointer } = self.unit.expr(id).kind.clone() else {
			bail!("expected a member expression");
		};
		let line = self.unit.expr(id).line;

		let mut struct_type = self.unit.expr(target).ty.clone();
		let is_assign_target = self.assign_target == Some(id);
		let is_inc_target = self.inc_target == Some(id);

		if via_pointer && struct_type.is_pointer() {
			let pointee = struct_type.child()
				.ok_or_else(|| anyhow!("{}: pointer without pointee type", self.at(line)))?
				.clone();
			struct_type = pointee;

			if struct_type.is_struct_or_union() {
				// dereference the __objectPtr down to the struct object
				let struct_name = jvm_types::internal_class_name(&struct_type)?;
				let base_field = self.ctx.pool.put_field_ref("__objectPtr", "base", "[Ljava/lang/Object;")?;
				let offset_field = self.ctx.pool.put_field_ref("__objectPtr", "offset", "I")?;

				self.cb.dup()?;
				self.cb.getfield(base_field, VerificationType::object("[Ljava/lang/Object;"))?;
				self.cb.swap()?;
				self.cb.getfield(offset_field, VerificationType::Integer)?;
				self.cb.aaload()?;
				self.emit_checkcast_class(&struct_name)?;
			}
		} else if struct_type.is_pointer() {
			struct_type = struct_type.child()
				.ok_or_else(|| anyhow!("{}: pointer without pointee type", self.at(line)))?
				.clone();
		}

		if !struct_type.is_struct_or_union() {
			bail!("{}: member {:?} accessed on a non-struct value", self.at(line), member);
		}
		let class_name = jvm_types::internal_class_name(&struct_type)?;
		let class_def = self.ctx.require_class(&class_name)?.clone();
		let union_kind = class_def.union_kind;

		// the declared type of the member, from the unit's struct tables
		let field_type = self.unit.find_struct(&class_name)
			.and_then(|def| def.fields.iter().find(|f| f.name == member))
			.map(|f| f.ty.clone());

		let physical_field_name = match union_kind {
			UnionKind::PunIntFloat | UnionKind::PunLongDouble => "_bits",
			UnionKind::Reference => "_ref",
			UnionKind::NotUnion => member.as_str(),
		};
		if class_def.field_index(physical_field_name).is_none() {
			bail!("{}: field {:?} not found in struct {:?}", self.at(line), physical_field_name, class_name);
		}
		let field_index = self.ctx.add_struct_field(&class_name, physical_field_name)?;

		if is_inc_target {
			// leave the struct object for the increment path
			return Ok(());
		}
		if is_assign_target {
			// leave the struct object; the assignment emits the putfield
			return Ok(());
		}

		match union_kind {
			UnionKind::NotUnion => {
				let stored = self.ctx.struct_field_descriptor(&class_name, physical_field_name)?;
				let t = VerificationType::of_descriptor_type(&crema::descriptor::parse_field_descriptor(&stored)?);
				self.cb.getfield(field_index, t)?;

				// getfield sign-extends byte/short fields, unsigned members
				// need their high bits masked off
				if let Some(field_type) = &field_type {
					if field_type.is_char() && field_type.is_unsigned() {
						self.cb.iconst(&mut self.ctx.pool, 255)?;
						self.cb.iand()?;
					} else if field_type.is_short() && field_type.is_unsigned() {
						self.cb.iconst(&mut self.ctx.pool, 65535)?;
						self.cb.iand()?;
					}
				}
			},
			UnionKind::PunIntFloat => {
				self.cb.getfield(field_index, VerificationType::Integer)?;
				if field_type.as_ref().is_some_and(CType::is_float) {
					let index = self.ctx.pool.put_method_ref("java/lang/Float", "intBitsToFloat", "(I)F")?;
					self.cb.invokestatic(index, "(I)F")?;
				}
			},
			UnionKind::PunLongDouble => {
				self.cb.getfield(field_index, VerificationType::Long)?;
				if field_type.as_ref().is_some_and(CType::is_double) {
					let index = self.ctx.pool.put_method_ref("java/lang/Double", "longBitsToDouble", "(J)D")?;
					self.cb.invokestatic(index, "(J)D")?;
				}
			},
			UnionKind::Reference => {
				self.leave_reference_union_member(field_index, field_type.as_ref())?;
			},
		}

		Ok(())
	}

	/// Reads the `_ref` member of a reference union: unboxes primitives,
	/// checkcasts pointers, and auto-creates struct members that are still
	/// null or hold another member's value.
	fn leave_reference_union_member(&mut self, field_index: u16, field_type: Option<&CType>) -> Result<()> {
		let object = VerificationType::object("java/lang/Object");

		let Some(field_type) = field_type else {
			return self.cb.getfield(field_index, object);
		};

		if field_type.is_primitive() || field_type.is_enum() {
			self.cb.getfield(field_index, object)?;
			return self.emit_unbox_value(field_type);
		}

		if field_type.is_pointer() {
			self.cb.getfield(field_index, object)?;
			return self.emit_checkcast_for_pointer_type(field_type);
		}

		if field_type.is_struct_or_union() {
			// reading a struct member must yield a usable instance even when
			// another member was active: test with instanceof and create a
			// fresh one on mismatch
			let target_class = jvm_types::internal_class_name(field_type)?;
			let target_class_index = self.ctx.pool.put_class(&target_class)?;
			let init_index = self.ctx.pool.put_method_ref(&target_class, "<init>", "()V")?;

			let union_temp = self.allocate_temp_local_for(ValueCategory::Reference);
			self.cb.dup()?;
			self.cb.astore(union_temp)?;

			self.cb.getfield(field_index, object)?;

			self.cb.dup()?;
			self.cb.instanceof(target_class_index)?;
			let have_it = self.cb.create_label();
			let done = self.cb.create_label();
			self.cb.jump_if(have_it)?;

			self.cb.pop()?;
			self.cb.aload(union_temp)?;
			self.cb.new_object(target_class_index, &target_class);
			self.cb.dup_x1()?;
			self.cb.dup()?;
			self.cb.invokespecial(init_index, "()V")?;
			self.cb.putfield(field_index)?;
			self.cb.jump(done)?;

			self.cb.place_label(have_it)?;
			self.emit_checkcast_class(&target_class)?;

			self.cb.place_label(done)?;
			return Ok(());
		}

		self.cb.getfield(field_index, object)
	}
}
