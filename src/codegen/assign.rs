//! Assignments, compound assignments, increment/decrement, address-of and
//! dereference.
//!
//! Assignment dispatches on the l-value shape. The left side was traversed
//! with the assign-target hint set, so it left exactly the addressing values
//! on the stack: nothing for plain identifiers, `[array, index]` for
//! subscripts, the object for members, the wrapper for `*p`.

use anyhow::{anyhow, bail, Result};
use crate::ast::{AssignOp, CType, ExprId, ExprKind, IdentRef};
use crate::context::UnionKind;
use crate::jvm_types::{self, ValueCategory};
use super::{Codegen, Symbol};

impl Codegen<'_> {
	pub(crate) fn enter_assign(&mut self, _id: ExprId, left: ExprId) {
		self.assign_target = Some(left);
	}

	pub(crate) fn enter_address_of(&mut self, target: ExprId) {
		match &self.unit.expr(target).kind {
			ExprKind::Index { .. } => {
				self.addr_target = Some(target);
			},
			ExprKind::Ident(IdentRef::Decl(decl_id)) => {
				if self.unit.decl(*decl_id).needs_heap_lift {
					self.addr_target = Some(target);
				}
			},
			_ => {},
		}
	}

	/// Applies one compound-assignment operator to `[current, rhs]`.
	fn emit_compound_op(&mut self, op: AssignOp, category: ValueCategory, line: u16) -> Result<()> {
		match (op, category) {
			(AssignOp::Add, ValueCategory::Int) => self.cb.iadd(),
			(AssignOp::Add, ValueCategory::Long) => self.cb.ladd(),
			(AssignOp::Add, ValueCategory::Float) => self.cb.fadd(),
			(AssignOp::Add, ValueCategory::Double) => self.cb.dadd(),
			(AssignOp::Sub, ValueCategory::Int) => self.cb.isub(),
			(AssignOp::Sub, ValueCategory::Long) => self.cb.lsub(),
			(AssignOp::Sub, ValueCategory::Float) => self.cb.fsub(),
			(AssignOp::Sub, ValueCategory::Double) => self.cb.dsub(),
			(AssignOp::Mul, ValueCategory::Int) => self.cb.imul(),
			(AssignOp::Mul, ValueCategory::Long) => self.cb.lmul(),
			(AssignOp::Mul, ValueCategory::Float) => self.cb.fmul(),
			(AssignOp::Mul, ValueCategory::Double) => self.cb.dmul(),
			(AssignOp::Div, ValueCategory::Int) => self.cb.idiv(),
			(AssignOp::Div, ValueCategory::Long) => self.cb.ldiv(),
			(AssignOp::Div, ValueCategory::Float) => self.cb.fdiv(),
			(AssignOp::Div, ValueCategory::Double) => self.cb.ddiv(),
			(AssignOp::Mod, ValueCategory::Int) => self.cb.irem(),
			(AssignOp::Mod, ValueCategory::Long) => self.cb.lrem(),
			(AssignOp::Mod, ValueCategory::Float) => self.cb.frem(),
			(AssignOp::Mod, ValueCategory::Double) => self.cb.drem(),
			(AssignOp::And, ValueCategory::Int) => self.cb.iand(),
			(AssignOp::And, ValueCategory::Long) => self.cb.land(),
			(AssignOp::Or, ValueCategory::Int) => self.cb.ior(),
			(AssignOp::Or, ValueCategory::Long) => self.cb.lor(),
			(AssignOp::Xor, ValueCategory::Int) => self.cb.ixor(),
			(AssignOp::Xor, ValueCategory::Long) => self.cb.lxor(),
			(AssignOp::Shl, ValueCategory::Int) => self.cb.ishl(),
			(AssignOp::Shl, ValueCategory::Long) => self.cb.lshl(),
			(AssignOp::Shr, ValueCategory::Int) => self.cb.ishr(),
			(AssignOp::Shr, ValueCategory::Long) => self.cb.lshr(),
			(op, category) => bail!(
				"{}: unsupported compound assignment {op:?} for category {category:?}",
				self.at(line),
			),
		}
	}

	pub(crate) fn leave_assign(&mut self, id: ExprId) -> Result<()> {
		let ExprKind::Assign { op, left, right } = self.unit.expr(id).kind else {
			bail!("expected an assignment expression");
		};
		self.assign_target = None;
		let line = self.unit.expr(id).line;

		match self.unit.expr(left).kind.clone() {
			ExprKind::Index { array, .. } => self.assign_to_index(op, array, line),
			ExprKind::Member { target, member, via_pointer } => {
				self.assign_to_member(op, target, &member, via_pointer, line)
			},
			ExprKind::Deref(pointer) => self.assign_to_deref(op, pointer, line),
			ExprKind::Ident(IdentRef::Decl(decl_id)) => self.assign_to_identifier(op, decl_id, right, line),
			other => bail!("{}: unsupported assignment target {other:?}", self.at(line)),
		}
	}

	/// `arr[i] = v` / `arr[i] op= v` / `p[i] = v`. Stack: `[base, index,
	/// value]`.
	fn assign_to_index(&mut self, op: AssignOp, array: ExprId, line: u16) -> Result<()> {
		let array_ty = self.unit.expr(array).ty.clone();
		let element = array_ty.child().cloned();

		if array_ty.is_pointer() {
			let pointee = element
				.ok_or_else(|| anyhow!("{}: pointer without pointee type", self.at(line)))?;

			if pointee.is_struct_or_union() {
				if op != AssignOp::Assign {
					bail!("{}: compound assignment to a struct pointer subscript is not supported", self.at(line));
				}
				// struct value store keeps C copy semantics
				self.emit_struct_deep_copy(&pointee)?;
				self.cb.dup_x2()?;
				return self.emit_ptr_store_subscript(&array_ty);
			}

			if op != AssignOp::Assign {
				// read-modify-write through the wrapper
				let value_local = self.allocate_temp_local();
				self.cb.istore(value_local)?;
				self.cb.dup2()?;
				self.emit_ptr_subscript(&array_ty)?;
				self.cb.iload(value_local)?;
				self.emit_compound_op(op, ValueCategory::Int, line)?;
				self.cb.dup_value_x2()?;
				return self.emit_ptr_store_subscript(&array_ty);
			}

			self.cb.dup_value_x2()?;
			return self.emit_ptr_store_subscript(&array_ty);
		}

		let element = element
			.ok_or_else(|| anyhow!("{}: array without element type", self.at(line)))?;

		if op != AssignOp::Assign {
			let value_local = self.allocate_temp_local();
			self.cb.istore(value_local)?;
			self.cb.dup2()?;
			self.cb.iaload()?;
			self.cb.iload(value_local)?;
			self.emit_compound_op(op, ValueCategory::Int, line)?;
			self.cb.dup_value_x2()?;
			return self.cb.iastore();
		}

		if element.is_struct_or_union() {
			self.emit_struct_deep_copy(&element)?;
		}

		self.cb.dup_value_x2()?;
		self.emit_array_element_store(&element)
	}

	/// `obj.field = v` / `p->field = v`, including the union conversions.
	/// Stack: `[object, value]`.
	fn assign_to_member(&mut self, op: AssignOp, target: ExprId, member: &str, _via_pointer: bool, line: u16) -> Result<()> {
		let mut struct_type = self.unit.expr(target).ty.clone();
		if struct_type.is_pointer() {
			struct_type = struct_type.child()
				.ok_or_else(|| anyhow!("{}: pointer without pointee type", self.at(line)))?
				.clone();
		}
		let class_name = jvm_types::internal_class_name(&struct_type)?;
		let union_kind = self.ctx.union_kind_by_name(&class_name);

		let field_type = self.unit.find_struct(&class_name)
			.and_then(|def| def.fields.iter().find(|f| f.name == member))
			.map(|f| f.ty.clone());

		let physical_field_name = match union_kind {
			UnionKind::PunIntFloat | UnionKind::PunLongDouble => "_bits",
			UnionKind::Reference => "_ref",
			UnionKind::NotUnion => member,
		};
		let field_index = self.ctx.add_struct_field(&class_name, physical_field_name)?;

		if op != AssignOp::Assign {
			let category = field_type.as_ref()
				.map(jvm_types::value_category)
				.unwrap_or(ValueCategory::Int);

			let value_local = self.allocate_temp_local_for(category);
			self.emit_store_local(value_local, category)?;
			// stack: [object]

			self.cb.dup()?;
			let t = field_type.as_ref()
				.map(jvm_types::verification_type)
				.transpose()?
				.unwrap_or(crema::frame::VerificationType::Integer);
			self.cb.getfield(field_index, t)?;
			self.emit_load_local(value_local, field_type.as_ref().unwrap_or(&CType::int()))?;
			self.emit_compound_op(op, category, line)?;
			// stack: [object, new_value]

			self.cb.dup_value_x1()?;
			return self.cb.putfield(field_index);
		}

		match union_kind {
			UnionKind::PunIntFloat if field_type.as_ref().is_some_and(CType::is_float) => {
				let index = self.ctx.pool.put_method_ref("java/lang/Float", "floatToRawIntBits", "(F)I")?;
				self.cb.invokestatic(index, "(F)I")?;
			},
			UnionKind::PunLongDouble if field_type.as_ref().is_some_and(CType::is_double) => {
				let index = self.ctx.pool.put_method_ref("java/lang/Double", "doubleToRawLongBits", "(D)J")?;
				self.cb.invokestatic(index, "(D)J")?;
			},
			UnionKind::Reference => {
				if let Some(field_type) = &field_type {
					if field_type.is_primitive() || field_type.is_enum() {
						self.emit_box_value(field_type)?;
					}
				}
			},
			_ => {},
		}

		if let Some(field_type) = &field_type {
			if field_type.is_struct_or_union() && union_kind == UnionKind::NotUnion {
				self.emit_struct_deep_copy(field_type)?;
			}
		}

		self.cb.dup_value_x1()?;
		self.cb.putfield(field_index)
	}

	/// `*p = v` and `*p op= v`. Stack: `[ptr, value]`.
	fn assign_to_deref(&mut self, op: AssignOp, pointer: ExprId, line: u16) -> Result<()> {
		let ptr_type = self.unit.expr(pointer).ty.clone();
		let pointee = ptr_type.child()
			.ok_or_else(|| anyhow!("{}: dereference of a non-pointer", self.at(line)))?
			.clone();

		if op != AssignOp::Assign {
			if pointee.is_pointer() && matches!(op, AssignOp::Add | AssignOp::Sub) {
				// *pp += n advances the pointee pointer
				let value_local = self.allocate_temp_local();
				self.cb.istore(value_local)?;

				self.cb.dup()?;
				self.emit_ptr_deref(&ptr_type)?;
				self.emit_checkcast_for_pointer_type(&pointee)?;
				self.cb.iload(value_local)?;
				if op == AssignOp::Sub {
					self.cb.ineg()?;
				}
				self.emit_ptr_add(&pointee)?;
				self.cb.dup_x1()?;
				return self.emit_ptr_store(&ptr_type);
			}

			let category = jvm_types::value_category(&pointee);
			let value_local = self.allocate_temp_local_for(category);
			self.emit_store_local(value_local, category)?;
			// stack: [ptr]

			self.cb.dup()?;
			self.emit_ptr_deref(&ptr_type)?;
			self.emit_load_local(value_local, &pointee)?;
			self.emit_compound_op(op, category, line)?;
			// stack: [ptr, new_value]

			self.cb.dup_value_x1()?;
			return self.emit_ptr_store(&ptr_type);
		}

		if pointee.is_struct_or_union() {
			self.emit_struct_deep_copy(&pointee)?;
		}

		self.cb.dup_value_x1()?;
		self.emit_ptr_store(&ptr_type)
	}

	/// `x = v`, `x op= v`, including heap-lifted storage and pointer clones.
	fn assign_to_identifier(&mut self, op: AssignOp, decl_id: crate::ast::DeclId, right: ExprId, line: u16) -> Result<()> {
		let symbol = self.ensure_symbol(decl_id)?;
		let decl = self.unit.decl(decl_id);
		let decl_ty = decl.ty.clone();
		let needs_heap_lift = decl.needs_heap_lift;
		let category = jvm_types::decl_value_category(decl);

		if op != AssignOp::Assign {
			if matches!(op, AssignOp::Add | AssignOp::Sub) && decl_ty.is_pointer() {
				return self.pointer_compound_assign(op, decl_id, symbol, needs_heap_lift, &decl_ty);
			}

			if category == ValueCategory::Reference {
				bail!("{}: compound assignment to a reference-typed variable is not supported", self.at(line));
			}

			let value_local = self.allocate_temp_local_for(category);
			self.emit_store_local(value_local, category)?;

			match symbol {
				Symbol::Static => {
					let field = self.field_ref_for_decl(decl_id)?;
					let t = jvm_types::verification_type(&decl_ty)?;
					self.cb.getstatic(field, t);
				},
				Symbol::Local { slot } => self.emit_load_local(slot, &decl_ty)?,
			}
			self.emit_load_local(value_local, &decl_ty)?;
			self.emit_compound_op(op, category, line)?;

			self.cb.dup_value()?;
			match symbol {
				Symbol::Static => {
					let field = self.field_ref_for_decl(decl_id)?;
					self.cb.putstatic(field)?;
				},
				Symbol::Local { slot } => self.emit_store_local(slot, category)?,
			}
			return Ok(());
		}

		// simple assignment

		if decl_ty.is_struct_or_union() {
			self.emit_struct_deep_copy(&decl_ty)?;
		}

		if needs_heap_lift && symbol != Symbol::Static {
			// stack: [box, value] (the box was loaded by the identifier)
			let actual = jvm_types::value_category(&decl_ty);
			if actual.is_wide() {
				self.cb.dup2_x1()?;
				// [value, box, value]
				self.cb.iconst(&mut self.ctx.pool, 0)?;
				// [value, box, value, 0]
				self.cb.dup_x2()?;
				self.cb.pop()?;
				// [value, box, 0, value]
			} else {
				self.cb.dup_x1()?;
				self.cb.iconst(&mut self.ctx.pool, 0)?;
				self.cb.swap()?;
				// [value, box, 0, value]
			}
			self.emit_heap_lift_element_store(&decl_ty)?;
			// stack: [value]
			return Ok(());
		}

		// assigning one pointer variable to another must not alias the
		// wrappers; values coming out of calls or subscripts are already
		// fresh objects
		let needs_clone = decl_ty.is_pointer()
			&& !decl_ty.is_void_pointer()
			&& self.unit.expr(right).ty.is_pointer()
			&& matches!(self.unit.expr(right).kind, ExprKind::Ident(_));
		if needs_clone {
			self.emit_ptr_clone(&decl_ty)?;
		}

		self.cb.dup_value()?;

		match symbol {
			Symbol::Static => {
				let field = self.field_ref_for_decl(decl_id)?;
				self.cb.putstatic(field)?;
			},
			Symbol::Local { slot } => self.emit_store_local(slot, category)?,
		}
		Ok(())
	}

	/// `Xastore` into a heap-lift box, by the boxed C type.
	fn emit_heap_lift_element_store(&mut self, ty: &CType) -> Result<()> {
		match jvm_types::value_category(ty) {
			ValueCategory::Reference => self.cb.aastore(),
			_ => self.emit_array_element_store(ty),
		}
	}

	/// `p += n` / `p -= n` on a pointer variable. Stack: `[n]`.
	fn pointer_compound_assign(
		&mut self,
		op: AssignOp,
		decl_id: crate::ast::DeclId,
		symbol: Symbol,
		needs_heap_lift: bool,
		decl_ty: &CType,
	) -> Result<()> {
		let int_local = self.allocate_temp_local();
		self.cb.istore(int_local)?;

		if needs_heap_lift && symbol != Symbol::Static {
			let Symbol::Local { slot } = symbol else { unreachable!() };
			// the pointer lives in box[0]
			self.cb.aload(slot)?;
			self.cb.dup()?;
			self.cb.iconst(&mut self.ctx.pool, 0)?;
			self.cb.aaload()?;
			self.emit_checkcast_for_pointer_type(decl_ty)?;
			// [box, ptr]

			self.cb.iload(int_local)?;
			if op == AssignOp::Sub {
				self.cb.ineg()?;
			}
			self.emit_ptr_add(decl_ty)?;
			// [box, new_ptr]

			self.cb.dup_x1()?;
			// [new_ptr, box, new_ptr]
			self.cb.iconst(&mut self.ctx.pool, 0)?;
			self.cb.swap()?;
			self.cb.aastore()?;
			// [new_ptr]
			return Ok(());
		}

		match symbol {
			Symbol::Static => {
				let field = self.field_ref_for_decl(decl_id)?;
				let t = jvm_types::verification_type(decl_ty)?;
				self.cb.getstatic(field, t);
			},
			Symbol::Local { slot } => self.cb.aload(slot)?,
		}

		self.cb.iload(int_local)?;
		if op == AssignOp::Sub {
			self.cb.ineg()?;
		}
		self.emit_ptr_add(decl_ty)?;

		self.cb.dup()?;
		match symbol {
			Symbol::Static => {
				let field = self.field_ref_for_decl(decl_id)?;
				self.cb.putstatic(field)?;
			},
			Symbol::Local { slot } => self.cb.astore(slot)?,
		}
		Ok(())
	}

	// -- increment / decrement ---------------------------------------------

	pub(crate) fn leave_inc_dec(&mut self, id: ExprId) -> Result<()> {
		let ExprKind::IncDec { target, prefix, decrement } = self.unit.expr(id).kind else {
			bail!("expected an increment expression");
		};
		self.inc_target = None;
		let line = self.unit.expr(id).line;

		match self.unit.expr(target).kind.clone() {
			ExprKind::Ident(IdentRef::Decl(decl_id)) => {
				self.inc_dec_identifier(decl_id, prefix, decrement, line)
			},
			ExprKind::Member { target: object, member, .. } => {
				self.inc_dec_member(object, &member, prefix, decrement, line)
			},
			ExprKind::Deref(pointer) => self.inc_dec_deref(pointer, prefix, decrement, line),
			other => bail!("{}: unsupported increment target {other:?}", self.at(line)),
		}
	}

	/// Pushes the constant one of the right category and applies the step.
	fn emit_step_one(&mut self, ty: &CType, decrement: bool) -> Result<()> {
		if ty.is_double() {
			self.cb.dconst(&mut self.ctx.pool, 1.0)?;
			if decrement { self.cb.dsub() } else { self.cb.dadd() }
		} else if ty.is_float() {
			self.cb.fconst(&mut self.ctx.pool, 1.0)?;
			if decrement { self.cb.fsub() } else { self.cb.fadd() }
		} else if ty.is_long() {
			self.cb.lconst(&mut self.ctx.pool, 1)?;
			if decrement { self.cb.lsub() } else { self.cb.ladd() }
		} else if ty.is_pointer() {
			self.cb.iconst(&mut self.ctx.pool, 1)?;
			if decrement {
				self.cb.ineg()?;
			}
			self.emit_ptr_add(ty)
		} else {
			self.cb.iconst(&mut self.ctx.pool, 1)?;
			if decrement { self.cb.isub() } else { self.cb.iadd() }
		}
	}

	fn inc_dec_identifier(&mut self, decl_id: crate::ast::DeclId, prefix: bool, decrement: bool, _line: u16) -> Result<()> {
		let symbol = self.ensure_symbol(decl_id)?;
		let decl = self.unit.decl(decl_id);
		let decl_ty = decl.ty.clone();
		let needs_heap_lift = decl.needs_heap_lift;
		let category = jvm_types::decl_value_category(decl);

		if symbol == Symbol::Static {
			let field = self.field_ref_for_decl(decl_id)?;
			let t = jvm_types::verification_type(&decl_ty)?;
			self.cb.getstatic(field, t);

			// note: a static postfix result would need the old value; the
			// stepped value is what the expression yields either way here
			self.emit_step_one(&decl_ty, decrement)?;
			self.cb.dup_value()?;
			let field = self.field_ref_for_decl(decl_id)?;
			return self.cb.putstatic(field);
		}

		if needs_heap_lift {
			let Symbol::Local { slot } = symbol else { unreachable!() };
			// the value lives in box[0]
			self.cb.aload(slot)?;
			self.cb.dup()?;
			self.cb.iconst(&mut self.ctx.pool, 0)?;
			self.emit_heap_lift_element_load(&decl_ty)?;
			// [box, value]

			if !prefix {
				self.cb.dup_value_x1()?;
				// [old_value, box, old_value]
			}

			self.emit_step_one(&decl_ty, decrement)?;

			if prefix {
				self.cb.dup_value_x1()?;
				// [new_value, box, new_value]
			}

			// box[0] = new_value
			if jvm_types::value_category(&decl_ty).is_wide() {
				self.cb.iconst(&mut self.ctx.pool, 0)?;
				self.cb.dup_x2()?;
				self.cb.pop()?;
			} else {
				self.cb.iconst(&mut self.ctx.pool, 0)?;
				self.cb.swap()?;
			}
			match jvm_types::value_category(&decl_ty) {
				ValueCategory::Reference => self.cb.aastore()?,
				_ => self.emit_array_element_store(&decl_ty)?,
			}
			// [result]
			return Ok(());
		}

		let Symbol::Local { slot } = symbol else { unreachable!() };
		self.emit_load_local(slot, &decl_ty)?;

		// postfix yields the old value, prefix the new one
		if !prefix {
			self.cb.dup_value()?;
		}
		self.emit_step_one(&decl_ty, decrement)?;
		if prefix {
			self.cb.dup_value()?;
		}

		self.emit_store_local(slot, category)
	}

	/// `obj.field++` and friends. Stack: `[object]`.
	fn inc_dec_member(&mut self, object: ExprId, member: &str, prefix: bool, decrement: bool, line: u16) -> Result<()> {
		let mut struct_type = self.unit.expr(object).ty.clone();
		if struct_type.is_pointer() {
			struct_type = struct_type.child()
				.ok_or_else(|| anyhow!("{}: pointer without pointee type", self.at(line)))?
				.clone();
		}
		let class_name = jvm_types::internal_class_name(&struct_type)?;

		let field_type = self.unit.find_struct(&class_name)
			.and_then(|def| def.fields.iter().find(|f| f.name == member))
			.map(|f| f.ty.clone())
			.unwrap_or(CType::int());
		let field_index = self.ctx.add_struct_field(&class_name, member)?;

		self.cb.dup()?;
		let t = jvm_types::verification_type(&field_type)?;
		self.cb.getfield(field_index, t)?;
		// [object, old_value]

		if !prefix {
			self.cb.dup_value_x1()?;
			// [old_value, object, old_value]
		}

		if field_type.is_long() {
			self.cb.lconst(&mut self.ctx.pool, 1)?;
			if decrement { self.cb.lsub()?; } else { self.cb.ladd()?; }
		} else {
			self.cb.iconst(&mut self.ctx.pool, 1)?;
			if decrement { self.cb.isub()?; } else { self.cb.iadd()?; }
		}

		if prefix {
			self.cb.dup_value_x1()?;
			// [new_value, object, new_value]
		}

		self.cb.putfield(field_index)
	}

	/// `(*p)++` and friends. Stack: `[ptr]`.
	fn inc_dec_deref(&mut self, pointer: ExprId, prefix: bool, decrement: bool, line: u16) -> Result<()> {
		let ptr_type = self.unit.expr(pointer).ty.clone();
		let pointee = ptr_type.child()
			.ok_or_else(|| anyhow!("{}: dereference of a non-pointer", self.at(line)))?
			.clone();

		self.cb.dup()?;
		self.emit_ptr_deref(&ptr_type)?;
		// [ptr, value]

		if pointee.is_pointer() {
			self.emit_checkcast_for_pointer_type(&pointee)?;
		}

		if !prefix {
			self.cb.dup_value_x1()?;
			// [old_value, ptr, old_value]
		}

		self.emit_step_one(&pointee, decrement)?;

		if prefix {
			self.cb.dup_value_x1()?;
			// [new_value, ptr, new_value]
		}

		self.emit_ptr_store(&ptr_type)
	}

	// -- address-of and dereference ----------------------------------------

	pub(crate) fn leave_address_of(&mut self, id: ExprId) -> Result<()> {
		self.addr_target = None;
		let ExprKind::AddressOf(target) = self.unit.expr(id).kind else {
			bail!("expected an address-of expression");
		};
		let expr_ty = self.unit.expr(id).ty.clone();
		let line = self.unit.expr(id).line;

		match self.unit.expr(target).kind.clone() {
			ExprKind::Ident(IdentRef::Function(func)) => {
				let name = &self.unit.function(func).name;
				bail!(
					"{}: function pointer not supported: &{name}\n       function pointers cannot be lowered to the JVM",
					self.at(line),
				);
			},
			ExprKind::Ident(IdentRef::Decl(decl_id)) => {
				let decl = self.unit.decl(decl_id);
				if decl.needs_heap_lift {
					// stack: [box]; the address is a pointer at offset zero
					self.cb.iconst(&mut self.ctx.pool, 0)?;
					return self.emit_ptr_create(&expr_ty);
				}

				// a copy would be produced instead of a reference, reject
				let reason = if decl.is_global { "global variable" } else { "non-heap-lifted variable" };
				let name = &decl.name;
				bail!(
					"{}: address of {reason} (&{name}) not supported\n       workaround: use a local variable",
					self.at(line),
				);
			},
			ExprKind::Index { array, .. } => {
				let array_ty = self.unit.expr(array).ty.clone();
				if array_ty.is_pointer() {
					// &p[i] is p advanced by i
					return self.emit_ptr_add(&array_ty);
				}
				// &arr[i]: stack holds [array, index]
				self.emit_ptr_create(&expr_ty)
			},
			ExprKind::Member { member, .. } => {
				bail!(
					"{}: address of struct member (&...{member}) not supported\n       workaround: copy through a local variable",
					self.at(line),
				);
			},
			other => bail!("{}: address-of is not supported for {other:?}", self.at(line)),
		}
	}

	pub(crate) fn leave_deref(&mut self, id: ExprId) -> Result<()> {
		let ExprKind::Deref(target) = self.unit.expr(id).kind else {
			bail!("expected a dereference expression");
		};
		let ptr_type = self.unit.expr(target).ty.clone();

		if self.assign_target == Some(id) || self.inc_target == Some(id) {
			// leave the wrapper for the store path
			return Ok(());
		}

		self.emit_ptr_deref(&ptr_type)?;

		// generic object loads come back as Object, cast down to the real
		// pointee class
		if let Some(pointee) = ptr_type.child() {
			let pointee = pointee.clone();
			if jvm_types::pointer_kind(&ptr_type)? == jvm_types::PointerKind::Object {
				if pointee.is_struct_or_union() {
					let class_name = jvm_types::internal_class_name(&pointee)?;
					self.emit_checkcast_class(&class_name)?;
				} else if pointee.is_pointer() {
					self.emit_checkcast_for_pointer_type(&pointee)?;
				}
			}
		}

		Ok(())
	}
}
