//! Declaration statement lowering: array allocation (fixed and VLA), struct
//! construction, heap-lift boxing, and the verifier-mandated default
//! initialization of plain locals.

use anyhow::{anyhow, bail, Result};
use crema::code::IntCmpCond;
use crate::ast::{ArrayLength, CType, DeclId, ExprKind};
use crate::jvm_types::{self, ValueCategory};
use super::{Codegen, Symbol};

fn fixed_length(ty: &CType) -> i32 {
	match ty.array_length() {
		Some(&ArrayLength::Fixed(length)) => length,
		_ => 0,
	}
}

fn is_vla(ty: &CType) -> bool {
	matches!(ty.array_length(), Some(ArrayLength::Variable(_)))
}

impl Codegen<'_> {
	pub(crate) fn leave_declaration(&mut self, decl_id: DeclId) -> Result<()> {
		// no bytecode for declarations sitting after a return or goto
		if !self.cb.is_alive() {
			return Ok(());
		}

		let symbol = self.ensure_symbol(decl_id)?;
		let decl = self.unit.decl(decl_id);
		let ty = decl.ty.clone();
		let initializer = decl.initializer;
		let needs_heap_lift = decl.needs_heap_lift;
		let line = self.unit.decl(decl_id).initializer
			.map(|init| self.unit.expr(init).line)
			.unwrap_or(0);

		let vla = is_vla(&ty);
		let fixed_array = ty.is_array() && initializer.is_none() && !vla;
		if vla || fixed_array {
			return self.declare_array(decl_id, symbol, &ty, vla, line);
		}

		if ty.is_struct_or_union() {
			return self.declare_struct(decl_id, symbol, &ty, needs_heap_lift);
		}

		if needs_heap_lift {
			return self.declare_heap_lifted(symbol, &ty, initializer.is_some());
		}

		if let Some(initializer) = initializer {
			let category = jvm_types::decl_value_category(self.unit.decl(decl_id));
			match symbol {
				Symbol::Static => {
					let field = self.field_ref_for_decl(decl_id)?;
					return self.cb.putstatic(field);
				},
				Symbol::Local { slot } => {
					// a pointer initialized from another pointer variable is
					// cloned so the two C pointers stay independent
					let needs_clone = ty.is_pointer()
						&& !ty.is_void_pointer()
						&& self.unit.expr(initializer).ty.is_pointer()
						&& matches!(self.unit.expr(initializer).kind, ExprKind::Ident(_));
					if needs_clone {
						self.emit_ptr_clone(&ty)?;
						return self.cb.astore(slot);
					}
					return self.emit_store_local(slot, category);
				},
			}
		}

		if ty.is_pointer() && !ty.is_void_pointer() && symbol != Symbol::Static {
			// uninitialized pointers start out as null wrappers, the JVM
			// wants every local definitely assigned
			self.emit_null_pointer(&ty)?;
			let Symbol::Local { slot } = symbol else { unreachable!() };
			return self.cb.astore(slot);
		}

		if let Symbol::Local { slot } = symbol {
			// zero-initialize so a backward goto over this declaration still
			// sees a typed local instead of Top
			match jvm_types::decl_value_category(self.unit.decl(decl_id)) {
				ValueCategory::Int => {
					self.cb.iconst(&mut self.ctx.pool, 0)?;
					self.cb.istore(slot)?;
				},
				ValueCategory::Long => {
					self.cb.lconst(&mut self.ctx.pool, 0)?;
					self.cb.lstore(slot)?;
				},
				ValueCategory::Float => {
					self.cb.fconst(&mut self.ctx.pool, 0.0)?;
					self.cb.fstore(slot)?;
				},
				ValueCategory::Double => {
					self.cb.dconst(&mut self.ctx.pool, 0.0)?;
					self.cb.dstore(slot)?;
				},
				ValueCategory::Reference => {
					self.cb.aconst_null();
					self.cb.astore(slot)?;
				},
			}
		}
		Ok(())
	}

	fn store_declared(&mut self, decl_id: DeclId, symbol: Symbol) -> Result<()> {
		match symbol {
			Symbol::Static => {
				let field = self.field_ref_for_decl(decl_id)?;
				self.cb.putstatic(field)
			},
			Symbol::Local { slot } => self.cb.astore(slot),
		}
	}

	/// Allocates a fresh array for a fixed-size or variable-length array
	/// declaration. VLA dimension sizes are already on the stack, innermost
	/// on top.
	fn declare_array(&mut self, decl_id: DeclId, symbol: Symbol, ty: &CType, vla: bool, line: u16) -> Result<()> {
		let dims = ty.array_dimensions();
		if dims > 3 {
			bail!("{}: arrays with more than 3 dimensions are not supported", self.at(line));
		}

		let mut dim_locals = [0u16; 3];
		for local in dim_locals.iter_mut().take(dims as usize) {
			*local = self.allocate_temp_local();
		}

		if vla {
			for i in (0..dims as usize).rev() {
				self.cb.istore(dim_locals[i])?;
			}
		} else {
			let mut t = ty;
			for &dim_local in dim_locals.iter().take(dims as usize) {
				self.cb.iconst(&mut self.ctx.pool, fixed_length(t))?;
				self.cb.istore(dim_local)?;
				t = t.child().ok_or_else(|| anyhow!("array dimension without element"))?;
			}
		}

		let element_type = ty.child()
			.ok_or_else(|| anyhow!("{}: array without element type", self.at(line)))?
			.clone();

		if dims == 1 {
			self.cb.iload(dim_locals[0])?;
			if element_type.is_struct_or_union() || (element_type.is_pointer() && !element_type.is_void_pointer()) {
				let element_class = jvm_types::internal_class_name(&element_type)?;
				let class_index = self.ctx.pool.put_class(&element_class)?;
				self.cb.anewarray(class_index, &element_class)?;
				self.store_declared(decl_id, symbol)?;

				// reference elements start null, fill every slot with a
				// fresh instance / null wrapper
				return self.fill_array_elements(decl_id, symbol, &element_type, dim_locals[0]);
			}

			self.cb.newarray(jvm_types::newarray_type_code(&element_type))?;
			return self.store_declared(decl_id, symbol);
		}

		// 2D/3D: an outer array of arrays, built with loops
		let inner_type = element_type;
		self.cb.iload(dim_locals[0])?;
		let inner_class = jvm_types::internal_class_name(&inner_type)?;
		let inner_class_index = self.ctx.pool.put_class(&inner_class)?;
		self.cb.anewarray(inner_class_index, &inner_class)?;
		self.store_declared(decl_id, symbol)?;

		// all loop counters are initialized before the first loop header so
		// the frames at the headers agree
		let mut index_locals = [0u16; 2];
		for local in index_locals.iter_mut().take(dims as usize - 1) {
			*local = self.allocate_temp_local();
			self.cb.iconst(&mut self.ctx.pool, 0)?;
			self.cb.istore(*local)?;
		}

		let outer_cond = self.cb.create_label();
		let outer_end = self.cb.create_label();
		self.cb.mark_loop_header(outer_cond);
		self.cb.place_label(outer_cond)?;

		self.cb.iload(index_locals[0])?;
		self.cb.iload(dim_locals[0])?;
		self.cb.jump_if_icmp(IntCmpCond::Ge, outer_end)?;

		let inner_elem = inner_type.child()
			.ok_or_else(|| anyhow!("nested array without element type"))?
			.clone();

		if dims == 2 {
			// arr[i] = new T[dim1]
			self.load_declared(decl_id, symbol)?;
			self.cb.iload(index_locals[0])?;
			self.cb.iload(dim_locals[1])?;
			if inner_elem.is_struct_or_union() || (inner_elem.is_pointer() && !inner_elem.is_void_pointer()) {
				let element_class = jvm_types::internal_class_name(&inner_elem)?;
				let class_index = self.ctx.pool.put_class(&element_class)?;
				self.cb.anewarray(class_index, &element_class)?;
			} else {
				self.cb.newarray(jvm_types::newarray_type_code(&inner_elem))?;
			}
			self.cb.aastore()?;
		} else {
			// arr[i] = new T[][dim1], then fill its rows
			let base_type = inner_elem.child()
				.ok_or_else(|| anyhow!("nested array without element type"))?
				.clone();

			self.load_declared(decl_id, symbol)?;
			self.cb.iload(index_locals[0])?;
			self.cb.iload(dim_locals[1])?;
			let inner_inner_class = jvm_types::internal_class_name(&inner_elem)?;
			let class_index = self.ctx.pool.put_class(&inner_inner_class)?;
			self.cb.anewarray(class_index, &inner_inner_class)?;
			self.cb.aastore()?;

			self.cb.iconst(&mut self.ctx.pool, 0)?;
			self.cb.istore(index_locals[1])?;

			let inner_cond = self.cb.create_label();
			let inner_end = self.cb.create_label();
			self.cb.mark_loop_header(inner_cond);
			self.cb.place_label(inner_cond)?;

			self.cb.iload(index_locals[1])?;
			self.cb.iload(dim_locals[1])?;
			self.cb.jump_if_icmp(IntCmpCond::Ge, inner_end)?;

			// arr[i][j] = new T[dim2]
			self.load_declared(decl_id, symbol)?;
			self.cb.iload(index_locals[0])?;
			self.cb.aaload()?;
			self.cb.iload(index_locals[1])?;
			self.cb.iload(dim_locals[2])?;
			if base_type.is_struct_or_union() || (base_type.is_pointer() && !base_type.is_void_pointer()) {
				let element_class = jvm_types::internal_class_name(&base_type)?;
				let class_index = self.ctx.pool.put_class(&element_class)?;
				self.cb.anewarray(class_index, &element_class)?;
			} else {
				self.cb.newarray(jvm_types::newarray_type_code(&base_type))?;
			}
			self.cb.aastore()?;

			self.cb.iinc(index_locals[1], 1);
			self.cb.jump(inner_cond)?;
			self.cb.place_label(inner_end)?;
		}

		self.cb.iinc(index_locals[0], 1);
		self.cb.jump(outer_cond)?;
		self.cb.place_label(outer_end)
	}

	fn load_declared(&mut self, decl_id: DeclId, symbol: Symbol) -> Result<()> {
		match symbol {
			Symbol::Static => {
				let decl_ty = self.unit.decl(decl_id).ty.clone();
				let field = self.field_ref_for_decl(decl_id)?;
				let t = jvm_types::verification_type(&decl_ty)?;
				self.cb.getstatic(field, t);
				Ok(())
			},
			Symbol::Local { slot } => self.cb.aload(slot),
		}
	}

	/// Fills every slot of a freshly allocated reference-element array:
	/// struct elements with fresh instances, pointer elements with null
	/// wrappers.
	fn fill_array_elements(&mut self, decl_id: DeclId, symbol: Symbol, element_type: &CType, dim_local: u16) -> Result<()> {
		let index_local = self.allocate_temp_local();
		self.cb.iconst(&mut self.ctx.pool, 0)?;
		self.cb.istore(index_local)?;

		let loop_cond = self.cb.create_label();
		let loop_end = self.cb.create_label();
		self.cb.mark_loop_header(loop_cond);
		self.cb.place_label(loop_cond)?;

		self.cb.iload(index_local)?;
		self.cb.iload(dim_local)?;
		self.cb.jump_if_icmp(IntCmpCond::Ge, loop_end)?;

		self.load_declared(decl_id, symbol)?;
		self.cb.iload(index_local)?;
		if element_type.is_struct_or_union() {
			let struct_name = jvm_types::internal_class_name(element_type)?;
			let class_index = self.ctx.pool.put_class(&struct_name)?;
			let init_index = self.ctx.pool.put_method_ref(&struct_name, "<init>", "()V")?;
			self.cb.new_object(class_index, &struct_name);
			self.cb.dup()?;
			self.cb.invokespecial(init_index, "()V")?;
		} else {
			let refs = self.ptr_refs(jvm_types::pointer_kind(element_type)?)?;
			self.cb.new_object(refs.class_index, refs.class_name);
			self.cb.dup()?;
			self.cb.invokespecial(refs.init_index, "()V")?;
		}
		self.cb.aastore()?;

		self.cb.iinc(index_local, 1);
		self.cb.jump(loop_cond)?;
		self.cb.place_label(loop_end)
	}

	/// A struct declaration: build or copy the instance, optionally box it
	/// for heap-lift, and store it.
	fn declare_struct(&mut self, decl_id: DeclId, symbol: Symbol, ty: &CType, needs_heap_lift: bool) -> Result<()> {
		let struct_name = jvm_types::internal_class_name(ty)?;
		let initializer = self.unit.decl(decl_id).initializer;

		match initializer.map(|init| self.unit.expr(init).kind.clone()) {
			Some(ExprKind::InitList(values)) => {
				// the list's values are on the stack
				self.emit_struct_from_list(&struct_name, &values)?;
			},
			Some(_) => {
				// an expression initializer copies, per C value semantics
				self.emit_struct_deep_copy(ty)?;
			},
			None => {
				self.emit_struct_from_init_values(&struct_name, None, 0, &[])?;
			},
		}

		if needs_heap_lift {
			// box the instance into an Object[1]
			let object_class = self.ctx.pool.put_class("java/lang/Object")?;
			self.cb.iconst(&mut self.ctx.pool, 1)?;
			self.cb.anewarray(object_class, "java/lang/Object")?;
			self.cb.dup_x1()?;
			self.cb.swap()?;
			self.cb.iconst(&mut self.ctx.pool, 0)?;
			self.cb.swap()?;
			self.cb.aastore()?;
		}

		self.store_declared(decl_id, symbol)
	}

	/// A heap-lifted scalar or reference declaration: allocate the
	/// one-element box, store the initializer into slot 0, store the box.
	fn declare_heap_lifted(&mut self, symbol: Symbol, ty: &CType, has_initializer: bool) -> Result<()> {
		self.cb.iconst(&mut self.ctx.pool, 1)?;
		if jvm_types::value_category(ty) == ValueCategory::Reference {
			let object_class = self.ctx.pool.put_class("java/lang/Object")?;
			self.cb.anewarray(object_class, "java/lang/Object")?;
		} else {
			self.cb.newarray(jvm_types::newarray_type_code(ty))?;
		}

		if has_initializer {
			// stack: [value, box] -> box[0] = value, box survives
			self.emit_store_into_box(ty)?;
		}

		let Symbol::Local { slot } = symbol else {
			bail!("a heap-lifted variable cannot be a static field");
		};
		self.cb.astore(slot)
	}
}
