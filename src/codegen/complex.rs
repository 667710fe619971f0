//! Initializer lists and function calls.
//!
//! Calls cover the whole surface: argument validation, attribute-mapped JVM
//! intrinsics, the rejected allocator functions, the inline `calloc`
//! expansion, C value semantics for struct arguments, varargs packing, and
//! the `va_start`/`va_arg`/`va_end` builtins.

use anyhow::{anyhow, bail, Result};
use crema::descriptor::{parse_method_descriptor, Type};
use crema::frame::VerificationType;
use crate::ast::{ArrayLength, Attribute, CType, ExprId, ExprKind, IdentRef};
use crate::jvm_types::{self, PointerKind, ValueCategory};
use super::{Codegen, Symbol};

impl Codegen<'_> {
	// -- initializer lists -------------------------------------------------

	/// Designated-initializer metadata: the target field index per value (or
	/// `None` for positional entries) and each value's type.
	fn init_list_metadata(&self, values: &[ExprId], class_name: &str) -> Result<(Option<Vec<Option<usize>>>, Vec<Option<CType>>)> {
		let value_types: Vec<Option<CType>> = values.iter()
			.map(|&value| match &self.unit.expr(value).kind {
				ExprKind::DesignatedInit { value, .. } => Some(self.unit.expr(*value).ty.clone()),
				_ => Some(self.unit.expr(value).ty.clone()),
			})
			.collect();

		let designated = values.first().is_some_and(|&first| {
			matches!(self.unit.expr(first).kind, ExprKind::DesignatedInit { .. })
		});
		if !designated {
			return Ok((None, value_types));
		}

		let class_def = self.ctx.require_class(class_name)?;
		let indices = values.iter()
			.map(|&value| match &self.unit.expr(value).kind {
				ExprKind::DesignatedInit { field, .. } => class_def.field_index(field),
				_ => None,
			})
			.collect();
		Ok((Some(indices), value_types))
	}

	pub(crate) fn emit_struct_from_list(&mut self, struct_name: &str, values: &[ExprId]) -> Result<()> {
		let (indices, value_types) = self.init_list_metadata(values, struct_name)?;
		self.emit_struct_from_init_values(struct_name, indices.as_deref(), values.len(), &value_types)
	}

	pub(crate) fn leave_init_list(&mut self, id: ExprId) -> Result<()> {
		let ExprKind::InitList(values) = self.unit.expr(id).kind.clone() else {
			bail!("expected an initializer list");
		};
		if self.flatten_init_depth == 0 {
			bail!("initializer list depth underflow");
		}
		self.flatten_init_depth -= 1;

		let init_type = self.unit.expr(id).ty.clone();
		let line = self.unit.expr(id).line;

		// a nested `{...}` inside an outer initializer builds its struct
		// right away; its value joins the outer list on the stack
		if self.flatten_init_depth > 0 {
			if init_type.is_struct_or_union() {
				let struct_name = jvm_types::internal_class_name(&init_type)?;
				self.emit_struct_from_list(&struct_name, &values)?;
			}
			return Ok(());
		}

		// a top-level struct initializer leaves its values on the stack, the
		// declaration handler builds the instance
		if init_type.is_struct_or_union() {
			return Ok(());
		}

		if !init_type.is_array() {
			bail!("{}: initializer list requires an array or struct type", self.at(line));
		}

		let element_type = init_type.child()
			.ok_or_else(|| anyhow!("{}: array without element type", self.at(line)))?
			.clone();
		let declared_length = match init_type.array_length() {
			Some(&ArrayLength::Fixed(length)) => length,
			_ => 0,
		};
		let value_count = values.len() as i32;
		let dims = init_type.array_dimensions();

		if dims == 2 && element_type.child().is_some_and(CType::is_primitive) {
			return self.init_2d_primitive_array(&values, &element_type, declared_length, line);
		}

		if dims == 1 && element_type.is_struct_or_union() {
			return self.init_struct_array(&values, &element_type, declared_length);
		}

		if value_count > 0 {
			return self.init_1d_array(&values, &element_type, declared_length);
		}

		// C23 empty initializer `= {}`: a zero-filled array is exactly what
		// newarray gives us
		if declared_length == 0 {
			bail!("{}: an empty initializer needs a known array size", self.at(line));
		}
		self.cb.iconst(&mut self.ctx.pool, declared_length)?;
		self.cb.newarray(jvm_types::newarray_type_code(&element_type))
	}

	/// `{{1, 2}, {3}}` for a 2D primitive array: an outer array of freshly
	/// built rows. Row values are on the stack, flattened.
	fn init_2d_primitive_array(&mut self, rows: &[ExprId], inner_type: &CType, declared_length: i32, line: u16) -> Result<()> {
		let inner_elem = inner_type.child()
			.ok_or_else(|| anyhow!("{}: nested array without element type", self.at(line)))?
			.clone();
		let mut inner_len = match inner_type.array_length() {
			Some(&ArrayLength::Fixed(length)) => length,
			_ => 0,
		};
		for &row in rows {
			if let ExprKind::InitList(cols) = &self.unit.expr(row).kind {
				inner_len = inner_len.max(cols.len() as i32);
			}
		}

		let outer_len = if declared_length > 0 { declared_length } else { rows.len() as i32 };

		self.cb.iconst(&mut self.ctx.pool, outer_len)?;
		let inner_class = jvm_types::internal_class_name(inner_type)?;
		let inner_class_index = self.ctx.pool.put_class(&inner_class)?;
		self.cb.anewarray(inner_class_index, &inner_class)?;

		let outer_local = self.allocate_temp_local_for(ValueCategory::Reference);
		self.cb.astore(outer_local)?;

		for (row_index, &row) in rows.iter().enumerate() {
			let col_count = match &self.unit.expr(row).kind {
				ExprKind::InitList(cols) => cols.len(),
				_ => 0,
			};
			let row_len = if inner_len > 0 { inner_len } else { col_count as i32 };

			// the row's values sit on the stack, last on top
			let mut col_locals = vec![0u16; col_count];
			for j in (0..col_count).rev() {
				col_locals[j] = self.allocate_temp_local();
				self.cb.istore(col_locals[j])?;
			}

			self.cb.iconst(&mut self.ctx.pool, row_len)?;
			self.cb.newarray(jvm_types::newarray_type_code(&inner_elem))?;

			for (j, &col_local) in col_locals.iter().enumerate() {
				self.cb.dup()?;
				self.cb.iconst(&mut self.ctx.pool, j as i32)?;
				self.cb.iload(col_local)?;
				self.cb.iastore()?;
			}

			let inner_local = self.allocate_temp_local_for(ValueCategory::Reference);
			self.cb.astore(inner_local)?;

			self.cb.aload(outer_local)?;
			self.cb.iconst(&mut self.ctx.pool, row_index as i32)?;
			self.cb.aload(inner_local)?;
			self.cb.aastore()?;
		}

		self.cb.aload(outer_local)
	}

	/// `S arr[] = {{...}, {...}}`: every element is a fresh instance.
	fn init_struct_array(&mut self, elements: &[ExprId], element_type: &CType, declared_length: i32) -> Result<()> {
		let struct_name = jvm_types::internal_class_name(element_type)?;
		let length = if declared_length > 0 { declared_length } else { elements.len() as i32 };

		self.cb.iconst(&mut self.ctx.pool, length)?;
		let class_index = self.ctx.pool.put_class(&struct_name)?;
		self.cb.anewarray(class_index, &struct_name)?;

		let array_local = self.allocate_temp_local_for(ValueCategory::Reference);
		self.cb.astore(array_local)?;

		// elements in reverse, their values are stacked last-on-top
		for (element_index, &element) in elements.iter().enumerate().rev() {
			// an inner list that carries the struct type already built its
			// instance on its own leave; untyped inner lists left raw field
			// values behind
			if !self.unit.expr(element).ty.is_struct_or_union() {
				let field_values = match &self.unit.expr(element).kind {
					ExprKind::InitList(fields) => fields.clone(),
					_ => Vec::new(),
				};
				self.emit_struct_from_list(&struct_name, &field_values)?;
			}

			let struct_local = self.allocate_temp_local_for(ValueCategory::Reference);
			self.cb.astore(struct_local)?;

			self.cb.aload(array_local)?;
			self.cb.iconst(&mut self.ctx.pool, element_index as i32)?;
			self.cb.aload(struct_local)?;
			self.cb.aastore()?;
		}

		self.cb.aload(array_local)
	}

	fn init_1d_array(&mut self, values: &[ExprId], element_type: &CType, declared_length: i32) -> Result<()> {
		let element_category = jvm_types::value_category(element_type);

		let mut value_locals = vec![0u16; values.len()];
		for local in value_locals.iter_mut() {
			*local = self.allocate_temp_local_for(element_category);
		}

		// values come off the stack in reverse
		for i in (0..values.len()).rev() {
			self.emit_store_local(value_locals[i], element_category)?;
		}

		let length = if declared_length > 0 { declared_length } else { values.len() as i32 };
		self.cb.iconst(&mut self.ctx.pool, length)?;

		match element_type {
			CType::Pointer(_) | CType::Array { .. } | CType::Struct { .. } => {
				let element_class = jvm_types::internal_class_name(element_type)?;
				let class_index = self.ctx.pool.put_class(&element_class)?;
				self.cb.anewarray(class_index, &element_class)?;
			},
			_ => self.cb.newarray(jvm_types::newarray_type_code(element_type))?,
		}

		for (i, &value_local) in value_locals.iter().enumerate() {
			self.cb.dup()?;
			self.cb.iconst(&mut self.ctx.pool, i as i32)?;
			match element_category {
				ValueCategory::Int => self.cb.iload(value_local)?,
				ValueCategory::Long => self.cb.lload(value_local)?,
				ValueCategory::Float => self.cb.fload(value_local)?,
				ValueCategory::Double => self.cb.dload(value_local)?,
				ValueCategory::Reference => self.cb.aload(value_local)?,
			}
			self.emit_array_element_store(element_type)?;
		}

		Ok(())
	}

	// -- calls -------------------------------------------------------------

	pub(crate) fn leave_call(&mut self, id: ExprId) -> Result<()> {
		let ExprKind::Call { function, arguments } = self.unit.expr(id).kind.clone() else {
			bail!("expected a call expression");
		};
		let line = self.unit.expr(id).line;

		let func = match &self.unit.expr(function).kind {
			ExprKind::Ident(IdentRef::Function(func)) => *func,
			other => bail!("{}: call target is not a function: {other:?}", self.at(line)),
		};
		let name = self.unit.function(func).name.clone();

		match name.as_str() {
			"va_start" => return self.emit_va_start(&arguments, line),
			"__builtin_va_arg" => return self.emit_va_arg(id, &arguments, line),
			"va_end" => {
				// nothing to release on a garbage-collected host
				return self.cb.pop();
			},
			"free" => {
				// the host collects garbage; evaluate and discard
				return self.cb.pop();
			},
			"malloc" => bail!("{}: malloc is not supported, use calloc instead", self.at(line)),
			"realloc" => bail!("{}: realloc is not supported", self.at(line)),
			_ => {},
		}

		let actual = arguments.len();
		let fixed = self.unit.function(func).params.len();
		let is_variadic = self.unit.function(func).is_variadic;

		if is_variadic {
			if actual < fixed {
				bail!(
					"{}: argument count mismatch for {name}: expected at least {fixed}, got {actual}",
					self.at(line),
				);
			}
		} else if actual != fixed {
			bail!(
				"{}: argument count mismatch for {name}: expected {fixed}, got {actual}",
				self.at(line),
			);
		}

		if let Some(attribute) = self.unit.function(func).attributes.first().cloned() {
			return self.emit_intrinsic_call(&attribute);
		}

		if name == "calloc" && actual == 2 && self.try_emit_calloc(&arguments)? {
			return Ok(());
		}

		let argument_types: Vec<CType> = arguments.iter()
			.map(|&argument| self.unit.expr(argument).ty.clone())
			.collect();

		// struct arguments are passed by value: replace each one on the
		// stack with a deep copy
		if argument_types.iter().any(CType::is_struct_or_union) && actual > 0 {
			self.cb.begin_block();

			let mut argument_locals = vec![0u16; actual];
			for i in (0..actual).rev() {
				let category = jvm_types::value_category(&argument_types[i]);
				argument_locals[i] = self.allocate_temp_local_for(category);
				self.emit_store_local(argument_locals[i], category)?;
			}

			for i in 0..actual {
				let ty = argument_types[i].clone();
				self.emit_load_local(argument_locals[i], &ty)?;
				if ty.is_struct_or_union() {
					self.emit_struct_deep_copy(&ty)?;
				}
			}

			self.cb.end_block()?;
		}

		if is_variadic {
			self.pack_varargs(&argument_types, fixed)?;
		}

		let pool_index = self.ctx.add_method(self.unit, func)?;
		let descriptor = self.ctx.method_descriptor(self.unit, func)?;
		self.cb.invokestatic(pool_index, &descriptor)
	}

	/// A call mapped to a single JVM instruction by a declaration attribute.
	fn emit_intrinsic_call(&mut self, attribute: &Attribute) -> Result<()> {
		match attribute {
			Attribute::GetStatic { class, name, descriptor } => {
				let index = self.ctx.pool.put_field_ref(class, name, descriptor)?;
				let t = VerificationType::of_descriptor_type(&crema::descriptor::parse_field_descriptor(descriptor)?);
				self.cb.getstatic(index, t);
				Ok(())
			},
			Attribute::GetField { class, name, descriptor } => {
				let index = self.ctx.pool.put_field_ref(class, name, descriptor)?;
				let t = VerificationType::of_descriptor_type(&crema::descriptor::parse_field_descriptor(descriptor)?);
				self.cb.getfield(index, t)
			},
			Attribute::New { class } => {
				let index = self.ctx.pool.put_class(class)?;
				self.cb.new_object(index, class);
				self.cb.dup()
			},
			Attribute::ArrayLength => self.cb.arraylength(),
			Attribute::AaLoad => self.cb.aaload(),
			Attribute::InvokeVirtual { class, name, descriptor } => {
				// the receiver sits under the arguments and the verifier
				// needs it cast from Object to the declared class
				self.checkcast_under_arguments(descriptor, Some(class))?;
				let index = self.ctx.pool.put_method_ref(class, name, descriptor)?;
				self.cb.invokevirtual(index, descriptor)
			},
			Attribute::InvokeStatic { class, name, descriptor } => {
				self.checkcast_under_arguments(descriptor, None)?;
				let index = self.ctx.pool.put_method_ref(class, name, descriptor)?;
				self.cb.invokestatic(index, descriptor)
			},
			Attribute::InvokeSpecial { class, name, descriptor } => {
				self.checkcast_under_arguments(descriptor, None)?;
				let index = self.ctx.pool.put_method_ref(class, name, descriptor)?;
				self.cb.invokespecial(index, descriptor)
			},
		}
	}

	/// Spills the call arguments described by `descriptor` into temp locals
	/// and reloads them, inserting `checkcast`s: on every object-typed
	/// argument, and on the receiver when `receiver_class` is given.
	fn checkcast_under_arguments(&mut self, descriptor: &str, receiver_class: Option<&str>) -> Result<()> {
		let parsed = parse_method_descriptor(descriptor)?;
		let parameters = parsed.parameter_descriptors;

		let needs_argument_casts = parameters.iter().any(|t| matches!(t, Type::Object(_)));
		if parameters.is_empty() {
			if let Some(class) = receiver_class {
				self.emit_checkcast_class(class)?;
			}
			return Ok(());
		}
		if !needs_argument_casts && receiver_class.is_none() {
			return Ok(());
		}

		self.cb.begin_block();

		let mut temp_locals = vec![0u16; parameters.len()];
		for i in (0..parameters.len()).rev() {
			match &parameters[i] {
				Type::J => {
					temp_locals[i] = self.cb.allocate_local(VerificationType::Long);
					self.cb.lstore(temp_locals[i])?;
				},
				Type::D => {
					temp_locals[i] = self.cb.allocate_local(VerificationType::Double);
					self.cb.dstore(temp_locals[i])?;
				},
				Type::F => {
					temp_locals[i] = self.cb.allocate_local(VerificationType::Float);
					self.cb.fstore(temp_locals[i])?;
				},
				Type::Object(_) | Type::Array(..) => {
					temp_locals[i] = self.cb.allocate_local(VerificationType::object("java/lang/Object"));
					self.cb.astore(temp_locals[i])?;
				},
				_ => {
					temp_locals[i] = self.cb.allocate_local(VerificationType::Integer);
					self.cb.istore(temp_locals[i])?;
				},
			}
		}

		if let Some(class) = receiver_class {
			self.emit_checkcast_class(class)?;
		}

		for (i, parameter) in parameters.iter().enumerate() {
			match parameter {
				Type::J => self.cb.lload(temp_locals[i])?,
				Type::D => self.cb.dload(temp_locals[i])?,
				Type::F => self.cb.fload(temp_locals[i])?,
				Type::Object(class) => {
					self.cb.aload(temp_locals[i])?;
					self.emit_checkcast_class(class)?;
				},
				Type::Array(..) => self.cb.aload(temp_locals[i])?,
				_ => self.cb.iload(temp_locals[i])?,
			}
		}

		self.cb.end_block()
	}

	/// `calloc(n, sizeof(T))`, expanded inline when the second argument is a
	/// type-level sizeof. Stack: `[n]` (sizeof pushed nothing). Returns
	/// `false` when the call shape doesn't match and the normal call path
	/// should handle it.
	fn try_emit_calloc(&mut self, arguments: &[ExprId]) -> Result<bool> {
		let Some(&size_argument) = arguments.get(1) else {
			return Ok(false);
		};
		let ExprKind::SizeOfType { ty, .. } = &self.unit.expr(size_argument).kind else {
			return Ok(false);
		};
		let ty = ty.clone();

		if ty.is_struct_or_union() {
			let struct_name = jvm_types::internal_class_name(&ty)?;
			self.emit_calloc_struct(&struct_name)?;
		} else if ty.is_pointer() {
			self.emit_calloc_pointer(&ty)?;
		} else {
			self.emit_calloc_primitive(&ty)?;
		}
		Ok(true)
	}

	/// Packs the trailing arguments of a variadic call into a boxed
	/// `Object[]` that becomes the last positional argument.
	fn pack_varargs(&mut self, argument_types: &[CType], fixed: usize) -> Result<()> {
		self.cb.begin_block();

		let actual = argument_types.len();
		let vararg_count = actual.saturating_sub(fixed);

		let mut temp_locals = vec![0u16; actual];
		for i in (0..actual).rev() {
			let category = jvm_types::value_category(&argument_types[i]);
			temp_locals[i] = self.allocate_temp_local_for(category);
			self.emit_store_local(temp_locals[i], category)?;
		}

		for i in 0..fixed {
			let ty = argument_types[i].clone();
			self.emit_load_local(temp_locals[i], &ty)?;
		}

		self.cb.iconst(&mut self.ctx.pool, vararg_count as i32)?;
		let object_class = self.ctx.pool.put_class("java/lang/Object")?;
		self.cb.anewarray(object_class, "java/lang/Object")?;

		for j in 0..vararg_count {
			let source = fixed + j;
			let ty = argument_types[source].clone();

			self.cb.dup()?;
			self.cb.iconst(&mut self.ctx.pool, j as i32)?;
			self.emit_load_local(temp_locals[source], &ty)?;
			self.emit_box_value(&ty)?;
			self.cb.aastore()?;
		}

		self.cb.end_block()
	}

	// -- va_* builtins -----------------------------------------------------

	/// `va_start(ap)`: `ap = ` a fresh `__objectPtr` over the method's
	/// synthetic `__varargs` array.
	fn emit_va_start(&mut self, arguments: &[ExprId], line: u16) -> Result<()> {
		let ap_decl = self.va_list_decl(arguments, line)?;
		let symbol = self.ensure_symbol(ap_decl)?;

		// drop the ap value the argument traversal pushed
		self.cb.pop()?;

		let func = self.current_function
			.ok_or_else(|| anyhow!("va_start outside of a function"))?;
		if !self.unit.function(func).is_variadic {
			bail!("{}: va_start in a non-variadic function", self.at(line));
		}
		let varargs_slot = self.varargs_index(func);

		self.cb.aload(varargs_slot)?;
		self.cb.iconst(&mut self.ctx.pool, 0)?;
		self.emit_ptr_create_by_kind(PointerKind::Object)?;

		match symbol {
			Symbol::Local { slot } => self.cb.astore(slot),
			Symbol::Static => bail!("{}: va_list cannot be a file-scope variable", self.at(line)),
		}
	}

	/// `va_arg(ap, T)`: fetch `ap.base[ap.offset]`, unbox to `T`, bump
	/// `ap.offset`.
	fn emit_va_arg(&mut self, id: ExprId, arguments: &[ExprId], line: u16) -> Result<()> {
		let ap_decl = self.va_list_decl(arguments, line)?;
		let symbol = self.ensure_symbol(ap_decl)?;
		let Symbol::Local { slot } = symbol else {
			bail!("{}: va_list cannot be a file-scope variable", self.at(line));
		};

		// drop the ap value the argument traversal pushed
		self.cb.pop()?;

		let base_field = self.ctx.pool.put_field_ref("__objectPtr", "base", "[Ljava/lang/Object;")?;
		let offset_field = self.ctx.pool.put_field_ref("__objectPtr", "offset", "I")?;

		self.cb.aload(slot)?;
		self.cb.dup()?;
		self.cb.getfield(base_field, VerificationType::object("[Ljava/lang/Object;"))?;
		self.cb.swap()?;
		self.cb.getfield(offset_field, VerificationType::Integer)?;
		self.cb.aaload()?;

		let result_type = self.unit.expr(id).ty.clone();
		self.emit_unbox_value(&result_type)?;

		self.cb.aload(slot)?;
		self.cb.dup()?;
		self.cb.getfield(offset_field, VerificationType::Integer)?;
		self.cb.iconst(&mut self.ctx.pool, 1)?;
		self.cb.iadd()?;
		self.cb.putfield(offset_field)
	}

	fn va_list_decl(&self, arguments: &[ExprId], line: u16) -> Result<crate::ast::DeclId> {
		let Some(&ap) = arguments.first() else {
			bail!("{}: va_list argument missing", self.at(line));
		};
		match &self.unit.expr(ap).kind {
			ExprKind::Ident(IdentRef::Decl(decl)) => Ok(*decl),
			other => bail!("{}: va_list argument must be a variable, got {other:?}", self.at(line)),
		}
	}
}
