//! The code generator: walks the resolved AST and lowers it onto the JVM
//! operand-stack machine.
//!
//! Each function is emitted into a fresh [`CodeBuilder`]; the constant pool
//! is shared across all methods of the class. Emission is reachability-gated:
//! statements in dead code are skipped except for the shapes that may carry
//! labels, which are still traversed so their labels end up well-formed.

use std::collections::HashMap;
use anyhow::{anyhow, Context as _, Result};
use log::debug;
use crema::class_constants::{flags, version};
use crema::code::{CodeBuilder, Label};
use crema::frame::VerificationType;
use crema::writer;
use crate::ast::{CType, DeclId, ExprId, ExprKind, FuncId, StmtId, StmtKind, TranslationUnit};
use crate::context::Context;
use crate::jvm_types::{self, ValueCategory};

mod values;
mod ops;
mod assign;
mod complex;
mod ptr;
mod aggregate;
mod stmt;
mod decl;
mod control;
mod switch;

/// Where a variable lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Symbol {
	/// A static field of the generated class.
	Static,
	/// A local variable slot.
	Local { slot: u16 },
}

/// Context of an `if` statement being lowered.
#[derive(Debug)]
pub(crate) struct IfContext {
	pub(crate) stmt: StmtId,
	pub(crate) then_stmt: StmtId,
	pub(crate) else_stmt: Option<StmtId>,
	pub(crate) then_label: Label,
	pub(crate) else_label: Option<Label>,
	pub(crate) end_label: Label,
	pub(crate) has_cond_branch: bool,
	/// Whether the then branch was still alive when it jumped to the end.
	pub(crate) then_alive: bool,
}

/// AST-side context of a loop being lowered; the labels live in the
/// builder's control stack.
#[derive(Debug)]
pub(crate) struct LoopInfo {
	pub(crate) stmt: StmtId,
	pub(crate) body: Option<StmtId>,
	pub(crate) condition: Option<ExprId>,
	pub(crate) post: Option<ExprId>,
	pub(crate) is_do_while: bool,
	pub(crate) has_cond_branch: bool,
}

/// AST-side context of a switch being lowered.
#[derive(Debug)]
pub(crate) struct SwitchInfo {
	pub(crate) stmt: StmtId,
	pub(crate) body: StmtId,
	pub(crate) expression: ExprId,
	pub(crate) expr_category: ValueCategory,
	pub(crate) has_expr_local: bool,
	pub(crate) has_dispatch_goto: bool,
}

pub struct Codegen<'u> {
	pub(crate) unit: &'u TranslationUnit,
	pub(crate) ctx: Context,
	pub(crate) cb: CodeBuilder,

	pub(crate) current_function: Option<FuncId>,
	pub(crate) symbols: HashMap<DeclId, Symbol>,
	pub(crate) if_stack: Vec<IfContext>,
	pub(crate) loop_stack: Vec<LoopInfo>,
	pub(crate) switch_stack: Vec<SwitchInfo>,
	/// Function-scoped `goto` label registry.
	pub(crate) named_labels: Vec<(String, Label)>,

	/// Hint set while lowering an assignment: the l-value expression whose
	/// plain load must be suppressed.
	pub(crate) assign_target: Option<ExprId>,
	/// Hint for `&x` on array elements and heap-lifted identifiers.
	pub(crate) addr_target: Option<ExprId>,
	/// Hint for `x++`/`--x`.
	pub(crate) inc_target: Option<ExprId>,
	pub(crate) flatten_init_depth: u32,
	pub(crate) has_return: bool,
	scope_blocks: Vec<bool>,
}

impl<'u> Codegen<'u> {
	pub fn new(unit: &'u TranslationUnit, class_name: &str) -> Result<Codegen<'u>> {
		let mut ctx = Context::new(class_name);
		ctx.register_structs(unit);
		ctx.register_functions(unit)?;

		Ok(Codegen {
			unit,
			ctx,
			cb: CodeBuilder::new("<clinit>"),
			current_function: None,
			symbols: HashMap::new(),
			if_stack: Vec::new(),
			loop_stack: Vec::new(),
			switch_stack: Vec::new(),
			named_labels: Vec::new(),
			assign_target: None,
			addr_target: None,
			inc_target: None,
			flatten_init_depth: 0,
			has_return: false,
			scope_blocks: Vec::new(),
		})
	}

	/// `file:line` prefix for diagnostics.
	pub(crate) fn at(&self, line: u16) -> String {
		match &self.unit.source_file {
			Some(file) => format!("{file}:{line}"),
			None => format!("<unknown>:{line}"),
		}
	}

	/// Generates the whole class: static fields for file-scope variables,
	/// one static method per function with a body.
	pub fn generate(mut self) -> Result<GeneratedClass> {
		let mut fields = Vec::new();
		for &decl_id in &self.unit.globals {
			let decl = self.unit.decl(decl_id);
			let class_name = decl.class_name.as_deref().unwrap_or(&self.ctx.class_name);
			if decl.is_extern || class_name != self.ctx.class_name {
				continue;
			}
			fields.push(writer::Field {
				access_flags: flags::ACC_PUBLIC | flags::ACC_STATIC,
				name: decl.name.clone(),
				descriptor: jvm_types::descriptor(&decl.ty)?,
			});
		}

		let mut methods = Vec::new();
		let infos: Vec<FuncId> = self.ctx.functions.iter().map(|info| info.func).collect();
		for func in infos {
			let method = self.emit_function(func)
				.with_context(|| anyhow!("failed to generate code for function {:?}", self.unit.function(func).name))?;
			methods.push(method);
		}

		let class_file = writer::ClassFile {
			minor_version: version::MINOR,
			major_version: version::MAJOR_JAVA_8,
			access_flags: flags::ACC_PUBLIC | flags::ACC_SUPER,
			this_class: self.ctx.class_name.clone(),
			super_class: "java/lang/Object".to_owned(),
			source_file: self.unit.source_file.clone(),
			fields,
			methods,
		};

		let used_ptr_kinds = self.ctx.used_ptr_kinds();
		Ok(GeneratedClass {
			class_file,
			pool: self.ctx.pool,
			used_ptr_kinds,
		})
	}

	/// The slot the synthetic `__varargs` parameter of a variadic function
	/// occupies: right after the fixed parameters, wide ones counting two.
	pub(crate) fn varargs_index(&self, func: FuncId) -> u16 {
		let function = self.unit.function(func);
		let mut slot = 0;
		for &param in &function.params {
			let ty = &self.unit.decl(param).ty;
			slot += if jvm_types::value_category(ty).is_wide() { 2 } else { 1 };
		}
		slot
	}

	pub(crate) fn emit_function(&mut self, func: FuncId) -> Result<writer::Method> {
		let function = self.unit.function(func);
		debug!("generating function {:?}", function.name);

		self.cb = CodeBuilder::new(&function.name);
		self.current_function = Some(func);
		self.symbols.clear();
		self.if_stack.clear();
		self.loop_stack.clear();
		self.switch_stack.clear();
		self.named_labels.clear();
		self.assign_target = None;
		self.addr_target = None;
		self.inc_target = None;
		self.flatten_init_depth = 0;
		self.has_return = false;
		self.scope_blocks.clear();

		self.begin_function(func)?;

		if let Some(body) = self.unit.function(func).body {
			self.emit_stmt(body)?;
		}

		self.finish_function(func)?;

		let cb = std::mem::replace(&mut self.cb, CodeBuilder::new("<none>"));
		let code = cb.finish()?;
		self.current_function = None;

		let descriptor = self.ctx.method_descriptor(self.unit, func)?;
		Ok(writer::Method {
			access_flags: flags::ACC_PUBLIC | flags::ACC_STATIC,
			name: self.unit.function(func).name.clone(),
			descriptor,
			code: Some(code),
		})
	}

	/// Installs parameter slots (including the synthetic `__varargs` slot)
	/// and wraps address-taken parameters into their one-element arrays.
	fn begin_function(&mut self, func: FuncId) -> Result<()> {
		let function = self.unit.function(func);
		let params = function.params.clone();
		let is_variadic = function.is_variadic;

		for &param in &params {
			let decl = self.unit.decl(param);
			let slot = decl.param_slot
				.ok_or_else(|| anyhow!("parameter {:?} has no preassigned slot", decl.name))?;
			// the initial frame comes from the signature, never from the
			// heap-lifted storage
			self.cb.set_param(slot, jvm_types::verification_type(&decl.ty)?);
			self.symbols.insert(param, Symbol::Local { slot });
		}

		if is_variadic {
			let slot = self.varargs_index(func);
			self.cb.set_param(slot, VerificationType::object("[Ljava/lang/Object;"));
		}

		// Wrap each address-taken parameter: load it, box it into a fresh
		// one-element array, and point its symbol at the new local. The new
		// local is deliberately not part of the initial frame.
		for &param in &params {
			let decl = self.unit.decl(param);
			if !decl.needs_heap_lift {
				continue;
			}
			let slot = decl.param_slot
				.ok_or_else(|| anyhow!("parameter {:?} has no preassigned slot", decl.name))?;
			let param_ty = decl.ty.clone();

			self.emit_load_local(slot, &param_ty)?;
			// stack: [value]
			self.cb.iconst(&mut self.ctx.pool, 1)?;
			if jvm_types::value_category(&param_ty) == ValueCategory::Reference {
				let object_class = self.ctx.pool.put_class("java/lang/Object")?;
				self.cb.anewarray(object_class, "java/lang/Object")?;
			} else {
				self.cb.newarray(jvm_types::newarray_type_code(&param_ty))?;
			}
			// stack: [value, array] -> array[0] = value -> [array]
			self.emit_store_into_box(&param_ty)?;

			let array_type = VerificationType::object(jvm_types::heap_lift_array_descriptor(&param_ty));
			let new_slot = self.cb.allocate_local(array_type);
			self.cb.astore(new_slot)?;
			self.symbols.insert(param, Symbol::Local { slot: new_slot });
		}

		Ok(())
	}

	/// Synthesizes the terminating return if control can fall off the end.
	fn finish_function(&mut self, func: FuncId) -> Result<()> {
		if !self.has_return || self.cb.is_alive() {
			let return_type = self.unit.function(func).return_type.clone();
			self.emit_return_value(&return_type, true)?;
		}
		Ok(())
	}

	// -- symbols and scopes ------------------------------------------------

	pub(crate) fn ensure_symbol(&mut self, decl_id: DeclId) -> Result<Symbol> {
		if let Some(symbol) = self.symbols.get(&decl_id) {
			return Ok(*symbol);
		}

		let decl = self.unit.decl(decl_id);
		let symbol = if decl.is_global {
			Symbol::Static
		} else if let Some(slot) = decl.param_slot {
			Symbol::Local { slot }
		} else {
			let t = jvm_types::decl_verification_type(decl)?;
			Symbol::Local { slot: self.cb.allocate_local(t) }
		};
		self.symbols.insert(decl_id, symbol);
		Ok(symbol)
	}

	pub(crate) fn begin_scope(&mut self, new_block: bool) {
		self.scope_blocks.push(new_block);
		if new_block {
			self.cb.begin_block();
		}
	}

	pub(crate) fn end_scope(&mut self, what: &str) -> Result<()> {
		let new_block = self.scope_blocks.pop()
			.ok_or_else(|| anyhow!("scope underflow leaving {what}"))?;
		if new_block {
			self.cb.end_block()?;
		}
		Ok(())
	}

	// -- shared emission helpers -------------------------------------------

	/// Loads the local in `slot` with the instruction family `ty` asks for.
	pub(crate) fn emit_load_local(&mut self, slot: u16, ty: &CType) -> Result<()> {
		match jvm_types::value_category(ty) {
			ValueCategory::Int => self.cb.iload(slot),
			ValueCategory::Long => self.cb.lload(slot),
			ValueCategory::Float => self.cb.fload(slot),
			ValueCategory::Double => self.cb.dload(slot),
			ValueCategory::Reference => self.cb.aload(slot),
		}
	}

	pub(crate) fn emit_store_local(&mut self, slot: u16, category: ValueCategory) -> Result<()> {
		match category {
			ValueCategory::Int => self.cb.istore(slot),
			ValueCategory::Long => self.cb.lstore(slot),
			ValueCategory::Float => self.cb.fstore(slot),
			ValueCategory::Double => self.cb.dstore(slot),
			ValueCategory::Reference => self.cb.astore(slot),
		}
	}

	/// `Xastore` keyed by the element's C type; stack is `[array, index,
	/// value]`.
	pub(crate) fn emit_array_element_store(&mut self, element: &CType) -> Result<()> {
		match element {
			CType::Pointer(_) | CType::Array { .. } | CType::Struct { .. } => self.cb.aastore(),
			CType::Double => self.cb.dastore(),
			CType::Char { .. } | CType::Bool => self.cb.bastore(),
			CType::Short { .. } => self.cb.sastore(),
			CType::Long { .. } => self.cb.lastore(),
			CType::Float => self.cb.fastore(),
			_ => self.cb.iastore(),
		}
	}

	/// `Xaload` keyed by the element's C type; stack is `[array, index]`.
	pub(crate) fn emit_array_element_load(&mut self, element: &CType) -> Result<()> {
		match element {
			CType::Pointer(_) | CType::Array { .. } | CType::Struct { .. } => self.cb.aaload(),
			CType::Double => self.cb.daload(),
			CType::Char { .. } | CType::Bool => self.cb.baload(),
			CType::Short { .. } => self.cb.saload(),
			CType::Long { .. } => self.cb.laload(),
			CType::Float => self.cb.faload(),
			_ => self.cb.iaload(),
		}
	}

	/// Allocates a scratch int local.
	pub(crate) fn allocate_temp_local(&mut self) -> u16 {
		self.cb.allocate_local(VerificationType::Integer)
	}

	pub(crate) fn allocate_temp_local_for(&mut self, category: ValueCategory) -> u16 {
		let t = match category {
			ValueCategory::Int => VerificationType::Integer,
			ValueCategory::Long => VerificationType::Long,
			ValueCategory::Float => VerificationType::Float,
			ValueCategory::Double => VerificationType::Double,
			ValueCategory::Reference => VerificationType::object("java/lang/Object"),
		};
		self.cb.allocate_local(t)
	}

	// -- expression traversal ----------------------------------------------

	pub(crate) fn emit_expr(&mut self, id: ExprId) -> Result<()> {
		self.enter_expr(id)?;
		self.emit_expr_children(id)?;
		self.leave_expr(id)
	}

	fn enter_expr(&mut self, id: ExprId) -> Result<()> {
		self.mark_for_condition_start(id)?;

		match &self.unit.expr(id).kind {
			ExprKind::Assign { left, .. } => self.enter_assign(id, *left),
			ExprKind::IncDec { target, .. } => {
				self.inc_target = Some(*target);
			},
			ExprKind::AddressOf(target) => self.enter_address_of(*target),
			ExprKind::InitList(_) => {
				self.flatten_init_depth += 1;
			},
			_ => {},
		}
		Ok(())
	}

	fn emit_expr_children(&mut self, id: ExprId) -> Result<()> {
		match self.unit.expr(id).kind.clone() {
			ExprKind::IntLit(_) | ExprKind::LongLit(_) | ExprKind::FloatLit(_)
			| ExprKind::DoubleLit(_) | ExprKind::BoolLit(_) | ExprKind::Null
			| ExprKind::StringLit(_) | ExprKind::Ident(_)
			| ExprKind::SizeOfType { .. } | ExprKind::SizeOfValue { .. } => Ok(()),

			// evaluated with their own control flow in the leave handlers
			ExprKind::Conditional { .. } | ExprKind::LogicalAnd { .. } | ExprKind::LogicalOr { .. } => Ok(()),

			ExprKind::Index { array, index } => {
				self.emit_expr(array)?;
				self.emit_expr(index)
			},
			ExprKind::Member { target, .. } => self.emit_expr(target),
			ExprKind::Comma { left, right } => {
				self.emit_expr(left)?;
				if self.cb.stack_count() > 0 {
					self.cb.pop_value()?;
				}
				self.emit_expr(right)
			},
			ExprKind::InitList(values) => {
				for value in values {
					self.emit_expr(value)?;
				}
				Ok(())
			},
			ExprKind::DesignatedInit { value, .. } => self.emit_expr(value),
			ExprKind::IncDec { target, .. } => self.emit_expr(target),
			ExprKind::Neg(operand) | ExprKind::Plus(operand) | ExprKind::LogicalNot(operand)
			| ExprKind::BitNot(operand) | ExprKind::AddressOf(operand) | ExprKind::Deref(operand)
			| ExprKind::Conv { operand, .. } | ExprKind::Cast(operand)
			| ExprKind::ArrayToPointer(operand) => self.emit_expr(operand),
			ExprKind::Assign { left, right, .. } => {
				self.emit_expr(left)?;
				self.emit_expr(right)
			},
			ExprKind::Call { function, arguments } => {
				for argument in arguments {
					self.emit_expr(argument)?;
				}
				self.emit_expr(function)
			},
			ExprKind::Binary { left, right, .. } => {
				self.emit_expr(left)?;
				self.emit_expr(right)
			},
		}
	}

	fn leave_expr(&mut self, id: ExprId) -> Result<()> {
		match &self.unit.expr(id).kind {
			ExprKind::IntLit(value) => {
				let value = *value;
				self.cb.iconst(&mut self.ctx.pool, value)?;
			},
			ExprKind::LongLit(value) => {
				let value = *value;
				self.cb.lconst(&mut self.ctx.pool, value)?;
			},
			ExprKind::FloatLit(value) => {
				let value = *value;
				self.cb.fconst(&mut self.ctx.pool, value)?;
			},
			ExprKind::DoubleLit(value) => {
				let value = *value;
				self.cb.dconst(&mut self.ctx.pool, value)?;
			},
			ExprKind::BoolLit(value) => {
				let value = i32::from(*value);
				self.cb.iconst(&mut self.ctx.pool, value)?;
			},
			ExprKind::Null => self.leave_null(id)?,
			ExprKind::StringLit(_) => self.leave_string(id)?,
			ExprKind::Ident(_) => self.leave_identifier(id)?,
			ExprKind::Index { .. } => self.leave_index(id)?,
			ExprKind::Member { .. } => self.leave_member(id)?,
			ExprKind::SizeOfType { .. } | ExprKind::SizeOfValue { .. } => self.leave_sizeof(id)?,
			ExprKind::IncDec { .. } => self.leave_inc_dec(id)?,
			ExprKind::Assign { .. } => self.leave_assign(id)?,
			ExprKind::AddressOf(_) => self.leave_address_of(id)?,
			ExprKind::Deref(_) => self.leave_deref(id)?,
			ExprKind::Neg(_) => self.leave_unary_minus(id)?,
			ExprKind::Plus(_) => {},
			ExprKind::LogicalNot(_) => self.leave_logical_not(id)?,
			ExprKind::BitNot(_) => self.leave_bit_not(id)?,
			ExprKind::Binary { op, .. } if op.is_comparison() => self.leave_compare(id)?,
			ExprKind::Binary { .. } => self.leave_binary_arith(id)?,
			ExprKind::LogicalAnd { .. } => self.leave_logical_and(id)?,
			ExprKind::LogicalOr { .. } => self.leave_logical_or(id)?,
			ExprKind::Conditional { .. } => self.leave_conditional(id)?,
			ExprKind::Conv { .. } => self.leave_conv(id)?,
			ExprKind::Cast(_) => self.leave_cast(id)?,
			ExprKind::ArrayToPointer(_) => self.leave_array_to_pointer(id)?,
			ExprKind::Call { .. } => self.leave_call(id)?,
			ExprKind::InitList(_) => self.leave_init_list(id)?,
			ExprKind::DesignatedInit { .. } => {},
			ExprKind::Comma { .. } => {},
		}
		self.handle_for_expression_leave(id)
	}

	// -- statement traversal -----------------------------------------------

	pub(crate) fn emit_stmt(&mut self, id: StmtId) -> Result<()> {
		// Javac-style reachability gate: skip unreachable statements, except
		// the ones that may carry labels (and so can revive reachability).
		if !self.cb.is_alive() {
			match self.unit.stmt(id).kind {
				StmtKind::Label { .. } | StmtKind::Case { .. } | StmtKind::Default { .. }
				| StmtKind::Compound(_) | StmtKind::If { .. } | StmtKind::While { .. }
				| StmtKind::DoWhile { .. } | StmtKind::For { .. } | StmtKind::Switch { .. } => {},
				_ => return Ok(()),
			}
		}

		let line = self.unit.stmt(id).line;
		if line > 0 {
			self.cb.add_line_number(line);
		}

		self.enter_stmt(id)?;
		self.emit_stmt_children(id)?;
		self.leave_stmt(id)
	}

	fn enter_stmt(&mut self, id: StmtId) -> Result<()> {
		match &self.unit.stmt(id).kind {
			StmtKind::Compound(_) => {
				self.handle_if_boundary(id)?;
				self.handle_for_body_entry(Some(id))?;
				self.handle_switch_entry(id)?;
				self.begin_scope(true);
			},
			StmtKind::If { .. } => self.enter_if(id)?,
			StmtKind::While { .. } => self.enter_while(id)?,
			StmtKind::DoWhile { .. } => self.enter_do_while(id)?,
			StmtKind::For { .. } => self.enter_for(id)?,
			StmtKind::Switch { .. } => self.enter_switch(id)?,
			StmtKind::Case { .. } => self.enter_case(id)?,
			StmtKind::Default { .. } => self.enter_default(id)?,
			StmtKind::Label { .. } => self.enter_label(id)?,
			_ => {
				self.handle_if_boundary(id)?;
				self.handle_for_body_entry(Some(id))?;
				self.handle_switch_entry(id)?;
			},
		}
		Ok(())
	}

	fn emit_stmt_children(&mut self, id: StmtId) -> Result<()> {
		match self.unit.stmt(id).kind.clone() {
			StmtKind::Expression(expr) => self.emit_expr(expr),
			StmtKind::Declaration(decl) => self.emit_decl_children(decl),
			StmtKind::Compound(stmts) => {
				for stmt in stmts {
					self.emit_stmt(stmt)?;
				}
				Ok(())
			},
			StmtKind::If { condition, then_stmt, else_stmt } => {
				if self.cb.is_alive() {
					self.emit_expr(condition)?;
				}
				self.emit_stmt(then_stmt)?;
				if let Some(else_stmt) = else_stmt {
					self.emit_stmt(else_stmt)?;
				}
				Ok(())
			},
			StmtKind::While { condition, body } => {
				if self.cb.is_alive() {
					self.emit_expr(condition)?;
				}
				if let Some(body) = body {
					self.emit_stmt(body)?;
				}
				Ok(())
			},
			StmtKind::DoWhile { body, condition } => {
				if let Some(body) = body {
					self.emit_stmt(body)?;
				}
				if self.cb.is_alive() {
					self.do_while_condition_start()?;
					self.emit_expr(condition)?;
				}
				Ok(())
			},
			StmtKind::For { init, condition, post, body } => {
				if self.cb.is_alive() {
					if let Some(init) = init {
						self.emit_stmt(init)?;
					}
					if let Some(condition) = condition {
						self.emit_expr(condition)?;
					}
					// an empty body never triggers the body-entry handler,
					// so the condition branch has to be synthesized here
					if body.is_none() {
						self.handle_for_body_entry(None)?;
					}
				}
				if let Some(body) = body {
					self.emit_stmt(body)?;
				}
				if self.cb.is_alive() {
					if let Some(post) = post {
						self.emit_expr(post)?;
					}
				}
				Ok(())
			},
			StmtKind::Switch { expression, body } => {
				if self.cb.is_alive() {
					self.emit_expr(expression)?;
				}
				self.emit_stmt(body)
			},
			StmtKind::Case { stmt, .. } | StmtKind::Default { stmt } | StmtKind::Label { stmt, .. } => {
				if let Some(stmt) = stmt {
					self.emit_stmt(stmt)?;
				}
				Ok(())
			},
			StmtKind::Return(expression) => {
				if let Some(expression) = expression {
					self.emit_expr(expression)?;
				}
				Ok(())
			},
			StmtKind::Goto { .. } | StmtKind::Break | StmtKind::Continue | StmtKind::Empty => Ok(()),
		}
	}

	fn leave_stmt(&mut self, id: StmtId) -> Result<()> {
		match &self.unit.stmt(id).kind {
			StmtKind::Compound(_) => self.end_scope("compound statement"),
			StmtKind::Expression(_) => self.leave_expression_stmt(),
			StmtKind::Declaration(decl) => {
				let decl = *decl;
				self.leave_declaration(decl)
			},
			StmtKind::If { .. } => self.leave_if(id),
			StmtKind::While { .. } => self.leave_while(id),
			StmtKind::DoWhile { .. } => self.leave_do_while(id),
			StmtKind::For { .. } => self.leave_for(id),
			StmtKind::Switch { .. } => self.leave_switch(id),
			StmtKind::Case { .. } => self.end_scope("case statement"),
			StmtKind::Default { .. } => self.end_scope("default statement"),
			StmtKind::Label { .. } => Ok(()),
			StmtKind::Goto { .. } => self.leave_goto(id),
			StmtKind::Break => self.cb.emit_break(),
			StmtKind::Continue => self.cb.emit_continue(),
			StmtKind::Return(_) => self.leave_return(id),
			StmtKind::Empty => Ok(()),
		}
	}

	// -- for-loop expression plumbing --------------------------------------

	/// Places the condition or post label of the innermost loop when its
	/// condition/post expression starts evaluating.
	pub(crate) fn mark_for_condition_start(&mut self, expr: ExprId) -> Result<()> {
		let Some(info) = self.loop_stack.last() else { return Ok(()) };
		let (condition, post) = (info.condition, info.post);
		let Some(entry) = self.cb.current_loop() else { return Ok(()) };
		let (cond_label, post_label) = (entry.cond_label, entry.post_label);

		if condition == Some(expr) && !self.cb.label_placed(cond_label) {
			self.cb.place_label(cond_label)?;
		} else if post == Some(expr) {
			if let Some(post_label) = post_label {
				if !self.cb.label_placed(post_label) {
					self.cb.place_label(post_label)?;
				}
			}
		}
		Ok(())
	}

	/// After the post expression of a loop: drop its value and jump back to
	/// the condition.
	pub(crate) fn handle_for_expression_leave(&mut self, expr: ExprId) -> Result<()> {
		if self.loop_stack.last().map(|info| info.post) != Some(Some(expr)) {
			return Ok(());
		}

		if self.cb.stack_count() > 0 {
			self.cb.pop_value()?;
		}

		let cond_label = self.cb.current_loop()
			.map(|entry| entry.cond_label)
			.ok_or_else(|| anyhow!("loop condition target missing"))?;
		self.cb.jump(cond_label)
	}

	/// Returns the registered label for `name`, creating it on first use.
	pub(crate) fn named_label(&mut self, name: &str) -> Label {
		if let Some(&(_, label)) = self.named_labels.iter().find(|(n, _)| n == name) {
			return label;
		}
		let label = self.cb.create_label();
		self.named_labels.push((name.to_owned(), label));
		label
	}
}

/// The output of one translation unit: the class model, its constant pool,
/// and which pointer wrapper classes the generated code referenced.
#[derive(Debug)]
pub struct GeneratedClass {
	pub class_file: writer::ClassFile,
	pub pool: crema::pool::ConstantPool,
	pub used_ptr_kinds: Vec<crate::jvm_types::PointerKind>,
}

impl GeneratedClass {
	/// Renders the class file bytes.
	pub fn to_bytes(self) -> Result<Vec<u8>> {
		let mut out = Vec::new();
		writer::write(&mut out, &self.class_file, self.pool)?;
		Ok(out)
	}
}
