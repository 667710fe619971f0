//! Statement-boundary plumbing shared by all statement kinds, plus the
//! simple statements.
//!
//! The boundary handlers fire when a statement turns out to be the then/else
//! branch of an `if`, the body of a loop, or the body of a `switch`: that is
//! the point where the pending condition branch is emitted and the relevant
//! labels are placed.

use anyhow::{anyhow, bail, Result};
use crate::ast::{CType, ExprId, StmtId, StmtKind};
use crate::jvm_types::{self, ValueCategory};
use super::Codegen;

impl Codegen<'_> {
	/// Emits the branch of the enclosing `if` when `stmt` is its then
	/// branch, or the then→end jump and else label when it is the else
	/// branch.
	pub(crate) fn handle_if_boundary(&mut self, stmt: StmtId) -> Result<()> {
		let Some(index) = self.if_stack.iter().rposition(|ctx| {
			(ctx.then_stmt == stmt && !ctx.has_cond_branch)
				|| (ctx.else_stmt == Some(stmt) && ctx.has_cond_branch)
		}) else {
			return Ok(());
		};

		let is_then = self.if_stack[index].then_stmt == stmt && !self.if_stack[index].has_cond_branch;
		if is_then {
			let then_label = self.if_stack[index].then_label;
			let else_label = self.if_stack[index].else_label;
			let end_label = self.if_stack[index].end_label;
			let if_stmt = self.if_stack[index].stmt;

			if !self.cb.is_alive() {
				// dead path: place the label without a condition branch
				self.cb.place_label(then_label)?;
				self.if_stack[index].has_cond_branch = true;
				return Ok(());
			}

			let StmtKind::If { condition, .. } = self.unit.stmt(if_stmt).kind else {
				bail!("if context does not point at an if statement");
			};
			let cond_ty = self.unit.expr(condition).ty.clone();
			let line = self.unit.expr(condition).line;
			if cond_ty.is_void_pointer() {
				bail!("{}: a void* value cannot be used as a condition", self.at(line));
			}

			let false_block = else_label.unwrap_or(end_label);
			self.emit_branch_if_false(&cond_ty, false_block)?;
			self.if_stack[index].has_cond_branch = true;
			self.cb.place_label(then_label)?;
			return Ok(());
		}

		// else boundary: remember how the then branch ended, skip it
		let end_label = self.if_stack[index].end_label;
		let else_label = self.if_stack[index].else_label
			.ok_or_else(|| anyhow!("else boundary without an else label"))?;
		self.if_stack[index].then_alive = self.cb.is_alive();
		self.cb.jump(end_label)?;
		self.cb.place_label(else_label)
	}

	/// Emits the loop's condition branch and places the body label when
	/// `stmt` is the body of the innermost loop. `None` stands for an empty
	/// loop body, which still needs its branch synthesized.
	pub(crate) fn handle_for_body_entry(&mut self, stmt: Option<StmtId>) -> Result<()> {
		let Some(info) = self.loop_stack.last() else {
			return Ok(());
		};
		if info.body != stmt {
			return Ok(());
		}
		let (is_do_while, condition, has_cond_branch) = (info.is_do_while, info.condition, info.has_cond_branch);

		let entry = self.cb.current_loop()
			.ok_or_else(|| anyhow!("no loop on the builder's control stack"))?;
		let (cond_label, body_label, end_label) = (entry.cond_label, entry.body_label, entry.end_label);

		if is_do_while {
			if !self.cb.label_placed(body_label) {
				self.cb.place_label(body_label)?;
			}
			return Ok(());
		}

		if !self.cb.is_alive() {
			// dead path: just place the labels
			if !self.cb.label_placed(cond_label) {
				self.cb.place_label(cond_label)?;
			}
			self.cb.place_label(body_label)?;
			if let Some(info) = self.loop_stack.last_mut() {
				info.has_cond_branch = true;
			}
			return Ok(());
		}

		if condition.is_some() && !self.cb.label_placed(cond_label) {
			bail!("loop condition label was never placed");
		}
		if condition.is_none() && !self.cb.label_placed(cond_label) {
			self.cb.place_label(cond_label)?;
		}

		if !has_cond_branch {
			if let Some(condition) = condition {
				let cond_ty = self.unit.expr(condition).ty.clone();
				let line = self.unit.expr(condition).line;
				if cond_ty.is_void_pointer() {
					bail!("{}: a void* value cannot be used as a condition", self.at(line));
				}
				self.emit_branch_if_false(&cond_ty, end_label)?;
			}
			// without a condition this is an infinite loop falling through
			if let Some(info) = self.loop_stack.last_mut() {
				info.has_cond_branch = true;
			}
		}

		self.cb.place_label(body_label)
	}

	/// Spills the switch discriminant into a local and jumps to the deferred
	/// dispatch site when `stmt` is the body of the innermost switch.
	pub(crate) fn handle_switch_entry(&mut self, stmt: StmtId) -> Result<()> {
		let Some(info) = self.switch_stack.last() else {
			return Ok(());
		};
		if info.body != stmt || info.has_dispatch_goto {
			return Ok(());
		}
		let (expr_category, expression) = (info.expr_category, info.expression);

		if !self.cb.is_alive() {
			if let Some(info) = self.switch_stack.last_mut() {
				info.has_dispatch_goto = true;
			}
			return Ok(());
		}

		if self.cb.stack_count() == 0 {
			let line = self.unit.expr(expression).line;
			bail!("{}: switch expression value missing on the stack", self.at(line));
		}

		let expr_local = self.allocate_temp_local_for(expr_category);
		self.emit_store_local(expr_local, expr_category)?;

		// placing a case label must revive emission with the frame captured
		// here, after the dispatch jump kills it
		let entry_frame = self.cb.snapshot_frame();
		let dispatch_label = {
			let entry = self.cb.current_switch_mut()
				.ok_or_else(|| anyhow!("no switch on the builder's control stack"))?;
			entry.expr_local = expr_local;
			entry.entry_frame = Some(entry_frame);
			entry.dispatch_label
		};

		self.cb.jump(dispatch_label)?;
		if let Some(info) = self.switch_stack.last_mut() {
			info.has_expr_local = true;
			info.has_dispatch_goto = true;
		}
		Ok(())
	}

	/// Places the condition label of a do-while before its condition
	/// expression runs.
	pub(crate) fn do_while_condition_start(&mut self) -> Result<()> {
		let cond_label = self.cb.current_loop()
			.map(|entry| entry.cond_label)
			.ok_or_else(|| anyhow!("no loop on the builder's control stack"))?;
		if !self.cb.label_placed(cond_label) {
			self.cb.place_label(cond_label)?;
		}
		Ok(())
	}

	/// An expression statement discards its value.
	pub(crate) fn leave_expression_stmt(&mut self) -> Result<()> {
		if self.cb.stack_count() > 0 {
			self.cb.pop_value()?;
		}
		Ok(())
	}

	pub(crate) fn leave_return(&mut self, id: StmtId) -> Result<()> {
		let return_type = self.current_function
			.map(|func| self.unit.function(func).return_type.clone())
			.unwrap_or(CType::Void);
		let _ = id;
		self.emit_return_value(&return_type, false)?;
		self.has_return = true;
		Ok(())
	}

	/// Converts the stack and emits the return instruction for the
	/// function's return category. With `synthesize_default`, an empty stack
	/// produces the default value (zero, null wrapper) first, for control
	/// that falls off the end of a non-void function.
	pub(crate) fn emit_return_value(&mut self, return_type: &CType, synthesize_default: bool) -> Result<()> {
		if return_type.is_void() {
			if self.cb.stack_count() > 0 {
				self.cb.pop_value()?;
			}
			self.cb.void_return();
			return Ok(());
		}

		if self.cb.stack_count() == 0 {
			if !synthesize_default && !self.cb.is_alive() {
				return Ok(());
			}
			if return_type.is_pointer() && !return_type.is_void_pointer() {
				self.emit_null_pointer(return_type)?;
			} else {
				match jvm_types::value_category(return_type) {
					ValueCategory::Reference => self.cb.aconst_null(),
					ValueCategory::Double => self.cb.dconst(&mut self.ctx.pool, 0.0)?,
					ValueCategory::Float => self.cb.fconst(&mut self.ctx.pool, 0.0)?,
					ValueCategory::Long => self.cb.lconst(&mut self.ctx.pool, 0)?,
					ValueCategory::Int => self.cb.iconst(&mut self.ctx.pool, 0)?,
				}
			}
		}

		match jvm_types::value_category(return_type) {
			ValueCategory::Reference => {
				// returned structs are copies, like every other struct value
				if return_type.is_struct_or_union() {
					self.emit_struct_deep_copy(return_type)?;
				}
				self.cb.areturn()
			},
			ValueCategory::Double => self.cb.dreturn(),
			ValueCategory::Float => self.cb.freturn(),
			ValueCategory::Long => self.cb.lreturn(),
			ValueCategory::Int => self.cb.ireturn(),
		}
	}

	/// Children of a declaration statement: VLA dimension sizes, then the
	/// initializer.
	pub(crate) fn emit_decl_children(&mut self, decl_id: crate::ast::DeclId) -> Result<()> {
		let decl = self.unit.decl(decl_id);
		let ty = decl.ty.clone();
		let initializer = decl.initializer;

		if ty.is_array() {
			let mut t = &ty;
			let mut sizes: Vec<ExprId> = Vec::new();
			while let CType::Array { element, length } = t {
				if let crate::ast::ArrayLength::Variable(size) = length {
					sizes.push(*size);
				}
				t = element.as_ref();
			}
			for size in sizes {
				self.emit_expr(size)?;
			}
		}

		if let Some(initializer) = initializer {
			self.emit_expr(initializer)?;
		}
		Ok(())
	}
}
