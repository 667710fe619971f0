//! `if`, `while`, `do`-`while` and `for` lowering.
//!
//! The enter handlers push contexts and place loop headers; the condition
//! branches themselves are emitted lazily, at the moment the then branch or
//! loop body is entered (see the boundary handlers in `stmt.rs`).

use anyhow::{anyhow, bail, Result};
use crema::code::LoopContext;
use crate::ast::{ExprId, StmtId, StmtKind};
use super::{Codegen, IfContext, LoopInfo};

impl Codegen<'_> {
	pub(crate) fn enter_if(&mut self, id: StmtId) -> Result<()> {
		self.handle_if_boundary(id)?;
		self.handle_for_body_entry(Some(id))?;
		self.begin_scope(false);

		let StmtKind::If { then_stmt, else_stmt, .. } = self.unit.stmt(id).kind else {
			bail!("expected an if statement");
		};

		let then_label = self.cb.create_label();
		let else_label = else_stmt.map(|_| self.cb.create_label());
		let end_label = self.cb.create_label();

		self.if_stack.push(IfContext {
			stmt: id,
			then_stmt,
			else_stmt,
			then_label,
			else_label,
			end_label,
			// in dead code there is no condition value, so no branch either
			has_cond_branch: !self.cb.is_alive(),
			then_alive: false,
		});
		Ok(())
	}

	pub(crate) fn leave_if(&mut self, id: StmtId) -> Result<()> {
		let ctx = self.if_stack.pop()
			.ok_or_else(|| anyhow!("if context underflow"))?;
		if ctx.stmt != id {
			bail!("mismatched if context");
		}
		if !ctx.has_cond_branch {
			bail!("if condition branch missing");
		}

		// an else label never reached on the live path still must be placed
		if let Some(else_label) = ctx.else_label {
			if !self.cb.label_placed(else_label) {
				self.cb.place_label(else_label)?;
			}
		}

		let (then_alive, else_alive) = if ctx.else_stmt.is_some() {
			// the then branch saved its liveness when it jumped to the end
			(ctx.then_alive, self.cb.is_alive())
		} else {
			// no else: the implicit empty else path is live iff the
			// condition branch saved a frame at the end label
			(self.cb.is_alive(), self.cb.label_frame_saved(ctx.end_label))
		};

		self.cb.place_label(ctx.end_label)?;

		if then_alive || else_alive {
			self.cb.mark_alive();
		} else {
			self.cb.mark_dead();
		}

		self.end_scope("if statement")
	}

	/// Shared loop-context setup for `while`, `do`-`while` and `for`.
	fn push_loop(&mut self, id: StmtId, body: Option<StmtId>, condition: Option<ExprId>, post: Option<ExprId>) {
		let cond_label = self.cb.create_label();
		let body_label = self.cb.create_label();
		let post_label = post.map(|_| self.cb.create_label());
		let end_label = self.cb.create_label();

		self.cb.push_loop(LoopContext {
			cond_label,
			body_label,
			post_label,
			end_label,
			continue_label: post_label.unwrap_or(cond_label),
			is_do_while: false,
			has_post: post.is_some(),
		});

		self.loop_stack.push(LoopInfo {
			stmt: id,
			body,
			condition,
			post,
			is_do_while: false,
			has_cond_branch: !self.cb.is_alive(),
		});
	}

	pub(crate) fn enter_while(&mut self, id: StmtId) -> Result<()> {
		self.handle_if_boundary(id)?;
		self.handle_for_body_entry(Some(id))?;
		self.begin_scope(true);

		let StmtKind::While { condition, body } = self.unit.stmt(id).kind else {
			bail!("expected a while statement");
		};
		self.push_loop(id, body, Some(condition), None);

		// the condition label doubles as the loop header frame
		let cond_label = self.cb.current_loop()
			.map(|entry| entry.cond_label)
			.ok_or_else(|| anyhow!("loop context missing"))?;
		self.cb.mark_loop_header(cond_label);
		self.cb.place_label(cond_label)
	}

	pub(crate) fn leave_while(&mut self, id: StmtId) -> Result<()> {
		let entry = self.cb.current_loop()
			.ok_or_else(|| anyhow!("loop context missing"))?;
		let (cond_label, body_label, end_label) = (entry.cond_label, entry.body_label, entry.end_label);

		let info = self.loop_stack.pop()
			.ok_or_else(|| anyhow!("loop context underflow"))?;
		if info.stmt != id {
			bail!("mismatched while context");
		}
		self.cb.pop_loop()?;

		if !self.cb.label_placed(cond_label) {
			self.cb.place_label(cond_label)?;
		}
		if !self.cb.label_placed(body_label) {
			self.cb.place_label(body_label)?;
		}

		// an empty body leaves the condition value unconsumed
		if !info.has_cond_branch && self.cb.is_alive() {
			if let Some(condition) = info.condition {
				let cond_ty = self.unit.expr(condition).ty.clone();
				let line = self.unit.expr(condition).line;
				if cond_ty.is_void_pointer() {
					bail!("{}: a void* value cannot be used as a condition", self.at(line));
				}
				self.emit_branch_if_false(&cond_ty, end_label)?;
			}
		}

		self.cb.jump(cond_label)?;
		self.cb.place_label(end_label)?;

		self.end_scope("while statement")
	}

	pub(crate) fn enter_do_while(&mut self, id: StmtId) -> Result<()> {
		self.handle_if_boundary(id)?;
		self.begin_scope(true);

		let StmtKind::DoWhile { body, condition } = self.unit.stmt(id).kind else {
			bail!("expected a do-while statement");
		};
		self.push_loop(id, body, Some(condition), None);
		if let Some(info) = self.loop_stack.last_mut() {
			info.is_do_while = true;
		}

		// the body comes first, its label is the backward-jump header
		let entry = self.cb.current_loop_mut()
			.ok_or_else(|| anyhow!("loop context missing"))?;
		entry.is_do_while = true;
		let body_label = entry.body_label;
		self.cb.mark_loop_header(body_label);
		self.cb.place_label(body_label)
	}

	pub(crate) fn leave_do_while(&mut self, id: StmtId) -> Result<()> {
		let entry = self.cb.current_loop()
			.ok_or_else(|| anyhow!("loop context missing"))?;
		let (cond_label, body_label, end_label) = (entry.cond_label, entry.body_label, entry.end_label);

		let info = self.loop_stack.pop()
			.ok_or_else(|| anyhow!("loop context underflow"))?;
		if info.stmt != id {
			bail!("mismatched do-while context");
		}
		self.cb.pop_loop()?;

		// the condition only ran if the body end was reachable; label
		// placement below may revive emission, so remember the state now
		let was_alive = self.cb.is_alive();

		if !self.cb.label_placed(body_label) {
			self.cb.place_label(body_label)?;
		}
		if !self.cb.label_placed(cond_label) {
			self.cb.place_label(cond_label)?;
		}

		if !was_alive {
			self.cb.place_label(end_label)?;
			return self.end_scope("do-while statement");
		}

		let StmtKind::DoWhile { condition, .. } = self.unit.stmt(id).kind else {
			bail!("expected a do-while statement");
		};
		let cond_ty = self.unit.expr(condition).ty.clone();
		let line = self.unit.expr(condition).line;
		if cond_ty.is_void_pointer() {
			bail!("{}: a void* value cannot be used as a condition", self.at(line));
		}
		self.emit_branch_if_true(&cond_ty, body_label)?;

		self.cb.place_label(end_label)?;
		self.end_scope("do-while statement")
	}

	pub(crate) fn enter_for(&mut self, id: StmtId) -> Result<()> {
		self.handle_if_boundary(id)?;
		self.handle_for_body_entry(Some(id))?;
		self.begin_scope(true);

		let StmtKind::For { condition, post, body, .. } = self.unit.stmt(id).kind else {
			bail!("expected a for statement");
		};
		self.push_loop(id, body, condition, post);

		let cond_label = self.cb.current_loop()
			.map(|entry| entry.cond_label)
			.ok_or_else(|| anyhow!("loop context missing"))?;
		self.cb.mark_loop_header(cond_label);
		Ok(())
	}

	pub(crate) fn leave_for(&mut self, id: StmtId) -> Result<()> {
		let entry = self.cb.current_loop()
			.ok_or_else(|| anyhow!("loop context missing"))?;
		let (cond_label, body_label, post_label, end_label, has_post) = (
			entry.cond_label, entry.body_label, entry.post_label, entry.end_label, entry.has_post,
		);

		let info = self.loop_stack.pop()
			.ok_or_else(|| anyhow!("loop context underflow"))?;
		if info.stmt != id {
			bail!("mismatched for context");
		}
		self.cb.pop_loop()?;

		if !self.cb.label_placed(cond_label) {
			self.cb.place_label(cond_label)?;
		}
		if !self.cb.label_placed(body_label) {
			self.cb.place_label(body_label)?;
		}
		if let Some(post_label) = post_label {
			if !self.cb.label_placed(post_label) {
				self.cb.place_label(post_label)?;
			}
		}

		// with a post expression the back edge was already emitted after it
		if !has_post {
			self.cb.jump(cond_label)?;
		}

		self.cb.place_label(end_label)?;
		self.end_scope("for statement")
	}
}
