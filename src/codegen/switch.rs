//! `switch`/`case`/`default` lowering, plus `goto` and named labels.
//!
//! A switch stores its discriminant into a fresh local, jumps over the body
//! to a deferred dispatch site, and emits the dispatch (an if-chain,
//! `tableswitch` or `lookupswitch`) once every case label is known and
//! placed.

use anyhow::{anyhow, bail, Result};
use crema::code::{CodeBuilder, IntCmpCond, SwitchContext};
use crate::ast::{ExprId, ExprKind, IdentRef, StmtId, StmtKind};
use crate::jvm_types;
use super::{Codegen, SwitchInfo};

impl Codegen<'_> {
	fn eval_case_value(&self, value: ExprId) -> Result<i32> {
		match &self.unit.expr(value).kind {
			ExprKind::IntLit(value) => Ok(*value),
			ExprKind::BoolLit(value) => Ok(i32::from(*value)),
			ExprKind::Ident(IdentRef::EnumConst { value, .. }) => Ok(*value),
			other => {
				let line = self.unit.expr(value).line;
				bail!("{}: unsupported case expression {other:?}", self.at(line))
			},
		}
	}

	pub(crate) fn enter_switch(&mut self, id: StmtId) -> Result<()> {
		self.handle_if_boundary(id)?;
		self.handle_for_body_entry(Some(id))?;
		self.begin_scope(true);

		let StmtKind::Switch { expression, body } = self.unit.stmt(id).kind else {
			bail!("expected a switch statement");
		};

		let dispatch_label = self.cb.create_label();
		let end_label = self.cb.create_label();
		self.cb.push_switch(SwitchContext {
			dispatch_label,
			end_label,
			default_label: None,
			cases: Vec::new(),
			entry_frame: None,
			expr_local: 0,
		});

		self.switch_stack.push(SwitchInfo {
			stmt: id,
			body,
			expression,
			expr_category: jvm_types::value_category(&self.unit.expr(expression).ty),
			has_expr_local: false,
			has_dispatch_goto: false,
		});
		Ok(())
	}

	pub(crate) fn enter_case(&mut self, id: StmtId) -> Result<()> {
		self.begin_scope(false);

		if self.switch_stack.is_empty() {
			let line = self.unit.stmt(id).line;
			bail!("{}: case outside of a switch", self.at(line));
		}
		let StmtKind::Case { value, .. } = self.unit.stmt(id).kind else {
			bail!("expected a case statement");
		};
		let value = self.eval_case_value(value)?;

		let entry_frame = self.cb.current_switch()
			.ok_or_else(|| anyhow!("no switch on the builder's control stack"))?
			.entry_frame.clone();

		// seeding the entry frame makes placement revive emission after the
		// dispatch jump killed it
		let case_label = self.cb.create_label();
		if let Some(entry_frame) = entry_frame {
			self.cb.seed_label_frame(case_label, entry_frame);
		}
		self.cb.place_label(case_label)?;
		self.cb.switch_add_case(value, case_label)
	}

	pub(crate) fn enter_default(&mut self, id: StmtId) -> Result<()> {
		self.begin_scope(false);

		if self.switch_stack.is_empty() {
			let line = self.unit.stmt(id).line;
			bail!("{}: default outside of a switch", self.at(line));
		}

		let entry = self.cb.current_switch()
			.ok_or_else(|| anyhow!("no switch on the builder's control stack"))?;
		if entry.default_label.is_some() {
			let line = self.unit.stmt(id).line;
			bail!("{}: multiple default labels in one switch", self.at(line));
		}
		let entry_frame = entry.entry_frame.clone();

		let default_label = self.cb.create_label();
		if let Some(entry_frame) = entry_frame {
			self.cb.seed_label_frame(default_label, entry_frame);
		}
		self.cb.place_label(default_label)?;

		if let Some(entry) = self.cb.current_switch_mut() {
			entry.default_label = Some(default_label);
		}
		Ok(())
	}

	pub(crate) fn leave_switch(&mut self, id: StmtId) -> Result<()> {
		let info = self.switch_stack.pop()
			.ok_or_else(|| anyhow!("switch context underflow"))?;
		if info.stmt != id {
			bail!("mismatched switch context");
		}

		let entry = self.cb.current_switch()
			.ok_or_else(|| anyhow!("no switch on the builder's control stack"))?;
		let (dispatch_label, end_label) = (entry.dispatch_label, entry.end_label);

		// dead path: the discriminant never ran, only tidy up the labels
		if !info.has_expr_local {
			if !self.cb.label_placed(dispatch_label) {
				self.cb.place_label(dispatch_label)?;
			}
			self.cb.place_label(end_label)?;
			self.cb.pop_switch()?;
			return self.end_scope("switch statement");
		}

		if !info.has_dispatch_goto {
			bail!("switch dispatch setup incomplete");
		}

		// the last case falls through to the end
		self.cb.jump(end_label)?;
		self.cb.place_label(dispatch_label)?;

		let entry = self.cb.current_switch()
			.ok_or_else(|| anyhow!("no switch on the builder's control stack"))?;
		let expr_local = entry.expr_local;
		let mut cases = entry.cases.clone();
		let explicit_default = entry.default_label;

		let default_target = match explicit_default {
			Some(label) => label,
			None => {
				// without an explicit default the dispatch needs a placed
				// target that just jumps to the end
				let default_target = self.cb.create_label();
				let skip = self.cb.create_label();
				let dispatch_frame = self.cb.snapshot_frame();
				self.cb.jump(skip)?;

				self.cb.seed_label_frame(default_target, dispatch_frame);
				self.cb.place_label(default_target)?;
				self.cb.jump(end_label)?;

				self.cb.place_label(skip)?;
				default_target
			},
		};

		if cases.is_empty() {
			self.cb.jump(default_target)?;
		} else if cases.len() < 3 {
			// an if-else chain beats a dispatch table for a couple of cases
			for &(value, label) in &cases {
				self.cb.iload(expr_local)?;
				self.cb.iconst(&mut self.ctx.pool, value)?;
				self.cb.jump_if_icmp(IntCmpCond::Eq, label)?;
			}
			self.cb.jump(default_target)?;
		} else {
			cases.sort_by_key(|&(value, _)| value);
			let low = cases[0].0;
			let high = cases[cases.len() - 1].0;

			self.cb.iload(expr_local)?;
			if CodeBuilder::should_use_tableswitch(cases.len() as i32, low, high) {
				let size = (high as i64 - low as i64 + 1) as usize;
				let mut table = vec![default_target; size];
				for &(value, label) in &cases {
					table[(value - low) as usize] = label;
				}
				self.cb.tableswitch(default_target, low, high, &table)?;
			} else {
				self.cb.lookupswitch(default_target, &cases)?;
			}
		}

		self.cb.place_label(end_label)?;
		self.cb.pop_switch()?;
		self.end_scope("switch statement")
	}

	// -- goto and named labels ---------------------------------------------

	pub(crate) fn enter_label(&mut self, id: StmtId) -> Result<()> {
		self.handle_if_boundary(id)?;
		self.handle_for_body_entry(Some(id))?;

		let StmtKind::Label { name, .. } = self.unit.stmt(id).kind.clone() else {
			bail!("expected a label statement");
		};
		let label = self.named_label(&name);

		if !self.cb.label_placed(label) {
			self.cb.place_label(label)?;
		}

		// even in dead code, a backward jump may target this label later;
		// the code after it has to exist
		self.cb.mark_alive();
		Ok(())
	}

	pub(crate) fn leave_goto(&mut self, id: StmtId) -> Result<()> {
		let StmtKind::Goto { label: name } = self.unit.stmt(id).kind.clone() else {
			bail!("expected a goto statement");
		};
		let label = self.named_label(&name);

		if self.cb.label_placed(label) {
			// a backward jump pins the frame at its target
			self.cb.mark_loop_header(label);
		} else {
			self.cb.mark_jump_only(label);
		}

		self.cb.jump(label)
	}
}
