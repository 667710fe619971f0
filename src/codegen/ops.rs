//! Arithmetic, comparisons, casts, short-circuit operators and the ternary.

use anyhow::{bail, Result};
use crema::code::{ACmpCond, CmpNanBias, IfCond, IntCmpCond, Label};
use crate::ast::{BinaryOp, ConvKind, CType, ExprId, ExprKind};
use crate::jvm_types::{value_category, ValueCategory};
use super::Codegen;

/// `true` when both types use the same JVM representation and no conversion
/// instruction is needed (signedness does not change the representation).
fn same_basic(a: &CType, b: &CType) -> bool {
	matches!(
		(a, b),
		(CType::Char { .. }, CType::Char { .. })
		| (CType::Short { .. }, CType::Short { .. })
		| (CType::Int { .. }, CType::Int { .. })
		| (CType::Long { .. }, CType::Long { .. })
		| (CType::Bool, CType::Bool)
		| (CType::Float, CType::Float)
		| (CType::Double, CType::Double)
		| (CType::Enum { .. }, CType::Enum { .. })
	)
}

fn small_int(ty: &CType) -> bool {
	ty.is_char() || ty.is_short() || ty.is_int()
}

impl Codegen<'_> {
	fn emit_unsigned_helper(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<()> {
		let index = self.ctx.pool.put_method_ref(owner, name, descriptor)?;
		self.cb.invokestatic(index, descriptor)
	}

	// -- pointer arithmetic ------------------------------------------------

	/// `p + n` / `n + p`. Stack holds the operands in source order; the
	/// integer is narrowed from `long` and swapped below the pointer first.
	fn emit_ptr_add_expr(&mut self, left: ExprId, right: ExprId) -> Result<()> {
		let left_ty = self.unit.expr(left).ty.clone();
		let right_ty = self.unit.expr(right).ty.clone();
		let left_is_ptr = left_ty.is_pointer();
		let (ptr_ty, int_ty) = if left_is_ptr { (left_ty, right_ty) } else { (right_ty, left_ty) };

		if !left_is_ptr {
			// [int, ptr] -> [ptr, int]
			if int_ty.is_long() {
				bail!("pointer offset on the left of a pointer must already be an int");
			}
			self.cb.swap()?;
		} else if int_ty.is_long() {
			self.cb.l2i()?;
		}
		self.emit_ptr_add(&ptr_ty)
	}

	/// `p - n` lowered as `p + (-n)`.
	fn emit_ptr_sub_int(&mut self, left: ExprId, right: ExprId) -> Result<()> {
		let left_ty = self.unit.expr(left).ty.clone();
		if self.unit.expr(right).ty.is_long() {
			self.cb.l2i()?;
		}
		self.cb.ineg()?;
		self.emit_ptr_add(&left_ty)
	}

	// -- arithmetic --------------------------------------------------------

	pub(crate) fn leave_binary_arith(&mut self, id: ExprId) -> Result<()> {
		let ExprKind::Binary { op, left, right } = self.unit.expr(id).kind else {
			bail!("expected a binary expression");
		};
		let expr_ty = self.unit.expr(id).ty.clone();
		let line = self.unit.expr(id).line;

		let left_ptr = self.unit.expr(left).ty.is_pointer();
		let right_ptr = self.unit.expr(right).ty.is_pointer();

		if (left_ptr || right_ptr) && matches!(op, BinaryOp::Add | BinaryOp::Sub) {
			if self.unit.expr(left).ty.is_void_pointer() || self.unit.expr(right).ty.is_void_pointer() {
				bail!("{}: arithmetic on void* is not supported", self.at(line));
			}
			return match op {
				BinaryOp::Add => self.emit_ptr_add_expr(left, right),
				BinaryOp::Sub if left_ptr && right_ptr => {
					let left_ty = self.unit.expr(left).ty.clone();
					self.emit_ptr_diff(&left_ty)
				},
				BinaryOp::Sub => self.emit_ptr_sub_int(left, right),
				_ => unreachable!(),
			};
		}

		let is_unsigned = expr_ty.is_unsigned();
		match (op, value_category(&expr_ty)) {
			(BinaryOp::Add, ValueCategory::Double) => self.cb.dadd(),
			(BinaryOp::Add, ValueCategory::Float) => self.cb.fadd(),
			(BinaryOp::Add, ValueCategory::Long) => self.cb.ladd(),
			(BinaryOp::Add, ValueCategory::Int) => self.cb.iadd(),
			(BinaryOp::Sub, ValueCategory::Double) => self.cb.dsub(),
			(BinaryOp::Sub, ValueCategory::Float) => self.cb.fsub(),
			(BinaryOp::Sub, ValueCategory::Long) => self.cb.lsub(),
			(BinaryOp::Sub, ValueCategory::Int) => self.cb.isub(),
			(BinaryOp::Mul, ValueCategory::Double) => self.cb.dmul(),
			(BinaryOp::Mul, ValueCategory::Float) => self.cb.fmul(),
			(BinaryOp::Mul, ValueCategory::Long) => self.cb.lmul(),
			(BinaryOp::Mul, ValueCategory::Int) => self.cb.imul(),
			(BinaryOp::Div, ValueCategory::Double) => self.cb.ddiv(),
			(BinaryOp::Div, ValueCategory::Float) => self.cb.fdiv(),
			(BinaryOp::Div, ValueCategory::Long) if is_unsigned =>
				self.emit_unsigned_helper("java/lang/Long", "divideUnsigned", "(JJ)J"),
			(BinaryOp::Div, ValueCategory::Long) => self.cb.ldiv(),
			(BinaryOp::Div, ValueCategory::Int) if is_unsigned =>
				self.emit_unsigned_helper("java/lang/Integer", "divideUnsigned", "(II)I"),
			(BinaryOp::Div, ValueCategory::Int) => self.cb.idiv(),
			(BinaryOp::Mod, ValueCategory::Double) => self.cb.drem(),
			(BinaryOp::Mod, ValueCategory::Float) => self.cb.frem(),
			(BinaryOp::Mod, ValueCategory::Long) if is_unsigned =>
				self.emit_unsigned_helper("java/lang/Long", "remainderUnsigned", "(JJ)J"),
			(BinaryOp::Mod, ValueCategory::Long) => self.cb.lrem(),
			(BinaryOp::Mod, ValueCategory::Int) if is_unsigned =>
				self.emit_unsigned_helper("java/lang/Integer", "remainderUnsigned", "(II)I"),
			(BinaryOp::Mod, ValueCategory::Int) => self.cb.irem(),
			(BinaryOp::BitAnd, ValueCategory::Long) => self.cb.land(),
			(BinaryOp::BitAnd, ValueCategory::Int) => self.cb.iand(),
			(BinaryOp::BitOr, ValueCategory::Long) => self.cb.lor(),
			(BinaryOp::BitOr, ValueCategory::Int) => self.cb.ior(),
			(BinaryOp::BitXor, ValueCategory::Long) => self.cb.lxor(),
			(BinaryOp::BitXor, ValueCategory::Int) => self.cb.ixor(),
			(BinaryOp::Shl, ValueCategory::Long) => self.cb.lshl(),
			(BinaryOp::Shl, ValueCategory::Int) => self.cb.ishl(),
			(BinaryOp::Shr, ValueCategory::Long) if is_unsigned => self.cb.lushr(),
			(BinaryOp::Shr, ValueCategory::Long) => self.cb.lshr(),
			(BinaryOp::Shr, ValueCategory::Int) if is_unsigned => self.cb.iushr(),
			(BinaryOp::Shr, ValueCategory::Int) => self.cb.ishr(),
			(op, category) => bail!(
				"{}: unsupported operand category {category:?} for operator {op:?}",
				self.at(line),
			),
		}
	}

	pub(crate) fn leave_unary_minus(&mut self, id: ExprId) -> Result<()> {
		let expr_ty = &self.unit.expr(id).ty;
		match value_category(expr_ty) {
			ValueCategory::Double => self.cb.dneg(),
			ValueCategory::Float => self.cb.fneg(),
			ValueCategory::Long => self.cb.lneg(),
			ValueCategory::Int => self.cb.ineg(),
			ValueCategory::Reference => {
				let line = self.unit.expr(id).line;
				bail!("{}: unary minus on a non-numeric value", self.at(line))
			},
		}
	}

	pub(crate) fn leave_bit_not(&mut self, id: ExprId) -> Result<()> {
		let expr_ty = self.unit.expr(id).ty.clone();
		if expr_ty.is_long() {
			self.cb.lconst(&mut self.ctx.pool, -1)?;
			self.cb.lxor()
		} else {
			self.cb.iconst(&mut self.ctx.pool, -1)?;
			self.cb.ixor()
		}
	}

	// -- truthiness branches -----------------------------------------------

	/// Branches to `target` when the value of type `cond_ty` on top of the
	/// stack is false: zero for numbers, a null `base` for pointer wrappers,
	/// null for arrays and `void*`.
	pub(crate) fn emit_branch_if_false(&mut self, cond_ty: &CType, target: Label) -> Result<()> {
		if cond_ty.is_pointer() {
			if cond_ty.is_void_pointer() {
				self.cb.jump_if_null(target)
			} else {
				self.emit_ptr_get_base(cond_ty)?;
				self.cb.jump_if_null(target)
			}
		} else if cond_ty.is_array() {
			self.cb.jump_if_null(target)
		} else {
			self.cb.jump_if_not(target)
		}
	}

	/// Branches to `target` when the value on top of the stack is true.
	pub(crate) fn emit_branch_if_true(&mut self, cond_ty: &CType, target: Label) -> Result<()> {
		if cond_ty.is_pointer() {
			if cond_ty.is_void_pointer() {
				self.cb.jump_if_not_null(target)
			} else {
				self.emit_ptr_get_base(cond_ty)?;
				self.cb.jump_if_not_null(target)
			}
		} else if cond_ty.is_array() {
			self.cb.jump_if_not_null(target)
		} else {
			self.cb.jump_if(target)
		}
	}

	// -- comparison value materialization ----------------------------------

	/// `[int]` → `[0 or 1]` via an `if<cond>` branch.
	pub(crate) fn emit_if_comparison(&mut self, cond: IfCond) -> Result<()> {
		let true_block = self.cb.create_label();
		let end_block = self.cb.create_label();

		self.cb.jump_if_op(cond, true_block)?;
		self.cb.iconst(&mut self.ctx.pool, 0)?;
		self.cb.jump(end_block)?;
		self.cb.place_label(true_block)?;
		self.cb.iconst(&mut self.ctx.pool, 1)?;
		self.cb.place_label(end_block)
	}

	/// `[int, int]` → `[0 or 1]` via `if_icmp<cond>`.
	pub(crate) fn emit_icmp_comparison(&mut self, cond: IntCmpCond) -> Result<()> {
		let true_block = self.cb.create_label();
		let end_block = self.cb.create_label();

		self.cb.jump_if_icmp(cond, true_block)?;
		self.cb.iconst(&mut self.ctx.pool, 0)?;
		self.cb.jump(end_block)?;
		self.cb.place_label(true_block)?;
		self.cb.iconst(&mut self.ctx.pool, 1)?;
		self.cb.place_label(end_block)
	}

	/// `[ref, ref]` → `[0 or 1]` via `if_acmp<cond>`.
	pub(crate) fn emit_acmp_comparison(&mut self, cond: ACmpCond) -> Result<()> {
		let true_block = self.cb.create_label();
		let end_block = self.cb.create_label();

		self.cb.jump_if_acmp(cond, true_block)?;
		self.cb.iconst(&mut self.ctx.pool, 0)?;
		self.cb.jump(end_block)?;
		self.cb.place_label(true_block)?;
		self.cb.iconst(&mut self.ctx.pool, 1)?;
		self.cb.place_label(end_block)
	}

	/// `[ref]` → `[0 or 1]`: 1 when null and `check_null`, inverted
	/// otherwise.
	pub(crate) fn emit_if_ref_null_check(&mut self, check_null: bool) -> Result<()> {
		let null_block = self.cb.create_label();
		let end_block = self.cb.create_label();

		self.cb.jump_if_null(null_block)?;
		self.cb.iconst(&mut self.ctx.pool, if check_null { 0 } else { 1 })?;
		self.cb.jump(end_block)?;
		self.cb.place_label(null_block)?;
		self.cb.iconst(&mut self.ctx.pool, if check_null { 1 } else { 0 })?;
		self.cb.place_label(end_block)
	}

	pub(crate) fn leave_compare(&mut self, id: ExprId) -> Result<()> {
		let ExprKind::Binary { op, left, right } = self.unit.expr(id).kind else {
			bail!("expected a comparison expression");
		};
		let line = self.unit.expr(id).line;

		let cond = match op {
			BinaryOp::Eq => IfCond::Eq,
			BinaryOp::Ne => IfCond::Ne,
			BinaryOp::Lt => IfCond::Lt,
			BinaryOp::Le => IfCond::Le,
			BinaryOp::Gt => IfCond::Gt,
			BinaryOp::Ge => IfCond::Ge,
			other => bail!("operator {other:?} is not a comparison"),
		};
		let icmp_cond = match cond {
			IfCond::Eq => IntCmpCond::Eq,
			IfCond::Ne => IntCmpCond::Ne,
			IfCond::Lt => IntCmpCond::Lt,
			IfCond::Le => IntCmpCond::Le,
			IfCond::Gt => IntCmpCond::Gt,
			IfCond::Ge => IntCmpCond::Ge,
		};

		let left_ty = self.unit.expr(left).ty.clone();
		let right_ty = self.unit.expr(right).ty.clone();

		if left_ty.is_double() {
			// NaN bias picked so that any NaN comparison comes out false
			let bias = if matches!(cond, IfCond::Lt | IfCond::Le) { CmpNanBias::G } else { CmpNanBias::L };
			self.cb.dcmp(bias)?;
			return self.emit_if_comparison(cond);
		}
		if left_ty.is_float() {
			let bias = if matches!(cond, IfCond::Lt | IfCond::Le) { CmpNanBias::G } else { CmpNanBias::L };
			self.cb.fcmp(bias)?;
			return self.emit_if_comparison(cond);
		}
		if left_ty.is_long() {
			if left_ty.is_unsigned() {
				self.emit_unsigned_helper("java/lang/Long", "compareUnsigned", "(JJ)I")?;
			} else {
				self.cb.lcmp()?;
			}
			return self.emit_if_comparison(cond);
		}
		if left_ty.is_integral() {
			return if left_ty.is_unsigned() {
				self.emit_unsigned_helper("java/lang/Integer", "compareUnsigned", "(II)I")?;
				self.emit_if_comparison(cond)
			} else {
				self.emit_icmp_comparison(icmp_cond)
			};
		}

		if left_ty.is_pointer() || right_ty.is_pointer() {
			let left_is_null = matches!(self.unit.expr(left).kind, ExprKind::Null);
			let right_is_null = matches!(self.unit.expr(right).kind, ExprKind::Null);

			if left_ty.is_void_pointer() && !left_is_null {
				bail!("{}: comparison on a void* value is not supported", self.at(line));
			}
			if right_ty.is_void_pointer() && !right_is_null {
				bail!("{}: comparison on a void* value is not supported", self.at(line));
			}

			if left_is_null && right_is_null {
				self.cb.pop()?;
				self.cb.pop()?;
				let value = i32::from(cond == IfCond::Eq);
				return self.cb.iconst(&mut self.ctx.pool, value);
			}
			if left_is_null {
				self.cb.swap()?;
				self.cb.pop()?;
				self.emit_ptr_get_base(&right_ty)?;
				return self.emit_if_ref_null_check(cond == IfCond::Eq);
			}
			if right_is_null {
				self.cb.pop()?;
				self.emit_ptr_get_base(&left_ty)?;
				return self.emit_if_ref_null_check(cond == IfCond::Eq);
			}

			if matches!(cond, IfCond::Eq | IfCond::Ne) {
				// pointer equality compares both fields: equal offsets and
				// equal bases
				let temp_right = self.allocate_temp_local_for(ValueCategory::Reference);
				let temp_left = self.allocate_temp_local_for(ValueCategory::Reference);

				self.cb.astore(temp_right)?;
				self.cb.astore(temp_left)?;

				self.cb.aload(temp_left)?;
				self.emit_ptr_get_offset(&left_ty)?;
				self.cb.aload(temp_right)?;
				self.emit_ptr_get_offset(&right_ty)?;

				let result_known = self.cb.create_label();
				let end = self.cb.create_label();

				self.cb.jump_if_icmp(IntCmpCond::Ne, result_known)?;

				self.cb.aload(temp_left)?;
				self.emit_ptr_get_base(&left_ty)?;
				self.cb.aload(temp_right)?;
				self.emit_ptr_get_base(&right_ty)?;

				let acond = if cond == IfCond::Eq { ACmpCond::Eq } else { ACmpCond::Ne };
				self.emit_acmp_comparison(acond)?;
				self.cb.jump(end)?;

				self.cb.place_label(result_known)?;
				let value = i32::from(cond != IfCond::Eq);
				self.cb.iconst(&mut self.ctx.pool, value)?;

				return self.cb.place_label(end);
			}

			// relational pointer comparison orders offsets only; pointers
			// into different bases are undefined, matching C
			let temp_right = self.allocate_temp_local_for(ValueCategory::Reference);
			self.cb.astore(temp_right)?;
			self.emit_ptr_get_offset(&left_ty)?;
			self.cb.aload(temp_right)?;
			self.emit_ptr_get_offset(&right_ty)?;
			return self.emit_icmp_comparison(icmp_cond);
		}

		bail!("{}: unsupported comparison operand type", self.at(line))
	}

	// -- logical operators and the ternary ---------------------------------

	pub(crate) fn leave_logical_not(&mut self, id: ExprId) -> Result<()> {
		let ExprKind::LogicalNot(operand) = self.unit.expr(id).kind else {
			bail!("expected a logical not");
		};
		let operand_ty = self.unit.expr(operand).ty.clone();

		let true_label = self.cb.create_label();
		let end_label = self.cb.create_label();

		self.emit_branch_if_false(&operand_ty, true_label)?;
		self.cb.iconst(&mut self.ctx.pool, 0)?;
		self.cb.jump(end_label)?;
		self.cb.place_label(true_label)?;
		self.cb.iconst(&mut self.ctx.pool, 1)?;
		self.cb.place_label(end_label)
	}

	pub(crate) fn leave_logical_and(&mut self, id: ExprId) -> Result<()> {
		let ExprKind::LogicalAnd { left, right } = self.unit.expr(id).kind else {
			bail!("expected a logical and");
		};

		let false_label = self.cb.create_label();
		let end_label = self.cb.create_label();

		self.emit_expr(left)?;
		let left_ty = self.unit.expr(left).ty.clone();
		self.emit_branch_if_false(&left_ty, false_label)?;

		self.emit_expr(right)?;
		let right_ty = self.unit.expr(right).ty.clone();
		self.emit_branch_if_false(&right_ty, false_label)?;

		self.cb.iconst(&mut self.ctx.pool, 1)?;
		self.cb.jump(end_label)?;
		self.cb.place_label(false_label)?;
		self.cb.iconst(&mut self.ctx.pool, 0)?;
		self.cb.place_label(end_label)
	}

	pub(crate) fn leave_logical_or(&mut self, id: ExprId) -> Result<()> {
		let ExprKind::LogicalOr { left, right } = self.unit.expr(id).kind else {
			bail!("expected a logical or");
		};

		let true_label = self.cb.create_label();
		let end_label = self.cb.create_label();

		self.emit_expr(left)?;
		let left_ty = self.unit.expr(left).ty.clone();
		self.emit_branch_if_true(&left_ty, true_label)?;

		self.emit_expr(right)?;
		let right_ty = self.unit.expr(right).ty.clone();
		self.emit_branch_if_true(&right_ty, true_label)?;

		self.cb.iconst(&mut self.ctx.pool, 0)?;
		self.cb.jump(end_label)?;
		self.cb.place_label(true_label)?;
		self.cb.iconst(&mut self.ctx.pool, 1)?;
		self.cb.place_label(end_label)
	}

	pub(crate) fn leave_conditional(&mut self, id: ExprId) -> Result<()> {
		let ExprKind::Conditional { condition, then_value, else_value } = self.unit.expr(id).kind else {
			bail!("expected a conditional expression");
		};

		let false_label = self.cb.create_label();
		let end_label = self.cb.create_label();

		self.emit_expr(condition)?;
		let cond_ty = self.unit.expr(condition).ty.clone();
		self.emit_branch_if_false(&cond_ty, false_label)?;

		self.emit_expr(then_value)?;
		self.cb.jump(end_label)?;

		self.cb.place_label(false_label)?;
		self.emit_expr(else_value)?;

		self.cb.place_label(end_label)
	}

	// -- casts and conversions ---------------------------------------------

	pub(crate) fn leave_conv(&mut self, id: ExprId) -> Result<()> {
		let ExprKind::Conv { kind, .. } = self.unit.expr(id).kind else {
			bail!("expected an implicit conversion");
		};

		match kind {
			// char/short already live as ints on the stack
			ConvKind::CharToInt | ConvKind::ShortToInt => Ok(()),
			ConvKind::IntToLong => self.cb.i2l(),
			ConvKind::IntToFloat => self.cb.i2f(),
			ConvKind::IntToDouble => self.cb.i2d(),
			ConvKind::LongToFloat => self.cb.l2f(),
			ConvKind::LongToDouble => self.cb.l2d(),
			ConvKind::FloatToDouble => self.cb.f2d(),
			ConvKind::UcharToInt => {
				self.cb.iconst(&mut self.ctx.pool, 255)?;
				self.cb.iand()
			},
			ConvKind::UshortToInt => {
				self.cb.iconst(&mut self.ctx.pool, 65535)?;
				self.cb.iand()
			},
			ConvKind::UintToUlong => {
				// i2l sign-extends, mask off the upper half
				self.cb.i2l()?;
				self.cb.lconst(&mut self.ctx.pool, 0xFFFF_FFFF)?;
				self.cb.land()
			},
			ConvKind::IntToChar => self.cb.i2b(),
			ConvKind::IntToShort => self.cb.i2s(),
			ConvKind::LongToInt => self.cb.l2i(),
			ConvKind::FloatToInt => self.cb.f2i(),
			ConvKind::FloatToLong => self.cb.f2l(),
			ConvKind::DoubleToInt => self.cb.d2i(),
			ConvKind::DoubleToLong => self.cb.d2l(),
			ConvKind::DoubleToFloat => self.cb.d2f(),
		}
	}

	/// Truncation after narrowing to `char`/`short`.
	fn emit_narrow_small(&mut self, target: &CType) -> Result<()> {
		if target.is_char() {
			self.cb.i2b()?;
		} else if target.is_short() {
			self.cb.i2s()?;
		}
		Ok(())
	}

	pub(crate) fn leave_cast(&mut self, id: ExprId) -> Result<()> {
		let ExprKind::Cast(operand) = self.unit.expr(id).kind else {
			bail!("expected a cast expression");
		};
		let target = self.unit.expr(id).ty.clone();
		let source = self.unit.expr(operand).ty.clone();

		// enum to int is a no-op, the enum already is its ordinal
		if source.is_enum() && target.is_int() {
			return Ok(());
		}

		// array-to-pointer cast decays to a pointer at element zero
		if source.is_array() && target.is_pointer() {
			self.cb.iconst(&mut self.ctx.pool, 0)?;
			return self.emit_ptr_create(&target);
		}

		if !source.is_numeric() || !target.is_numeric() || same_basic(&source, &target) {
			return Ok(());
		}

		if small_int(&source) && small_int(&target) {
			return self.emit_narrow_small(&target);
		}

		if source.is_long() {
			if small_int(&target) {
				self.cb.l2i()?;
				self.emit_narrow_small(&target)?;
			} else if target.is_float() {
				self.cb.l2f()?;
			} else if target.is_double() {
				self.cb.l2d()?;
			}
		} else if target.is_long() {
			if small_int(&source) {
				if source.is_unsigned() {
					self.cb.i2l()?;
					self.cb.lconst(&mut self.ctx.pool, 0xFFFF_FFFF)?;
					self.cb.land()?;
				} else {
					self.cb.i2l()?;
				}
			} else if source.is_float() {
				self.cb.f2l()?;
			} else if source.is_double() {
				self.cb.d2l()?;
			}
		} else if source.is_float() {
			if small_int(&target) {
				self.cb.f2i()?;
				self.emit_narrow_small(&target)?;
			} else if target.is_double() {
				self.cb.f2d()?;
			}
		} else if target.is_float() {
			if small_int(&source) {
				self.cb.i2f()?;
			} else if source.is_double() {
				self.cb.d2f()?;
			}
		} else if source.is_double() {
			if small_int(&target) {
				self.cb.d2i()?;
				self.emit_narrow_small(&target)?;
			}
		} else if target.is_double() && small_int(&source) {
			self.cb.i2d()?;
		}

		Ok(())
	}

	/// Array-to-pointer decay: a pointer to element zero.
	pub(crate) fn leave_array_to_pointer(&mut self, id: ExprId) -> Result<()> {
		let target = self.unit.expr(id).ty.clone();
		if !target.is_pointer() {
			let line = self.unit.expr(id).line;
			bail!("{}: array decays to a non-pointer type", self.at(line));
		}
		self.cb.iconst(&mut self.ctx.pool, 0)?;
		self.emit_ptr_create(&target)
	}
}
