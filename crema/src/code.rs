//! The code builder: an operand-stack and local-slot machine that appends
//! instructions, tracks the verifier frame, owns labels and resolves jumps.
//!
//! Emission is gated by the `alive` flag: once control has been transferred
//! unconditionally, every instruction primitive becomes a no-op until a label
//! with a saved frame is placed. Callers may keep walking their input in dead
//! regions to create and place labels without producing bytes.

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, trace};
use crate::class_constants::opcode;
use crate::descriptor;
use crate::frame::{Frame, VerificationType};
use crate::pool::ConstantPool;
use crate::stackmap;

/// A jump target. Creation and placement are separate steps: a label may be
/// jumped to before it is placed, and is placed at most once.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Label {
	pub(crate) id: u16,
}

/// Placement hint used when the `StackMapTable` is generated.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LabelKind {
	Plain,
	/// Target of a backward jump; its frame is pinned at placement.
	LoopHeader,
	/// Forward-jump-only target (a `goto` label that has not been placed yet).
	JumpOnly,
}

#[derive(Debug)]
pub(crate) struct LabelRecord {
	pub(crate) pc: u16,
	pub(crate) placed: bool,
	pub(crate) frame: Frame,
	pub(crate) frame_saved: bool,
	/// Set when some jump or switch references this label. Only referenced
	/// labels get a `StackMapTable` entry.
	pub(crate) referenced: bool,
	pub(crate) kind: LabelKind,
}

/// An unresolved branch operand, patched by [`CodeBuilder::resolve_jumps`].
#[derive(Debug)]
struct PendingJump {
	/// Position of the offset bytes inside the code buffer.
	patch_pos: usize,
	/// The pc of the branch opcode; offsets are relative to it.
	opcode_pos: u16,
	label: Label,
}

/// The condition of an `if<cond>` instruction (top of stack against zero).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IfCond {
	Eq, Ne, Lt, Ge, Gt, Le,
}

impl IfCond {
	fn opcode(self) -> u8 {
		match self {
			IfCond::Eq => opcode::IFEQ,
			IfCond::Ne => opcode::IFNE,
			IfCond::Lt => opcode::IFLT,
			IfCond::Ge => opcode::IFGE,
			IfCond::Gt => opcode::IFGT,
			IfCond::Le => opcode::IFLE,
		}
	}
}

/// The condition of an `if_icmp<cond>` instruction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IntCmpCond {
	Eq, Ne, Lt, Ge, Gt, Le,
}

impl IntCmpCond {
	fn opcode(self) -> u8 {
		match self {
			IntCmpCond::Eq => opcode::IF_ICMPEQ,
			IntCmpCond::Ne => opcode::IF_ICMPNE,
			IntCmpCond::Lt => opcode::IF_ICMPLT,
			IntCmpCond::Ge => opcode::IF_ICMPGE,
			IntCmpCond::Gt => opcode::IF_ICMPGT,
			IntCmpCond::Le => opcode::IF_ICMPLE,
		}
	}
}

/// The condition of an `if_acmp<cond>` instruction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ACmpCond {
	Eq, Ne,
}

/// NaN bias of `fcmp<op>`/`dcmp<op>`: which value the comparison produces
/// when either operand is NaN.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CmpNanBias {
	L,
	G,
}

/// An active loop on the control stack.
#[derive(Debug, Clone)]
pub struct LoopContext {
	pub cond_label: Label,
	pub body_label: Label,
	pub post_label: Option<Label>,
	pub end_label: Label,
	/// Where `continue` goes: the post label if the loop has one, the
	/// condition label otherwise.
	pub continue_label: Label,
	pub is_do_while: bool,
	pub has_post: bool,
}

/// An active switch on the control stack.
#[derive(Debug, Clone)]
pub struct SwitchContext {
	pub dispatch_label: Label,
	pub end_label: Label,
	pub default_label: Option<Label>,
	pub cases: Vec<(i32, Label)>,
	/// Frame at switch entry, seeded onto each case label so that placing a
	/// case revives emission after the dispatch jump.
	pub entry_frame: Option<Frame>,
	/// Local slot holding the discriminant value.
	pub expr_local: u16,
}

#[derive(Debug)]
enum ControlEntry {
	Loop(LoopContext),
	Switch(SwitchContext),
}

/// The per-method bytecode builder.
pub struct CodeBuilder {
	method_name: String,
	code: Vec<u8>,

	frame: Frame,
	initial_frame: Frame,
	alive: bool,

	max_stack: u16,
	max_locals: u16,
	next_local: u16,
	block_stack: Vec<u16>,

	labels: Vec<LabelRecord>,
	pending_jumps: Vec<PendingJump>,
	control_stack: Vec<ControlEntry>,

	line_numbers: Vec<(u16, u16)>,
}

/// Everything the serializer needs about one emitted method body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodCode {
	pub code: Vec<u8>,
	pub max_stack: u16,
	pub max_locals: u16,
	/// (start pc, source line) pairs.
	pub line_numbers: Vec<(u16, u16)>,
	/// (pc, frame) pairs for every branch target, ascending in pc. The
	/// initial frame of the method is not included.
	pub stack_map_frames: Vec<(u16, Frame)>,
}

impl CodeBuilder {
	pub fn new(method_name: &str) -> CodeBuilder {
		CodeBuilder {
			method_name: method_name.to_owned(),
			code: Vec::new(),
			frame: Frame::new(),
			initial_frame: Frame::new(),
			alive: true,
			max_stack: 0,
			max_locals: 0,
			next_local: 0,
			block_stack: Vec::new(),
			labels: Vec::new(),
			pending_jumps: Vec::new(),
			control_stack: Vec::new(),
			line_numbers: Vec::new(),
		}
	}

	pub fn method_name(&self) -> &str {
		&self.method_name
	}

	pub fn pc(&self) -> u16 {
		self.code.len() as u16
	}

	pub fn is_alive(&self) -> bool {
		self.alive
	}

	pub fn mark_alive(&mut self) {
		self.alive = true;
	}

	pub fn mark_dead(&mut self) {
		self.alive = false;
	}

	pub fn stack_count(&self) -> usize {
		self.frame.stack_count()
	}

	pub fn snapshot_frame(&self) -> Frame {
		self.frame.clone()
	}

	/// The top-of-stack verification type, if any.
	pub fn stack_top(&self) -> Option<&VerificationType> {
		self.frame.stack.last()
	}

	// -- internal helpers --------------------------------------------------

	fn emit(&mut self, byte: u8) {
		self.code.push(byte);
	}

	fn emit_u16(&mut self, value: u16) {
		self.code.extend_from_slice(&value.to_be_bytes());
	}

	fn emit_i16(&mut self, value: i16) {
		self.code.extend_from_slice(&value.to_be_bytes());
	}

	fn emit_i32(&mut self, value: i32) {
		self.code.extend_from_slice(&value.to_be_bytes());
	}

	fn push(&mut self, t: VerificationType) {
		self.frame.push(t);
		self.max_stack = self.max_stack.max(self.frame.stack_slots());
	}

	fn pop_any(&mut self) -> Result<VerificationType> {
		self.frame.pop()
			.with_context(|| anyhow!("in method {:?} at pc {}", self.method_name, self.pc()))
	}

	/// Pops entries totalling exactly `slots` stack slots, returned in
	/// bottom-to-top order. Splitting a wide value is an error.
	fn take_slots(&mut self, slots: u16) -> Result<Vec<VerificationType>> {
		let mut taken = Vec::new();
		let mut have = 0;
		while have < slots {
			let t = self.pop_any()?;
			have += t.slot_size();
			taken.push(t);
		}
		if have != slots {
			bail!("stack manipulation in {:?} would split a wide value in half", self.method_name);
		}
		taken.reverse();
		Ok(taken)
	}

	// -- locals ------------------------------------------------------------

	/// Installs a parameter into slot `slot` of both the current and the
	/// initial frame. The initial frame must match what the verifier derives
	/// from the method descriptor, so only real parameters go through here.
	pub fn set_param(&mut self, slot: u16, t: VerificationType) {
		let end = slot + t.slot_size();
		self.initial_frame.set_local(slot, t.clone());
		self.frame.set_local(slot, t);
		self.next_local = self.next_local.max(end);
		self.max_locals = self.max_locals.max(end);
	}

	/// Allocates a fresh local slot for a value of the given type. Slots
	/// allocated inside a [`CodeBuilder::begin_block`] region are reused
	/// after the matching [`CodeBuilder::end_block`].
	pub fn allocate_local(&mut self, t: VerificationType) -> u16 {
		let slot = self.next_local;
		self.next_local += t.slot_size();
		self.max_locals = self.max_locals.max(self.next_local);
		self.frame.set_local(slot, t);
		slot
	}

	pub fn begin_block(&mut self) {
		self.block_stack.push(self.next_local);
	}

	pub fn end_block(&mut self) -> Result<()> {
		let saved = self.block_stack.pop()
			.ok_or_else(|| anyhow!("block underflow in method {:?}", self.method_name))?;
		// demote the released slots so later frames don't claim stale types
		for slot in saved..self.next_local {
			self.frame.set_local(slot, VerificationType::Top);
		}
		self.next_local = saved;
		Ok(())
	}

	// -- labels and jumps --------------------------------------------------

	pub fn create_label(&mut self) -> Label {
		let id = self.labels.len() as u16;
		self.labels.push(LabelRecord {
			pc: 0,
			placed: false,
			frame: Frame::new(),
			frame_saved: false,
			referenced: false,
			kind: LabelKind::Plain,
		});
		Label { id }
	}

	fn label(&self, label: Label) -> &LabelRecord {
		&self.labels[label.id as usize]
	}

	fn label_mut(&mut self, label: Label) -> &mut LabelRecord {
		&mut self.labels[label.id as usize]
	}

	pub fn label_placed(&self, label: Label) -> bool {
		self.label(label).placed
	}

	pub fn label_frame_saved(&self, label: Label) -> bool {
		self.label(label).frame_saved
	}

	pub fn mark_loop_header(&mut self, label: Label) {
		self.label_mut(label).kind = LabelKind::LoopHeader;
	}

	pub fn mark_jump_only(&mut self, label: Label) {
		let record = self.label_mut(label);
		if record.kind == LabelKind::Plain {
			record.kind = LabelKind::JumpOnly;
		}
	}

	/// Installs `frame` as the label's incoming frame before it is placed.
	/// Used by switch lowering, where case labels must revive emission with
	/// the frame captured at switch entry.
	pub fn seed_label_frame(&mut self, label: Label, frame: Frame) {
		let record = self.label_mut(label);
		record.frame = frame;
		record.frame_saved = true;
	}

	/// Places `label` at the current pc.
	///
	/// If a jump already saved a frame onto the label, that frame is merged
	/// with (or, in dead code, replaces) the current frame and emission is
	/// revived. Each label may be placed at most once.
	pub fn place_label(&mut self, label: Label) -> Result<()> {
		let pc = self.pc();
		if self.label(label).placed {
			bail!("label {} placed twice in method {:?}", label.id, self.method_name);
		}
		let alive = self.alive;
		let frame_saved = self.label(label).frame_saved;
		{
			let record = self.label_mut(label);
			record.placed = true;
			record.pc = pc;
		}

		if frame_saved {
			let saved = self.label(label).frame.clone();
			if alive {
				self.frame.merge(&saved)
					.with_context(|| anyhow!("frame merge conflict at label {} (pc {}) in method {:?}", label.id, pc, self.method_name))?;
				let merged = self.frame.clone();
				self.label_mut(label).frame = merged;
			} else {
				self.frame = saved;
				self.alive = true;
			}
		} else if alive {
			let frame = self.frame.clone();
			let record = self.label_mut(label);
			record.frame = frame;
			record.frame_saved = true;
		}
		trace!("placed label {} at pc {} in {:?}", label.id, pc, self.method_name);
		Ok(())
	}

	fn save_frame_to_label(&mut self, label: Label) -> Result<()> {
		let current = self.frame.clone();
		self.label_mut(label).referenced = true;
		if self.label(label).frame_saved {
			let mut saved = self.label(label).frame.clone();
			saved.merge(&current)
				.with_context(|| anyhow!("frame merge conflict on jump to label {} in method {:?}", label.id, self.method_name))?;
			self.label_mut(label).frame = saved;
		} else {
			let record = self.label_mut(label);
			record.frame = current;
			record.frame_saved = true;
		}
		Ok(())
	}

	fn opposite_branch(opcode_: u8) -> u8 {
		match opcode_ {
			opcode::IFEQ..=opcode::IFLE => ((opcode_ - opcode::IFEQ) ^ 1) + opcode::IFEQ,
			opcode::IF_ICMPEQ..=opcode::IF_ICMPLE => ((opcode_ - opcode::IF_ICMPEQ) ^ 1) + opcode::IF_ICMPEQ,
			opcode::IF_ACMPEQ => opcode::IF_ACMPNE,
			opcode::IF_ACMPNE => opcode::IF_ACMPEQ,
			opcode::IFNULL => opcode::IFNONNULL,
			opcode::IFNONNULL => opcode::IFNULL,
			x => x,
		}
	}

	/// Emits a conditional branch to `label`. Operands must already be popped
	/// from the frame by the caller.
	fn branch(&mut self, opcode_: u8, label: Label) -> Result<()> {
		let record = self.label(label);
		if record.placed {
			// backward branch, the offset is known
			let target = record.pc;
			let offset = target as i32 - self.pc() as i32;
			if let Ok(offset) = i16::try_from(offset) {
				self.emit(opcode_);
				self.emit_i16(offset);
			} else {
				// no wide form of if<cond> exists: branch over a goto_w with
				// the opposite condition
				self.emit(Self::opposite_branch(opcode_));
				// +1 for the opcode, +2 for this branch, +1 for the GOTO_W
				// opcode, +4 for that branch
				self.emit_i16(1 + 2 + 1 + 4);
				let offset = target as i32 - self.pc() as i32;
				self.emit(opcode::GOTO_W);
				self.emit_i32(offset);
			}
		} else {
			let opcode_pos = self.pc();
			self.emit(opcode_);
			let patch_pos = self.code.len();
			self.emit_i16(i16::MAX);
			self.pending_jumps.push(PendingJump { patch_pos, opcode_pos, label });
		}
		self.save_frame_to_label(label)
	}

	/// Emits an unconditional jump to `label` and marks the code dead.
	pub fn jump(&mut self, label: Label) -> Result<()> {
		if !self.alive { return Ok(()); }

		let record = self.label(label);
		if record.placed {
			let target = record.pc;
			let offset = target as i32 - self.pc() as i32;
			if let Ok(offset) = i16::try_from(offset) {
				self.emit(opcode::GOTO);
				self.emit_i16(offset);
			} else {
				self.emit(opcode::GOTO_W);
				self.emit_i32(offset);
			}
		} else {
			let opcode_pos = self.pc();
			self.emit(opcode::GOTO);
			let patch_pos = self.code.len();
			self.emit_i16(i16::MAX);
			self.pending_jumps.push(PendingJump { patch_pos, opcode_pos, label });
		}
		self.save_frame_to_label(label)?;
		self.alive = false;
		Ok(())
	}

	/// `ifne`: jumps if the int on top of the stack is non-zero.
	pub fn jump_if(&mut self, label: Label) -> Result<()> {
		self.jump_if_op(IfCond::Ne, label)
	}

	/// `ifeq`: jumps if the int on top of the stack is zero.
	pub fn jump_if_not(&mut self, label: Label) -> Result<()> {
		self.jump_if_op(IfCond::Eq, label)
	}

	pub fn jump_if_op(&mut self, cond: IfCond, label: Label) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.pop_any()?;
		self.branch(cond.opcode(), label)
	}

	pub fn jump_if_icmp(&mut self, cond: IntCmpCond, label: Label) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.pop_any()?;
		self.pop_any()?;
		self.branch(cond.opcode(), label)
	}

	pub fn jump_if_acmp(&mut self, cond: ACmpCond, label: Label) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.pop_any()?;
		self.pop_any()?;
		let opcode_ = match cond {
			ACmpCond::Eq => opcode::IF_ACMPEQ,
			ACmpCond::Ne => opcode::IF_ACMPNE,
		};
		self.branch(opcode_, label)
	}

	pub fn jump_if_null(&mut self, label: Label) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.pop_any()?;
		self.branch(opcode::IFNULL, label)
	}

	pub fn jump_if_not_null(&mut self, label: Label) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.pop_any()?;
		self.branch(opcode::IFNONNULL, label)
	}

	/// Patches the offsets of all forward jumps. Every jumped-to label must
	/// have been placed by now.
	pub fn resolve_jumps(&mut self) -> Result<()> {
		debug!("resolving {} pending jumps in {:?}", self.pending_jumps.len(), self.method_name);
		for jump in std::mem::take(&mut self.pending_jumps) {
			let record = &self.labels[jump.label.id as usize];
			if !record.placed {
				bail!("jump to unplaced label {} in method {:?}", jump.label.id, self.method_name);
			}
			let offset = record.pc as i32 - jump.opcode_pos as i32;
			let offset = i16::try_from(offset)
				.map_err(|_| anyhow!("forward branch offset {offset} in method {:?} does not fit into an i16", self.method_name))?;
			self.code[jump.patch_pos..jump.patch_pos + 2].copy_from_slice(&offset.to_be_bytes());
		}
		Ok(())
	}

	// -- control stack -----------------------------------------------------

	pub fn push_loop(&mut self, ctx: LoopContext) {
		self.control_stack.push(ControlEntry::Loop(ctx));
	}

	pub fn pop_loop(&mut self) -> Result<LoopContext> {
		match self.control_stack.pop() {
			Some(ControlEntry::Loop(ctx)) => Ok(ctx),
			other => bail!("expected a loop on the control stack in {:?}, got {other:?}", self.method_name),
		}
	}

	pub fn current_loop(&self) -> Option<&LoopContext> {
		self.control_stack.iter().rev().find_map(|entry| match entry {
			ControlEntry::Loop(ctx) => Some(ctx),
			ControlEntry::Switch(_) => None,
		})
	}

	pub fn current_loop_mut(&mut self) -> Option<&mut LoopContext> {
		self.control_stack.iter_mut().rev().find_map(|entry| match entry {
			ControlEntry::Loop(ctx) => Some(ctx),
			ControlEntry::Switch(_) => None,
		})
	}

	pub fn push_switch(&mut self, ctx: SwitchContext) {
		self.control_stack.push(ControlEntry::Switch(ctx));
	}

	pub fn pop_switch(&mut self) -> Result<SwitchContext> {
		match self.control_stack.pop() {
			Some(ControlEntry::Switch(ctx)) => Ok(ctx),
			other => bail!("expected a switch on the control stack in {:?}, got {other:?}", self.method_name),
		}
	}

	pub fn current_switch(&self) -> Option<&SwitchContext> {
		self.control_stack.iter().rev().find_map(|entry| match entry {
			ControlEntry::Switch(ctx) => Some(ctx),
			ControlEntry::Loop(_) => None,
		})
	}

	pub fn current_switch_mut(&mut self) -> Option<&mut SwitchContext> {
		self.control_stack.iter_mut().rev().find_map(|entry| match entry {
			ControlEntry::Switch(ctx) => Some(ctx),
			ControlEntry::Loop(_) => None,
		})
	}

	pub fn switch_add_case(&mut self, value: i32, label: Label) -> Result<()> {
		let name = self.method_name.clone();
		let ctx = self.current_switch_mut()
			.ok_or_else(|| anyhow!("case outside of any switch in method {name:?}"))?;
		if ctx.cases.iter().any(|&(v, _)| v == value) {
			bail!("duplicate case value {value} in method {name:?}");
		}
		ctx.cases.push((value, label));
		Ok(())
	}

	/// Jumps to the end of the nearest enclosing loop or switch.
	pub fn emit_break(&mut self) -> Result<()> {
		let target = self.control_stack.iter().rev().find_map(|entry| match entry {
			ControlEntry::Loop(ctx) => Some(ctx.end_label),
			ControlEntry::Switch(ctx) => Some(ctx.end_label),
		}).ok_or_else(|| anyhow!("break outside of any loop or switch in method {:?}", self.method_name))?;
		self.jump(target)
	}

	/// Jumps to the continue target of the nearest enclosing loop.
	pub fn emit_continue(&mut self) -> Result<()> {
		let target = self.current_loop()
			.map(|ctx| ctx.continue_label)
			.ok_or_else(|| anyhow!("continue outside of any loop in method {:?}", self.method_name))?;
		self.jump(target)
	}

	// -- switch dispatch ---------------------------------------------------

	/// Chooses between `tableswitch` and `lookupswitch` by the space/time
	/// trade-off javac uses.
	pub fn should_use_tableswitch(nlabels: i32, low: i32, high: i32) -> bool {
		let table_space_cost = 4 + (high as i64 - low as i64 + 1);
		let table_time_cost = 3;
		let lookup_space_cost = 3 + 2 * nlabels as i64;
		let lookup_time_cost = nlabels as i64;
		nlabels > 0
			&& table_space_cost + 3 * table_time_cost <= lookup_space_cost + 3 * lookup_time_cost
	}

	fn switch_pad(&mut self) {
		// the operands of tableswitch/lookupswitch start at a 4-byte boundary
		while self.code.len() % 4 != 0 {
			self.emit(0);
		}
	}

	fn switch_target_offset(&self, label: Label, opcode_pos: u16) -> Result<i32> {
		let record = self.label(label);
		if !record.placed {
			bail!("switch target label {} is not placed in method {:?}", label.id, self.method_name);
		}
		Ok(record.pc as i32 - opcode_pos as i32)
	}

	/// Emits a `tableswitch` over `low..=high`. All targets, including the
	/// default, must already be placed.
	pub fn tableswitch(&mut self, default: Label, low: i32, high: i32, table: &[Label]) -> Result<()> {
		if !self.alive { return Ok(()); }
		if table.len() as i64 != (high as i64 - low as i64 + 1) {
			bail!("tableswitch table has {} entries for range {low}..={high}", table.len());
		}
		self.pop_any()?;

		let opcode_pos = self.pc();
		self.emit(opcode::TABLESWITCH);
		self.switch_pad();
		let offset = self.switch_target_offset(default, opcode_pos)?;
		self.emit_i32(offset);
		self.emit_i32(low);
		self.emit_i32(high);
		for &label in table {
			let offset = self.switch_target_offset(label, opcode_pos)?;
			self.emit_i32(offset);
		}
		self.label_mut(default).referenced = true;
		for &label in table {
			self.label_mut(label).referenced = true;
		}
		self.alive = false;
		Ok(())
	}

	/// Emits a `lookupswitch`. The pairs must be sorted ascending by key and
	/// all targets, including the default, must already be placed.
	pub fn lookupswitch(&mut self, default: Label, pairs: &[(i32, Label)]) -> Result<()> {
		if !self.alive { return Ok(()); }
		if pairs.windows(2).any(|w| w[0].0 >= w[1].0) {
			bail!("lookupswitch pairs are not sorted by key in method {:?}", self.method_name);
		}
		self.pop_any()?;

		let opcode_pos = self.pc();
		self.emit(opcode::LOOKUPSWITCH);
		self.switch_pad();
		let offset = self.switch_target_offset(default, opcode_pos)?;
		self.emit_i32(offset);
		self.emit_i32(pairs.len() as i32);
		for &(key, label) in pairs {
			self.emit_i32(key);
			let offset = self.switch_target_offset(label, opcode_pos)?;
			self.emit_i32(offset);
		}
		self.label_mut(default).referenced = true;
		for &(_, label) in pairs {
			self.label_mut(label).referenced = true;
		}
		self.alive = false;
		Ok(())
	}

	// -- constants ---------------------------------------------------------

	pub fn nop(&mut self) {
		if !self.alive { return; }
		self.emit(opcode::NOP);
	}

	pub fn aconst_null(&mut self) {
		if !self.alive { return; }
		self.emit(opcode::ACONST_NULL);
		self.push(VerificationType::Null);
	}

	pub fn iconst(&mut self, pool: &mut ConstantPool, value: i32) -> Result<()> {
		if !self.alive { return Ok(()); }
		match value {
			-1..=5 => self.emit((opcode::ICONST_0 as i32 + value) as u8),
			-128..=127 => {
				self.emit(opcode::BIPUSH);
				self.emit(value as i8 as u8);
			},
			-32768..=32767 => {
				self.emit(opcode::SIPUSH);
				self.emit_i16(value as i16);
			},
			_ => {
				let index = pool.put_integer(value)?;
				self.emit_ldc(index);
			},
		}
		self.push(VerificationType::Integer);
		Ok(())
	}

	pub fn lconst(&mut self, pool: &mut ConstantPool, value: i64) -> Result<()> {
		if !self.alive { return Ok(()); }
		match value {
			0 => self.emit(opcode::LCONST_0),
			1 => self.emit(opcode::LCONST_1),
			_ => {
				let index = pool.put_long(value)?;
				self.emit(opcode::LDC2_W);
				self.emit_u16(index);
			},
		}
		self.push(VerificationType::Long);
		Ok(())
	}

	pub fn fconst(&mut self, pool: &mut ConstantPool, value: f32) -> Result<()> {
		if !self.alive { return Ok(()); }
		if value.to_bits() == 0.0f32.to_bits() {
			self.emit(opcode::FCONST_0);
		} else if value.to_bits() == 1.0f32.to_bits() {
			self.emit(opcode::FCONST_1);
		} else if value.to_bits() == 2.0f32.to_bits() {
			self.emit(opcode::FCONST_2);
		} else {
			let index = pool.put_float(value)?;
			self.emit_ldc(index);
		}
		self.push(VerificationType::Float);
		Ok(())
	}

	pub fn dconst(&mut self, pool: &mut ConstantPool, value: f64) -> Result<()> {
		if !self.alive { return Ok(()); }
		if value.to_bits() == 0.0f64.to_bits() {
			self.emit(opcode::DCONST_0);
		} else if value.to_bits() == 1.0f64.to_bits() {
			self.emit(opcode::DCONST_1);
		} else {
			let index = pool.put_double(value)?;
			self.emit(opcode::LDC2_W);
			self.emit_u16(index);
		}
		self.push(VerificationType::Double);
		Ok(())
	}

	fn emit_ldc(&mut self, index: u16) {
		if let Ok(index) = u8::try_from(index) {
			self.emit(opcode::LDC);
			self.emit(index);
		} else {
			self.emit(opcode::LDC_W);
			self.emit_u16(index);
		}
	}

	/// `ldc`/`ldc_w` of a loadable one-slot constant; `t` is what it loads.
	pub fn ldc(&mut self, index: u16, t: VerificationType) {
		if !self.alive { return; }
		self.emit_ldc(index);
		self.push(t);
	}

	// -- local loads and stores --------------------------------------------

	fn load_store_inner(&mut self, shorthand: u8, long_form: u8, index: u16) {
		match index {
			0..=3 => self.emit(shorthand + index as u8),
			4..=255 => {
				self.emit(long_form);
				self.emit(index as u8);
			},
			_ => {
				self.emit(opcode::WIDE);
				self.emit(long_form);
				self.emit_u16(index);
			},
		}
	}

	fn load(&mut self, shorthand: u8, long_form: u8, index: u16, expect_wide: bool) -> Result<()> {
		if !self.alive { return Ok(()); }
		let t = self.frame.get_local(index)
			.with_context(|| anyhow!("load from unallocated local {index} in method {:?}", self.method_name))?
			.clone();
		if t.is_wide() != expect_wide || t == VerificationType::Top {
			bail!("load of local {index} in method {:?} does not match its type {t:?}", self.method_name);
		}
		self.load_store_inner(shorthand, long_form, index);
		self.push(t);
		Ok(())
	}

	pub fn iload(&mut self, index: u16) -> Result<()> {
		self.load(opcode::ILOAD_0, opcode::ILOAD, index, false)
	}
	pub fn lload(&mut self, index: u16) -> Result<()> {
		self.load(opcode::LLOAD_0, opcode::LLOAD, index, true)
	}
	pub fn fload(&mut self, index: u16) -> Result<()> {
		self.load(opcode::FLOAD_0, opcode::FLOAD, index, false)
	}
	pub fn dload(&mut self, index: u16) -> Result<()> {
		self.load(opcode::DLOAD_0, opcode::DLOAD, index, true)
	}
	pub fn aload(&mut self, index: u16) -> Result<()> {
		self.load(opcode::ALOAD_0, opcode::ALOAD, index, false)
	}

	fn store(&mut self, shorthand: u8, long_form: u8, index: u16) -> Result<VerificationType> {
		let t = self.pop_any()?;
		self.load_store_inner(shorthand, long_form, index);
		self.frame.set_local(index, t.clone());
		self.max_locals = self.max_locals.max(index + t.slot_size());
		Ok(t)
	}

	pub fn istore(&mut self, index: u16) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.store(opcode::ISTORE_0, opcode::ISTORE, index)?;
		Ok(())
	}
	pub fn lstore(&mut self, index: u16) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.store(opcode::LSTORE_0, opcode::LSTORE, index)?;
		Ok(())
	}
	pub fn fstore(&mut self, index: u16) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.store(opcode::FSTORE_0, opcode::FSTORE, index)?;
		Ok(())
	}
	pub fn dstore(&mut self, index: u16) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.store(opcode::DSTORE_0, opcode::DSTORE, index)?;
		Ok(())
	}
	pub fn astore(&mut self, index: u16) -> Result<()> {
		if !self.alive { return Ok(()); }
		let t = self.store(opcode::ASTORE_0, opcode::ASTORE, index)?;
		if !t.is_reference() {
			bail!("astore of non-reference {t:?} in method {:?}", self.method_name);
		}
		Ok(())
	}

	pub fn iinc(&mut self, index: u16, constant: i16) {
		if !self.alive { return; }
		if let (Ok(index), Ok(constant)) = (u8::try_from(index), i8::try_from(constant)) {
			self.emit(opcode::IINC);
			self.emit(index);
			self.emit(constant as u8);
		} else {
			self.emit(opcode::WIDE);
			self.emit(opcode::IINC);
			self.emit_u16(index);
			self.emit_i16(constant);
		}
	}

	// -- array loads and stores --------------------------------------------

	fn array_load(&mut self, opcode_: u8, result: VerificationType) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.pop_any()?; // index
		self.pop_any()?; // arrayref
		self.emit(opcode_);
		self.push(result);
		Ok(())
	}

	pub fn iaload(&mut self) -> Result<()> { self.array_load(opcode::IALOAD, VerificationType::Integer) }
	pub fn laload(&mut self) -> Result<()> { self.array_load(opcode::LALOAD, VerificationType::Long) }
	pub fn faload(&mut self) -> Result<()> { self.array_load(opcode::FALOAD, VerificationType::Float) }
	pub fn daload(&mut self) -> Result<()> { self.array_load(opcode::DALOAD, VerificationType::Double) }
	pub fn baload(&mut self) -> Result<()> { self.array_load(opcode::BALOAD, VerificationType::Integer) }
	pub fn caload(&mut self) -> Result<()> { self.array_load(opcode::CALOAD, VerificationType::Integer) }
	pub fn saload(&mut self) -> Result<()> { self.array_load(opcode::SALOAD, VerificationType::Integer) }

	/// `aaload`: the element type is derived from the array's descriptor when
	/// the frame knows it, `java/lang/Object` otherwise.
	pub fn aaload(&mut self) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.pop_any()?; // index
		let array = self.pop_any()?;
		let element = match &array {
			VerificationType::Object(name) if name.starts_with('[') => {
				match descriptor::parse_field_descriptor(&name[1..]) {
					Ok(t) => VerificationType::of_descriptor_type(&t),
					Err(_) => VerificationType::object("java/lang/Object"),
				}
			},
			_ => VerificationType::object("java/lang/Object"),
		};
		self.emit(opcode::AALOAD);
		self.push(element);
		Ok(())
	}

	fn array_store(&mut self, opcode_: u8) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.pop_any()?; // value
		self.pop_any()?; // index
		self.pop_any()?; // arrayref
		self.emit(opcode_);
		Ok(())
	}

	pub fn iastore(&mut self) -> Result<()> { self.array_store(opcode::IASTORE) }
	pub fn lastore(&mut self) -> Result<()> { self.array_store(opcode::LASTORE) }
	pub fn fastore(&mut self) -> Result<()> { self.array_store(opcode::FASTORE) }
	pub fn dastore(&mut self) -> Result<()> { self.array_store(opcode::DASTORE) }
	pub fn aastore(&mut self) -> Result<()> { self.array_store(opcode::AASTORE) }
	pub fn bastore(&mut self) -> Result<()> { self.array_store(opcode::BASTORE) }
	pub fn castore(&mut self) -> Result<()> { self.array_store(opcode::CASTORE) }
	pub fn sastore(&mut self) -> Result<()> { self.array_store(opcode::SASTORE) }

	// -- arithmetic, logic, conversions ------------------------------------

	fn binary(&mut self, opcode_: u8, result: VerificationType) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.pop_any()?;
		self.pop_any()?;
		self.emit(opcode_);
		self.push(result);
		Ok(())
	}

	fn unary(&mut self, opcode_: u8, result: VerificationType) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.pop_any()?;
		self.emit(opcode_);
		self.push(result);
		Ok(())
	}

	pub fn iadd(&mut self) -> Result<()> { self.binary(opcode::IADD, VerificationType::Integer) }
	pub fn ladd(&mut self) -> Result<()> { self.binary(opcode::LADD, VerificationType::Long) }
	pub fn fadd(&mut self) -> Result<()> { self.binary(opcode::FADD, VerificationType::Float) }
	pub fn dadd(&mut self) -> Result<()> { self.binary(opcode::DADD, VerificationType::Double) }
	pub fn isub(&mut self) -> Result<()> { self.binary(opcode::ISUB, VerificationType::Integer) }
	pub fn lsub(&mut self) -> Result<()> { self.binary(opcode::LSUB, VerificationType::Long) }
	pub fn fsub(&mut self) -> Result<()> { self.binary(opcode::FSUB, VerificationType::Float) }
	pub fn dsub(&mut self) -> Result<()> { self.binary(opcode::DSUB, VerificationType::Double) }
	pub fn imul(&mut self) -> Result<()> { self.binary(opcode::IMUL, VerificationType::Integer) }
	pub fn lmul(&mut self) -> Result<()> { self.binary(opcode::LMUL, VerificationType::Long) }
	pub fn fmul(&mut self) -> Result<()> { self.binary(opcode::FMUL, VerificationType::Float) }
	pub fn dmul(&mut self) -> Result<()> { self.binary(opcode::DMUL, VerificationType::Double) }
	pub fn idiv(&mut self) -> Result<()> { self.binary(opcode::IDIV, VerificationType::Integer) }
	pub fn ldiv(&mut self) -> Result<()> { self.binary(opcode::LDIV, VerificationType::Long) }
	pub fn fdiv(&mut self) -> Result<()> { self.binary(opcode::FDIV, VerificationType::Float) }
	pub fn ddiv(&mut self) -> Result<()> { self.binary(opcode::DDIV, VerificationType::Double) }
	pub fn irem(&mut self) -> Result<()> { self.binary(opcode::IREM, VerificationType::Integer) }
	pub fn lrem(&mut self) -> Result<()> { self.binary(opcode::LREM, VerificationType::Long) }
	pub fn frem(&mut self) -> Result<()> { self.binary(opcode::FREM, VerificationType::Float) }
	pub fn drem(&mut self) -> Result<()> { self.binary(opcode::DREM, VerificationType::Double) }

	pub fn ineg(&mut self) -> Result<()> { self.unary(opcode::INEG, VerificationType::Integer) }
	pub fn lneg(&mut self) -> Result<()> { self.unary(opcode::LNEG, VerificationType::Long) }
	pub fn fneg(&mut self) -> Result<()> { self.unary(opcode::FNEG, VerificationType::Float) }
	pub fn dneg(&mut self) -> Result<()> { self.unary(opcode::DNEG, VerificationType::Double) }

	pub fn ishl(&mut self) -> Result<()> { self.binary(opcode::ISHL, VerificationType::Integer) }
	pub fn lshl(&mut self) -> Result<()> { self.binary(opcode::LSHL, VerificationType::Long) }
	pub fn ishr(&mut self) -> Result<()> { self.binary(opcode::ISHR, VerificationType::Integer) }
	pub fn lshr(&mut self) -> Result<()> { self.binary(opcode::LSHR, VerificationType::Long) }
	pub fn iushr(&mut self) -> Result<()> { self.binary(opcode::IUSHR, VerificationType::Integer) }
	pub fn lushr(&mut self) -> Result<()> { self.binary(opcode::LUSHR, VerificationType::Long) }
	pub fn iand(&mut self) -> Result<()> { self.binary(opcode::IAND, VerificationType::Integer) }
	pub fn land(&mut self) -> Result<()> { self.binary(opcode::LAND, VerificationType::Long) }
	pub fn ior(&mut self) -> Result<()> { self.binary(opcode::IOR, VerificationType::Integer) }
	pub fn lor(&mut self) -> Result<()> { self.binary(opcode::LOR, VerificationType::Long) }
	pub fn ixor(&mut self) -> Result<()> { self.binary(opcode::IXOR, VerificationType::Integer) }
	pub fn lxor(&mut self) -> Result<()> { self.binary(opcode::LXOR, VerificationType::Long) }

	pub fn i2l(&mut self) -> Result<()> { self.unary(opcode::I2L, VerificationType::Long) }
	pub fn i2f(&mut self) -> Result<()> { self.unary(opcode::I2F, VerificationType::Float) }
	pub fn i2d(&mut self) -> Result<()> { self.unary(opcode::I2D, VerificationType::Double) }
	pub fn l2i(&mut self) -> Result<()> { self.unary(opcode::L2I, VerificationType::Integer) }
	pub fn l2f(&mut self) -> Result<()> { self.unary(opcode::L2F, VerificationType::Float) }
	pub fn l2d(&mut self) -> Result<()> { self.unary(opcode::L2D, VerificationType::Double) }
	pub fn f2i(&mut self) -> Result<()> { self.unary(opcode::F2I, VerificationType::Integer) }
	pub fn f2l(&mut self) -> Result<()> { self.unary(opcode::F2L, VerificationType::Long) }
	pub fn f2d(&mut self) -> Result<()> { self.unary(opcode::F2D, VerificationType::Double) }
	pub fn d2i(&mut self) -> Result<()> { self.unary(opcode::D2I, VerificationType::Integer) }
	pub fn d2l(&mut self) -> Result<()> { self.unary(opcode::D2L, VerificationType::Long) }
	pub fn d2f(&mut self) -> Result<()> { self.unary(opcode::D2F, VerificationType::Float) }
	pub fn i2b(&mut self) -> Result<()> { self.unary(opcode::I2B, VerificationType::Integer) }
	pub fn i2c(&mut self) -> Result<()> { self.unary(opcode::I2C, VerificationType::Integer) }
	pub fn i2s(&mut self) -> Result<()> { self.unary(opcode::I2S, VerificationType::Integer) }

	pub fn lcmp(&mut self) -> Result<()> {
		self.binary(opcode::LCMP, VerificationType::Integer)
	}

	pub fn fcmp(&mut self, bias: CmpNanBias) -> Result<()> {
		let opcode_ = match bias {
			CmpNanBias::L => opcode::FCMPL,
			CmpNanBias::G => opcode::FCMPG,
		};
		self.binary(opcode_, VerificationType::Integer)
	}

	pub fn dcmp(&mut self, bias: CmpNanBias) -> Result<()> {
		let opcode_ = match bias {
			CmpNanBias::L => opcode::DCMPL,
			CmpNanBias::G => opcode::DCMPG,
		};
		self.binary(opcode_, VerificationType::Integer)
	}

	// -- untyped stack manipulation ----------------------------------------

	pub fn pop(&mut self) -> Result<()> {
		if !self.alive { return Ok(()); }
		let t = self.pop_any()?;
		if t.is_wide() {
			bail!("pop would split the wide value {t:?} in method {:?}", self.method_name);
		}
		self.emit(opcode::POP);
		Ok(())
	}

	pub fn pop2(&mut self) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.take_slots(2)?;
		self.emit(opcode::POP2);
		Ok(())
	}

	pub fn dup(&mut self) -> Result<()> {
		if !self.alive { return Ok(()); }
		let t = self.frame.peek()?.clone();
		if t.is_wide() {
			bail!("dup on the wide value {t:?} in method {:?}", self.method_name);
		}
		self.emit(opcode::DUP);
		self.push(t);
		Ok(())
	}

	pub fn dup_x1(&mut self) -> Result<()> {
		if !self.alive { return Ok(()); }
		let a = self.take_slots(1)?;
		let b = self.take_slots(1)?;
		self.emit(opcode::DUP_X1);
		for t in a.iter().chain(&b).chain(&a) {
			self.push(t.clone());
		}
		Ok(())
	}

	pub fn dup_x2(&mut self) -> Result<()> {
		if !self.alive { return Ok(()); }
		let a = self.take_slots(1)?;
		let b = self.take_slots(2)?;
		self.emit(opcode::DUP_X2);
		for t in a.iter().chain(&b).chain(&a) {
			self.push(t.clone());
		}
		Ok(())
	}

	pub fn dup2(&mut self) -> Result<()> {
		if !self.alive { return Ok(()); }
		let a = self.take_slots(2)?;
		self.emit(opcode::DUP2);
		for t in a.iter().chain(&a) {
			self.push(t.clone());
		}
		Ok(())
	}

	pub fn dup2_x1(&mut self) -> Result<()> {
		if !self.alive { return Ok(()); }
		let a = self.take_slots(2)?;
		let b = self.take_slots(1)?;
		self.emit(opcode::DUP2_X1);
		for t in a.iter().chain(&b).chain(&a) {
			self.push(t.clone());
		}
		Ok(())
	}

	pub fn dup2_x2(&mut self) -> Result<()> {
		if !self.alive { return Ok(()); }
		let a = self.take_slots(2)?;
		let b = self.take_slots(2)?;
		self.emit(opcode::DUP2_X2);
		for t in a.iter().chain(&b).chain(&a) {
			self.push(t.clone());
		}
		Ok(())
	}

	pub fn swap(&mut self) -> Result<()> {
		if !self.alive { return Ok(()); }
		let a = self.take_slots(1)?;
		let b = self.take_slots(1)?;
		self.emit(opcode::SWAP);
		for t in a.iter().chain(&b) {
			self.push(t.clone());
		}
		Ok(())
	}

	// -- category-aware stack manipulation ---------------------------------

	/// Pops the top value with `pop` or `pop2`, whichever its category needs.
	pub fn pop_value(&mut self) -> Result<()> {
		if !self.alive { return Ok(()); }
		if self.frame.peek()?.is_wide() { self.pop2() } else { self.pop() }
	}

	/// Duplicates the top value with `dup` or `dup2`.
	pub fn dup_value(&mut self) -> Result<()> {
		if !self.alive { return Ok(()); }
		if self.frame.peek()?.is_wide() { self.dup2() } else { self.dup() }
	}

	/// Duplicates the top value below the one-slot value beneath it, with
	/// `dup_x1` or `dup2_x1`.
	pub fn dup_value_x1(&mut self) -> Result<()> {
		if !self.alive { return Ok(()); }
		if self.frame.peek()?.is_wide() { self.dup2_x1() } else { self.dup_x1() }
	}

	/// Duplicates the top value below the two slots beneath it, with
	/// `dup_x2` or `dup2_x2`.
	pub fn dup_value_x2(&mut self) -> Result<()> {
		if !self.alive { return Ok(()); }
		if self.frame.peek()?.is_wide() { self.dup2_x2() } else { self.dup_x2() }
	}

	// -- fields, methods, objects ------------------------------------------

	pub fn getstatic(&mut self, index: u16, t: VerificationType) {
		if !self.alive { return; }
		self.emit(opcode::GETSTATIC);
		self.emit_u16(index);
		self.push(t);
	}

	pub fn putstatic(&mut self, index: u16) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.pop_any()?;
		self.emit(opcode::PUTSTATIC);
		self.emit_u16(index);
		Ok(())
	}

	pub fn getfield(&mut self, index: u16, t: VerificationType) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.pop_any()?; // objectref
		self.emit(opcode::GETFIELD);
		self.emit_u16(index);
		self.push(t);
		Ok(())
	}

	pub fn putfield(&mut self, index: u16) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.pop_any()?; // value
		self.pop_any()?; // objectref
		self.emit(opcode::PUTFIELD);
		self.emit_u16(index);
		Ok(())
	}

	fn invoke(&mut self, opcode_: u8, index: u16, method_descriptor: &str, has_receiver: bool) -> Result<()> {
		if !self.alive { return Ok(()); }
		let parsed = descriptor::parse_method_descriptor(method_descriptor)?;
		for _ in &parsed.parameter_descriptors {
			self.pop_any()?;
		}
		if has_receiver {
			self.pop_any()?;
		}
		self.emit(opcode_);
		self.emit_u16(index);
		if let Some(return_descriptor) = &parsed.return_descriptor {
			self.push(VerificationType::of_descriptor_type(return_descriptor));
		}
		Ok(())
	}

	pub fn invokestatic(&mut self, index: u16, method_descriptor: &str) -> Result<()> {
		self.invoke(opcode::INVOKESTATIC, index, method_descriptor, false)
	}

	pub fn invokevirtual(&mut self, index: u16, method_descriptor: &str) -> Result<()> {
		self.invoke(opcode::INVOKEVIRTUAL, index, method_descriptor, true)
	}

	pub fn invokespecial(&mut self, index: u16, method_descriptor: &str) -> Result<()> {
		self.invoke(opcode::INVOKESPECIAL, index, method_descriptor, true)
	}

	/// `new` of the class at `index`, named `class_name`.
	pub fn new_object(&mut self, index: u16, class_name: &str) {
		if !self.alive { return; }
		self.emit(opcode::NEW);
		self.emit_u16(index);
		self.push(VerificationType::object(class_name));
	}

	pub fn newarray(&mut self, atype: u8) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.pop_any()?; // count
		self.emit(opcode::NEWARRAY);
		self.emit(atype);
		let descriptor = match atype {
			crate::class_constants::atype::T_BOOLEAN => "[Z",
			crate::class_constants::atype::T_CHAR => "[C",
			crate::class_constants::atype::T_FLOAT => "[F",
			crate::class_constants::atype::T_DOUBLE => "[D",
			crate::class_constants::atype::T_BYTE => "[B",
			crate::class_constants::atype::T_SHORT => "[S",
			crate::class_constants::atype::T_INT => "[I",
			crate::class_constants::atype::T_LONG => "[J",
			x => bail!("unknown array type {x:#x}"),
		};
		self.push(VerificationType::object(descriptor));
		Ok(())
	}

	/// `anewarray` of the component class at `index`, named `class_name`
	/// (an internal class name or an array descriptor).
	pub fn anewarray(&mut self, index: u16, class_name: &str) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.pop_any()?; // count
		self.emit(opcode::ANEWARRAY);
		self.emit_u16(index);
		let descriptor = if class_name.starts_with('[') {
			format!("[{class_name}")
		} else {
			format!("[L{class_name};")
		};
		self.push(VerificationType::Object(descriptor));
		Ok(())
	}

	pub fn arraylength(&mut self) -> Result<()> {
		self.unary(opcode::ARRAYLENGTH, VerificationType::Integer)
	}

	pub fn athrow(&mut self) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.pop_any()?;
		self.emit(opcode::ATHROW);
		self.alive = false;
		Ok(())
	}

	pub fn checkcast(&mut self, index: u16, class_name: &str) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.pop_any()?;
		self.emit(opcode::CHECKCAST);
		self.emit_u16(index);
		self.push(VerificationType::object(class_name));
		Ok(())
	}

	pub fn instanceof(&mut self, index: u16) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.pop_any()?;
		self.emit(opcode::INSTANCEOF);
		self.emit_u16(index);
		self.push(VerificationType::Integer);
		Ok(())
	}

	// -- returns -----------------------------------------------------------

	fn value_return(&mut self, opcode_: u8) -> Result<()> {
		if !self.alive { return Ok(()); }
		self.pop_any()?;
		self.emit(opcode_);
		self.alive = false;
		Ok(())
	}

	pub fn ireturn(&mut self) -> Result<()> { self.value_return(opcode::IRETURN) }
	pub fn lreturn(&mut self) -> Result<()> { self.value_return(opcode::LRETURN) }
	pub fn freturn(&mut self) -> Result<()> { self.value_return(opcode::FRETURN) }
	pub fn dreturn(&mut self) -> Result<()> { self.value_return(opcode::DRETURN) }
	pub fn areturn(&mut self) -> Result<()> { self.value_return(opcode::ARETURN) }

	pub fn void_return(&mut self) {
		if !self.alive { return; }
		self.emit(opcode::RETURN);
		self.alive = false;
	}

	// -- line numbers and finishing ----------------------------------------

	pub fn add_line_number(&mut self, line: u16) {
		if !self.alive { return; }
		let pc = self.pc();
		if self.line_numbers.last().is_some_and(|&(last_pc, last_line)| last_pc == pc || last_line == line) {
			return;
		}
		self.line_numbers.push((pc, line));
	}

	/// Resolves pending jumps and synthesizes the `StackMapTable` frames.
	pub fn finish(mut self) -> Result<MethodCode> {
		self.resolve_jumps()?;

		if !self.control_stack.is_empty() {
			bail!("control stack not empty at end of method {:?}", self.method_name);
		}

		let stack_map_frames = stackmap::collect_frames(&self.labels)?;
		debug!(
			"finished method {:?}: {} bytes, max_stack {}, max_locals {}, {} stack map frames",
			self.method_name, self.code.len(), self.max_stack, self.max_locals, stack_map_frames.len(),
		);

		Ok(MethodCode {
			code: self.code,
			max_stack: self.max_stack,
			max_locals: self.max_locals,
			line_numbers: self.line_numbers,
			stack_map_frames,
		})
	}

	pub fn initial_frame(&self) -> &Frame {
		&self.initial_frame
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::class_constants::opcode;
	use crate::frame::VerificationType;
	use crate::pool::ConstantPool;
	use super::CodeBuilder;

	#[test]
	fn iconst_form_selection() -> Result<()> {
		let mut pool = ConstantPool::new();
		let mut cb = CodeBuilder::new("t");
		cb.iconst(&mut pool, -1)?;
		cb.iconst(&mut pool, 5)?;
		cb.iconst(&mut pool, 100)?;
		cb.iconst(&mut pool, 300)?;
		cb.iconst(&mut pool, 100_000)?;
		assert_eq!(cb.code[0], opcode::ICONST_M1);
		assert_eq!(cb.code[1], opcode::ICONST_5);
		assert_eq!(cb.code[2], opcode::BIPUSH);
		assert_eq!(cb.code[4], opcode::SIPUSH);
		assert_eq!(cb.code[7], opcode::LDC);
		assert_eq!(cb.stack_count(), 5);
		Ok(())
	}

	#[test]
	fn max_stack_counts_wide_slots() -> Result<()> {
		let mut pool = ConstantPool::new();
		let mut cb = CodeBuilder::new("t");
		cb.lconst(&mut pool, 1)?;
		cb.lconst(&mut pool, 2)?;
		cb.ladd()?;
		let code = cb.finish()?;
		assert_eq!(code.max_stack, 4);
		Ok(())
	}

	#[test]
	fn dup_value_picks_wide_form() -> Result<()> {
		let mut pool = ConstantPool::new();
		let mut cb = CodeBuilder::new("t");
		cb.dconst(&mut pool, 2.5)?;
		cb.dup_value()?;
		assert_eq!(*cb.code.last().expect("code is non-empty"), opcode::DUP2);
		cb.pop_value()?;
		assert_eq!(*cb.code.last().expect("code is non-empty"), opcode::POP2);
		assert_eq!(cb.stack_count(), 1);
		Ok(())
	}

	#[test]
	fn dup_on_wide_value_is_an_error() -> Result<()> {
		let mut pool = ConstantPool::new();
		let mut cb = CodeBuilder::new("t");
		cb.lconst(&mut pool, 7)?;
		assert!(cb.dup().is_err());
		Ok(())
	}

	#[test]
	fn forward_jump_is_patched() -> Result<()> {
		let mut pool = ConstantPool::new();
		let mut cb = CodeBuilder::new("t");
		let label = cb.create_label();
		cb.iconst(&mut pool, 0)?;
		cb.jump_if(label)?;     // pc 1: ifne +4
		cb.iconst(&mut pool, 1)?;
		cb.pop()?;
		cb.place_label(label)?;
		cb.void_return();
		let code = cb.finish()?;
		assert_eq!(code.code[1], opcode::IFNE);
		// the ifne sits at pc 1, its target at pc 6
		assert_eq!(&code.code[2..4], &5i16.to_be_bytes());
		Ok(())
	}

	#[test]
	fn jump_to_unplaced_label_fails_at_finish() -> Result<()> {
		let mut cb = CodeBuilder::new("t");
		let label = cb.create_label();
		cb.jump(label)?;
		assert!(cb.finish().is_err());
		Ok(())
	}

	#[test]
	fn placing_a_label_twice_is_an_error() -> Result<()> {
		let mut cb = CodeBuilder::new("t");
		let label = cb.create_label();
		cb.place_label(label)?;
		assert!(cb.place_label(label).is_err());
		Ok(())
	}

	#[test]
	fn unconditional_jump_kills_emission() -> Result<()> {
		let mut pool = ConstantPool::new();
		let mut cb = CodeBuilder::new("t");
		let end = cb.create_label();
		cb.jump(end)?;
		assert!(!cb.is_alive());

		// dead emission appends nothing
		let len = cb.code.len();
		cb.iconst(&mut pool, 42)?;
		assert_eq!(cb.code.len(), len);

		// placing the jumped-to label revives
		cb.place_label(end)?;
		assert!(cb.is_alive());
		Ok(())
	}

	#[test]
	fn block_scoped_locals_are_reused() -> Result<()> {
		let mut cb = CodeBuilder::new("t");
		let a = cb.allocate_local(VerificationType::Integer);
		cb.begin_block();
		let b = cb.allocate_local(VerificationType::Long);
		cb.end_block()?;
		cb.begin_block();
		let c = cb.allocate_local(VerificationType::Integer);
		cb.end_block()?;
		assert_eq!(a, 0);
		assert_eq!(b, 1);
		assert_eq!(c, 1);
		Ok(())
	}

	#[test]
	fn tableswitch_for_dense_lookupswitch_for_sparse() {
		assert!(CodeBuilder::should_use_tableswitch(3, 1, 3));
		assert!(CodeBuilder::should_use_tableswitch(4, 0, 4));
		assert!(!CodeBuilder::should_use_tableswitch(3, 0, 10000));
		assert!(!CodeBuilder::should_use_tableswitch(2, 0, 1000));
	}

	#[test]
	fn lookupswitch_requires_sorted_pairs() -> Result<()> {
		let mut pool = ConstantPool::new();
		let mut cb = CodeBuilder::new("t");
		let a = cb.create_label();
		let end = cb.create_label();
		cb.jump(end)?;
		cb.place_label(a)?;
		cb.void_return();
		cb.place_label(end)?;
		cb.iconst(&mut pool, 1)?;
		assert!(cb.lookupswitch(a, &[(10, a), (5, a)]).is_err());
		Ok(())
	}

	#[test]
	fn branch_targets_get_stack_map_frames() -> Result<()> {
		let mut pool = ConstantPool::new();
		let mut cb = CodeBuilder::new("t");
		cb.set_param(0, VerificationType::Integer);
		let else_ = cb.create_label();
		let end = cb.create_label();
		cb.iload(0)?;
		cb.jump_if_not(else_)?;
		cb.iconst(&mut pool, 1)?;
		cb.pop()?;
		cb.jump(end)?;
		cb.place_label(else_)?;
		cb.place_label(end)?;
		cb.void_return();
		let code = cb.finish()?;
		assert_eq!(code.stack_map_frames.len(), 1); // both labels share one pc
		Ok(())
	}

	#[test]
	fn break_targets_nearest_loop_or_switch() -> Result<()> {
		use super::{LoopContext, SwitchContext};
		let mut cb = CodeBuilder::new("t");
		let (cond, body, end) = (cb.create_label(), cb.create_label(), cb.create_label());
		cb.push_loop(LoopContext {
			cond_label: cond, body_label: body, post_label: None, end_label: end,
			continue_label: cond, is_do_while: false, has_post: false,
		});
		let (dispatch, swend) = (cb.create_label(), cb.create_label());
		cb.push_switch(SwitchContext {
			dispatch_label: dispatch, end_label: swend, default_label: None,
			cases: Vec::new(), entry_frame: None, expr_local: 0,
		});

		cb.emit_break()?; // goes to the switch end, not the loop end
		let sw = cb.pop_switch()?;
		assert!(cb.labels[sw.end_label.id as usize].referenced);
		assert!(!cb.labels[end.id as usize].referenced);

		cb.mark_alive();
		cb.emit_continue()?; // loop condition
		assert!(cb.labels[cond.id as usize].referenced);
		cb.pop_loop()?;
		Ok(())
	}

	#[test]
	fn duplicate_case_value_is_an_error() -> Result<()> {
		use super::SwitchContext;
		let mut cb = CodeBuilder::new("t");
		let (dispatch, end) = (cb.create_label(), cb.create_label());
		cb.push_switch(SwitchContext {
			dispatch_label: dispatch, end_label: end, default_label: None,
			cases: Vec::new(), entry_frame: None, expr_local: 0,
		});
		let a = cb.create_label();
		cb.switch_add_case(3, a)?;
		assert!(cb.switch_add_case(3, a).is_err());
		cb.pop_switch()?;
		Ok(())
	}
}
