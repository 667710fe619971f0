//! Verification types and frame snapshots.
//!
//! A [`Frame`] models what the JVM verifier knows about the operand stack and
//! the local variables at one program point.

use anyhow::{anyhow, bail, Result};
use crate::descriptor::Type;

/// Represents a type inside of the operand stack or the local variable table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationType {
	Top,
	Integer,
	Float,
	Long,
	Double,
	Null,
	UninitializedThis,
	Object(String),
}

impl VerificationType {
	/// `true` for [`VerificationType::Long`] and [`VerificationType::Double`],
	/// which occupy two slots.
	pub fn is_wide(&self) -> bool {
		matches!(self, VerificationType::Long | VerificationType::Double)
	}

	pub fn slot_size(&self) -> u16 {
		if self.is_wide() { 2 } else { 1 }
	}

	pub fn is_reference(&self) -> bool {
		matches!(self, VerificationType::Null | VerificationType::Object(_))
	}

	/// Object type with the given internal class name.
	pub fn object(internal_name: &str) -> VerificationType {
		VerificationType::Object(internal_name.to_owned())
	}

	/// The verification type of a value described by a field descriptor type.
	pub fn of_descriptor_type(t: &Type) -> VerificationType {
		match t {
			Type::B | Type::C | Type::I | Type::S | Type::Z => VerificationType::Integer,
			Type::F => VerificationType::Float,
			Type::J => VerificationType::Long,
			Type::D => VerificationType::Double,
			Type::Object(name) => VerificationType::Object(name.clone()),
			array @ Type::Array(..) => {
				// array classes are named by their descriptor
				VerificationType::Object(crate::descriptor::write_field_descriptor(array))
			},
		}
	}

	/// The least type both inputs can be used as, for joining control flow
	/// edges. Diverging numeric categories have no join and are an error.
	fn merge(&self, other: &VerificationType) -> Result<VerificationType> {
		Ok(match (self, other) {
			(a, b) if a == b => a.clone(),
			(VerificationType::Null, b) if b.is_reference() => b.clone(),
			(a, VerificationType::Null) if a.is_reference() => a.clone(),
			(VerificationType::Object(_), VerificationType::Object(_)) => {
				// common supertype resolution would need a class hierarchy,
				// Object is always a legal join for the code we emit
				VerificationType::object("java/lang/Object")
			},
			(VerificationType::Top, _) | (_, VerificationType::Top) => VerificationType::Top,
			(a, b) => bail!("cannot merge verification types {a:?} and {b:?}"),
		})
	}
}

/// The typed snapshot of operand stack and locals at one program point.
///
/// The operand stack holds one entry per value (a wide value is one entry).
/// The locals are slot-indexed: a wide value occupies its slot plus a
/// [`VerificationType::Top`] in the following slot, unused slots hold `Top`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
	pub stack: Vec<VerificationType>,
	pub locals: Vec<VerificationType>,
}

impl Frame {
	pub fn new() -> Frame {
		Frame::default()
	}

	pub fn push(&mut self, t: VerificationType) {
		self.stack.push(t);
	}

	pub fn pop(&mut self) -> Result<VerificationType> {
		self.stack.pop().ok_or_else(|| anyhow!("operand stack underflow"))
	}

	pub fn peek(&self) -> Result<&VerificationType> {
		self.stack.last().ok_or_else(|| anyhow!("operand stack is empty"))
	}

	pub fn stack_count(&self) -> usize {
		self.stack.len()
	}

	/// The number of stack slots currently in use. Differs from
	/// [`Frame::stack_count`] whenever wide values are on the stack.
	pub fn stack_slots(&self) -> u16 {
		self.stack.iter().map(VerificationType::slot_size).sum()
	}

	pub fn local_slots(&self) -> u16 {
		self.locals.len() as u16
	}

	/// Records a store into the local variable at `slot`.
	///
	/// Keeps the wide-pair discipline intact: storing a wide value also claims
	/// `slot + 1`, and overwriting either half of an existing pair demotes the
	/// other half to [`VerificationType::Top`].
	pub fn set_local(&mut self, slot: u16, t: VerificationType) {
		let slot = slot as usize;
		let needed = slot + t.slot_size() as usize;
		if self.locals.len() < needed {
			self.locals.resize(needed, VerificationType::Top);
		}

		// a store into the upper half of a wide pair kills the pair
		if slot > 0 && self.locals[slot - 1].is_wide() {
			self.locals[slot - 1] = VerificationType::Top;
		}
		// a store over the lower half kills the upper half
		if self.locals[slot].is_wide() && slot + 1 < self.locals.len() {
			self.locals[slot + 1] = VerificationType::Top;
		}

		let wide = t.is_wide();
		self.locals[slot] = t;
		if wide {
			self.locals[slot + 1] = VerificationType::Top;
		}
	}

	pub fn get_local(&self, slot: u16) -> Result<&VerificationType> {
		self.locals.get(slot as usize)
			.ok_or_else(|| anyhow!("local slot {slot} is out of range (frame has {})", self.locals.len()))
	}

	/// Joins `other` into this frame. Stack shapes must agree entry by entry.
	pub fn merge(&mut self, other: &Frame) -> Result<()> {
		if self.stack.len() != other.stack.len() {
			bail!(
				"frame merge conflict: stack depth {} vs {}",
				self.stack.len(), other.stack.len(),
			);
		}
		for (a, b) in self.stack.iter_mut().zip(&other.stack) {
			*a = a.merge(b)?;
		}

		// locals merge slot-wise, missing slots are Top
		let len = self.locals.len().max(other.locals.len());
		self.locals.resize(len, VerificationType::Top);
		for (slot, a) in self.locals.iter_mut().enumerate() {
			let b = other.locals.get(slot).unwrap_or(&VerificationType::Top);
			*a = a.merge(b).unwrap_or(VerificationType::Top);
		}
		Ok(())
	}

	/// The locals in the compressed form the `StackMapTable` uses: a wide
	/// entry stands for both of its slots, trailing `Top`s are kept (they
	/// represent locals holding no useful value).
	pub fn compressed_locals(&self) -> Vec<VerificationType> {
		let mut out = Vec::new();
		let mut slot = 0;
		while slot < self.locals.len() {
			let t = self.locals[slot].clone();
			slot += t.slot_size() as usize;
			out.push(t);
		}
		out
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use super::{Frame, VerificationType};

	#[test]
	fn stack_slots_counts_wide_twice() -> Result<()> {
		let mut frame = Frame::new();
		frame.push(VerificationType::Integer);
		frame.push(VerificationType::Long);
		assert_eq!(frame.stack_count(), 2);
		assert_eq!(frame.stack_slots(), 3);

		assert_eq!(frame.pop()?, VerificationType::Long);
		assert_eq!(frame.stack_slots(), 1);
		Ok(())
	}

	#[test]
	fn pop_on_empty_stack_is_an_error() {
		let mut frame = Frame::new();
		assert!(frame.pop().is_err());
	}

	#[test]
	fn wide_local_claims_two_slots() -> Result<()> {
		let mut frame = Frame::new();
		frame.set_local(0, VerificationType::Long);
		assert_eq!(frame.get_local(0)?, &VerificationType::Long);
		assert_eq!(frame.get_local(1)?, &VerificationType::Top);
		assert_eq!(frame.local_slots(), 2);
		Ok(())
	}

	#[test]
	fn overwriting_half_of_a_wide_pair_kills_it() {
		let mut frame = Frame::new();
		frame.set_local(0, VerificationType::Double);
		frame.set_local(1, VerificationType::Integer);
		assert_eq!(frame.locals, vec![VerificationType::Top, VerificationType::Integer]);

		let mut frame = Frame::new();
		frame.set_local(0, VerificationType::Double);
		frame.set_local(0, VerificationType::Integer);
		assert_eq!(frame.locals, vec![VerificationType::Integer, VerificationType::Top]);
	}

	#[test]
	fn compressed_locals_fold_wide_pairs() {
		let mut frame = Frame::new();
		frame.set_local(0, VerificationType::Integer);
		frame.set_local(1, VerificationType::Long);
		frame.set_local(3, VerificationType::object("java/lang/Object"));
		assert_eq!(frame.compressed_locals(), vec![
			VerificationType::Integer,
			VerificationType::Long,
			VerificationType::object("java/lang/Object"),
		]);
	}

	#[test]
	fn merge_conflicting_depth_fails() {
		let mut a = Frame::new();
		a.push(VerificationType::Integer);
		let b = Frame::new();
		assert!(a.merge(&b).is_err());
	}

	#[test]
	fn merge_null_with_object() -> Result<()> {
		let mut a = Frame::new();
		a.push(VerificationType::Null);
		let mut b = Frame::new();
		b.push(VerificationType::object("__intPtr"));
		a.merge(&b)?;
		assert_eq!(a.stack, vec![VerificationType::object("__intPtr")]);
		Ok(())
	}
}
