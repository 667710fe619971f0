//! `StackMapTable` synthesis.
//!
//! Frames are collected at every referenced, placed label; the delta encoding
//! (`same` / `same_locals_1_stack_item` / `chop` / `append` / `full_frame`)
//! is chosen when the attribute is written out.

use anyhow::{anyhow, bail, Result};
use crate::class_constants::{stack_map_frame, verification_type};
use crate::code::LabelRecord;
use crate::descriptor;
use crate::frame::{Frame, VerificationType};
use crate::pool::ConstantPool;
use crate::ClassWrite;

/// Gathers the frame of every branch target, ascending in pc.
///
/// Only labels that were actually placed, carry a saved frame, and are
/// referenced by some jump or switch produce an entry. Multiple labels placed
/// at the same pc collapse into one entry.
pub(crate) fn collect_frames(labels: &[LabelRecord]) -> Result<Vec<(u16, Frame)>> {
	let mut frames: Vec<(u16, Frame)> = Vec::new();
	for record in labels {
		if !(record.placed && record.frame_saved && record.referenced) {
			continue;
		}
		frames.push((record.pc, record.frame.clone()));
	}
	frames.sort_by_key(|&(pc, _)| pc);

	let mut out: Vec<(u16, Frame)> = Vec::new();
	for (pc, frame) in frames {
		match out.last_mut() {
			Some((last_pc, last_frame)) if *last_pc == pc => {
				// labels placed at the same pc describe the same point
				last_frame.merge(&frame)
					.map_err(|e| anyhow!("conflicting frames at pc {pc}: {e}"))?;
			},
			_ => out.push((pc, frame)),
		}
	}
	Ok(out)
}

/// The frame the verifier derives for pc 0 of a static method from its
/// descriptor alone: parameters in the first local slots, empty stack.
pub fn initial_frame_of_descriptor(method_descriptor: &str) -> Result<Frame> {
	let parsed = descriptor::parse_method_descriptor(method_descriptor)?;
	let mut frame = Frame::new();
	let mut slot = 0;
	for parameter in &parsed.parameter_descriptors {
		let t = VerificationType::of_descriptor_type(parameter);
		let size = t.slot_size();
		frame.set_local(slot, t);
		slot += size;
	}
	Ok(frame)
}

fn write_verification_type(writer: &mut impl ClassWrite, pool: &mut ConstantPool, t: &VerificationType) -> Result<()> {
	match t {
		VerificationType::Top => writer.write_u8(verification_type::TOP),
		VerificationType::Integer => writer.write_u8(verification_type::INTEGER),
		VerificationType::Float => writer.write_u8(verification_type::FLOAT),
		VerificationType::Double => writer.write_u8(verification_type::DOUBLE),
		VerificationType::Long => writer.write_u8(verification_type::LONG),
		VerificationType::Null => writer.write_u8(verification_type::NULL),
		VerificationType::UninitializedThis => writer.write_u8(verification_type::UNINITIALIZED_THIS),
		VerificationType::Object(class_name) => {
			writer.write_u8(verification_type::OBJECT)?;
			writer.write_u16(pool.put_class(class_name)?)
		},
	}
}

/// Writes the body of a `StackMapTable` attribute: the frame count followed
/// by one delta-encoded frame per branch target.
pub fn write_stack_map_table(
	writer: &mut impl ClassWrite,
	pool: &mut ConstantPool,
	initial_frame: &Frame,
	frames: &[(u16, Frame)],
) -> Result<()> {
	writer.write_usize_as_u16(frames.len())?;

	let mut previous_locals = initial_frame.compressed_locals();
	let mut previous_pc: Option<u16> = None;

	for (pc, frame) in frames {
		let offset_delta = match previous_pc {
			None => *pc,
			Some(previous_pc) => {
				if *pc <= previous_pc {
					bail!("stack map frames out of order: pc {pc} after {previous_pc}");
				}
				pc - previous_pc - 1
			},
		};

		let locals = frame.compressed_locals();
		let stack = &frame.stack;

		if stack.is_empty() && locals == previous_locals {
			if offset_delta <= stack_map_frame::SAME_MAX as u16 {
				writer.write_u8(offset_delta as u8)?;
			} else {
				writer.write_u8(stack_map_frame::SAME_EXTENDED)?;
				writer.write_u16(offset_delta)?;
			}
		} else if stack.len() == 1 && locals == previous_locals {
			if offset_delta <= stack_map_frame::SAME_MAX as u16 {
				writer.write_u8(stack_map_frame::SAME_LOCALS_1_STACK_ITEM_MIN + offset_delta as u8)?;
			} else {
				writer.write_u8(stack_map_frame::SAME_LOCALS_1_STACK_ITEM_EXTENDED)?;
				writer.write_u16(offset_delta)?;
			}
			write_verification_type(writer, pool, &stack[0])?;
		} else if stack.is_empty()
			&& locals.len() < previous_locals.len()
			&& previous_locals.len() - locals.len() <= 3
			&& previous_locals[..locals.len()] == locals[..]
		{
			let chopped = (previous_locals.len() - locals.len()) as u8;
			writer.write_u8(stack_map_frame::SAME_EXTENDED - chopped)?;
			writer.write_u16(offset_delta)?;
		} else if stack.is_empty()
			&& locals.len() > previous_locals.len()
			&& locals.len() - previous_locals.len() <= 3
			&& locals[..previous_locals.len()] == previous_locals[..]
		{
			let appended = (locals.len() - previous_locals.len()) as u8;
			writer.write_u8(stack_map_frame::SAME_EXTENDED + appended)?;
			writer.write_u16(offset_delta)?;
			for t in &locals[previous_locals.len()..] {
				write_verification_type(writer, pool, t)?;
			}
		} else {
			writer.write_u8(stack_map_frame::FULL)?;
			writer.write_u16(offset_delta)?;
			writer.write_usize_as_u16(locals.len())?;
			for t in &locals {
				write_verification_type(writer, pool, t)?;
			}
			writer.write_usize_as_u16(stack.len())?;
			for t in stack {
				write_verification_type(writer, pool, t)?;
			}
		}

		previous_locals = locals;
		previous_pc = Some(*pc);
	}

	Ok(())
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::class_constants::stack_map_frame;
	use crate::frame::{Frame, VerificationType};
	use crate::pool::ConstantPool;
	use super::{initial_frame_of_descriptor, write_stack_map_table};

	#[test]
	fn initial_frame_from_descriptor() -> Result<()> {
		let frame = initial_frame_of_descriptor("(IJ[L__charPtr;)I")?;
		assert_eq!(frame.compressed_locals(), vec![
			VerificationType::Integer,
			VerificationType::Long,
			VerificationType::object("[L__charPtr;"),
		]);
		assert_eq!(frame.local_slots(), 4);
		assert!(frame.stack.is_empty());
		Ok(())
	}

	#[test]
	fn same_frame_small_delta() -> Result<()> {
		let initial = initial_frame_of_descriptor("(I)V")?;
		let frames = vec![(10u16, initial.clone())];

		let mut pool = ConstantPool::new();
		let mut out = Vec::new();
		write_stack_map_table(&mut out, &mut pool, &initial, &frames)?;
		assert_eq!(out, vec![0, 1, 10]);
		Ok(())
	}

	#[test]
	fn append_and_chop() -> Result<()> {
		let initial = initial_frame_of_descriptor("(I)V")?;
		let mut appended = initial.clone();
		appended.set_local(1, VerificationType::Integer);
		let frames = vec![(4u16, appended), (8u16, initial.clone())];

		let mut pool = ConstantPool::new();
		let mut out = Vec::new();
		write_stack_map_table(&mut out, &mut pool, &initial, &frames)?;
		assert_eq!(out, vec![
			0, 2,
			stack_map_frame::APPEND_1, 0, 4, crate::class_constants::verification_type::INTEGER,
			stack_map_frame::CHOP_1, 0, 3,
		]);
		Ok(())
	}

	#[test]
	fn one_stack_item() -> Result<()> {
		let initial = Frame::new();
		let mut with_stack = Frame::new();
		with_stack.push(VerificationType::Integer);
		let frames = vec![(2u16, with_stack)];

		let mut pool = ConstantPool::new();
		let mut out = Vec::new();
		write_stack_map_table(&mut out, &mut pool, &initial, &frames)?;
		assert_eq!(out, vec![
			0, 1,
			stack_map_frame::SAME_LOCALS_1_STACK_ITEM_MIN + 2,
			crate::class_constants::verification_type::INTEGER,
		]);
		Ok(())
	}
}
