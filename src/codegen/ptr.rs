//! Pointer lowering.
//!
//! Every non-`void*` pointer value is an instance of one of the runtime
//! wrapper classes (`__intPtr`, `__charPtr`, ...) holding a `base` array and
//! an `int` offset. The routines here emit the exact stack shuffles that
//! create, advance, compare, read and write through such wrappers.

use anyhow::Result;
use crema::frame::VerificationType;
use crate::ast::CType;
use crate::jvm_types::{self, PointerKind};
use super::Codegen;

/// The interned constant pool entries of one wrapper class.
pub(crate) struct PtrRefs {
	pub(crate) class_index: u16,
	pub(crate) init_index: u16,
	pub(crate) base_field: u16,
	pub(crate) offset_field: u16,
	pub(crate) class_name: &'static str,
	pub(crate) base_descriptor: &'static str,
}

impl Codegen<'_> {
	pub(crate) fn ptr_refs(&mut self, kind: PointerKind) -> Result<PtrRefs> {
		self.ctx.mark_ptr_usage(kind);

		let class_name = kind.class_name();
		let base_descriptor = kind.base_descriptor();
		let pool = &mut self.ctx.pool;

		Ok(PtrRefs {
			class_index: pool.put_class(class_name)?,
			init_index: pool.put_method_ref(class_name, "<init>", "()V")?,
			base_field: pool.put_field_ref(class_name, "base", base_descriptor)?,
			offset_field: pool.put_field_ref(class_name, "offset", "I")?,
			class_name,
			base_descriptor,
		})
	}

	/// The array load instruction for one element of a pointer's base array.
	fn emit_aload_for_kind(&mut self, kind: PointerKind) -> Result<()> {
		match kind {
			PointerKind::Char | PointerKind::Bool => self.cb.baload(),
			PointerKind::Short => self.cb.saload(),
			PointerKind::Int => self.cb.iaload(),
			PointerKind::Long => self.cb.laload(),
			PointerKind::Float => self.cb.faload(),
			PointerKind::Double => self.cb.daload(),
			PointerKind::Object => self.cb.aaload(),
		}
	}

	/// The array store instruction for one element of a pointer's base array.
	fn emit_astore_for_kind(&mut self, kind: PointerKind) -> Result<()> {
		match kind {
			PointerKind::Char | PointerKind::Bool => self.cb.bastore(),
			PointerKind::Short => self.cb.sastore(),
			PointerKind::Int => self.cb.iastore(),
			PointerKind::Long => self.cb.lastore(),
			PointerKind::Float => self.cb.fastore(),
			PointerKind::Double => self.cb.dastore(),
			PointerKind::Object => self.cb.aastore(),
		}
	}

	/// The shared tail of pointer construction. Stack: `[base, offset]` →
	/// `[ptr]`.
	fn emit_ptr_wrap(&mut self, refs: &PtrRefs) -> Result<()> {
		self.cb.new_object(refs.class_index, refs.class_name);
		self.cb.dup()?;
		self.cb.invokespecial(refs.init_index, "()V")?;
		self.cb.dup_x2()?;
		self.cb.swap()?;
		self.cb.putfield(refs.offset_field)?;
		self.cb.swap()?;
		self.cb.dup_x1()?;
		self.cb.swap()?;
		self.cb.putfield(refs.base_field)
	}

	/// `[base, offset]` → `[ptr]`: allocates a wrapper of the given kind and
	/// stores both fields.
	pub(crate) fn emit_ptr_create_by_kind(&mut self, kind: PointerKind) -> Result<()> {
		let refs = self.ptr_refs(kind)?;
		self.emit_ptr_wrap(&refs)
	}

	/// `[base, offset]` → `[ptr]` for the wrapper of `ptr_ty`.
	pub(crate) fn emit_ptr_create(&mut self, ptr_ty: &CType) -> Result<()> {
		self.emit_ptr_create_by_kind(jvm_types::pointer_kind(ptr_ty)?)
	}

	/// `[ptr, delta]` → `[new_ptr]` with `new_ptr.base = ptr.base` and
	/// `new_ptr.offset = ptr.offset + delta`.
	pub(crate) fn emit_ptr_add(&mut self, ptr_ty: &CType) -> Result<()> {
		let refs = self.ptr_refs(jvm_types::pointer_kind(ptr_ty)?)?;

		self.cb.swap()?;                        // [delta, ptr]
		self.cb.dup()?;                         // [delta, ptr, ptr]
		self.cb.getfield(refs.base_field, VerificationType::object(refs.base_descriptor))?;
		self.cb.dup_x1()?;                      // [delta, base, ptr, base]
		self.cb.pop()?;                         // [delta, base, ptr]
		self.cb.getfield(refs.offset_field, VerificationType::Integer)?;
		self.cb.dup2_x1()?;                     // [base, offset, delta, base, offset]
		self.cb.pop2()?;                        // [base, offset, delta]
		self.cb.iadd()?;                        // [base, offset+delta]
		self.emit_ptr_wrap(&refs)
	}

	/// `[p, q]` → `[p.offset - q.offset]`. Pointers into different bases are
	/// undefined here, matching C.
	pub(crate) fn emit_ptr_diff(&mut self, ptr_ty: &CType) -> Result<()> {
		let refs = self.ptr_refs(jvm_types::pointer_kind(ptr_ty)?)?;

		self.cb.swap()?;                        // [q, p]
		self.cb.getfield(refs.offset_field, VerificationType::Integer)?;
		self.cb.swap()?;                        // [p.offset, q]
		self.cb.getfield(refs.offset_field, VerificationType::Integer)?;
		self.cb.isub()
	}

	/// `[ptr]` → `[ptr.base[ptr.offset]]`. Unsigned `char` elements are
	/// zero-extended after the load.
	pub(crate) fn emit_ptr_deref(&mut self, ptr_ty: &CType) -> Result<()> {
		let kind = jvm_types::pointer_kind(ptr_ty)?;
		let refs = self.ptr_refs(kind)?;

		self.cb.dup()?;                         // [ptr, ptr]
		self.cb.getfield(refs.base_field, VerificationType::object(refs.base_descriptor))?;
		self.cb.swap()?;                        // [base, ptr]
		self.cb.getfield(refs.offset_field, VerificationType::Integer)?;
		self.emit_aload_for_kind(kind)?;        // [element]

		if kind == PointerKind::Char {
			if let Some(element) = ptr_ty.child() {
				if element.is_unsigned() {
					self.cb.iconst(&mut self.ctx.pool, 255)?;
					self.cb.iand()?;
				}
			}
		}
		Ok(())
	}

	/// `[ptr, value]` → `[]`: `ptr.base[ptr.offset] = value`, with the wide
	/// and narrow shuffles spelled out.
	pub(crate) fn emit_ptr_store(&mut self, ptr_ty: &CType) -> Result<()> {
		let kind = jvm_types::pointer_kind(ptr_ty)?;
		let refs = self.ptr_refs(kind)?;

		if kind.is_wide() {
			self.cb.dup2_x1()?;                 // [value, ptr, value]
			self.cb.pop2()?;                    // [value, ptr]
		} else {
			self.cb.swap()?;                    // [value, ptr]
		}
		self.cb.dup()?;                         // [value, ptr, ptr]
		self.cb.getfield(refs.base_field, VerificationType::object(refs.base_descriptor))?;
		self.cb.dup_x1()?;                      // [value, base, ptr, base]
		self.cb.pop()?;                         // [value, base, ptr]
		self.cb.getfield(refs.offset_field, VerificationType::Integer)?;
		if kind.is_wide() {
			self.cb.dup2_x2()?;                 // [base, offset, value, base, offset]
		} else {
			self.cb.dup2_x1()?;
		}
		self.cb.pop2()?;                        // [base, offset, value]
		self.emit_astore_for_kind(kind)
	}

	/// `[ptr, index]` → `[ptr.base[ptr.offset + index]]`.
	pub(crate) fn emit_ptr_subscript(&mut self, ptr_ty: &CType) -> Result<()> {
		let kind = jvm_types::pointer_kind(ptr_ty)?;
		let refs = self.ptr_refs(kind)?;

		self.cb.swap()?;                        // [index, ptr]
		self.cb.dup()?;                         // [index, ptr, ptr]
		self.cb.getfield(refs.base_field, VerificationType::object(refs.base_descriptor))?;
		self.cb.dup_x2()?;                      // [base, index, ptr, base]
		self.cb.pop()?;                         // [base, index, ptr]
		self.cb.getfield(refs.offset_field, VerificationType::Integer)?;
		self.cb.iadd()?;                        // [base, index+offset]
		self.emit_aload_for_kind(kind)?;

		if kind == PointerKind::Char {
			if let Some(element) = ptr_ty.child() {
				if element.is_unsigned() {
					self.cb.iconst(&mut self.ctx.pool, 255)?;
					self.cb.iand()?;
				}
			}
		}
		Ok(())
	}

	/// `[ptr, index, value]` → `[]`: `ptr.base[ptr.offset + index] = value`.
	pub(crate) fn emit_ptr_store_subscript(&mut self, ptr_ty: &CType) -> Result<()> {
		let kind = jvm_types::pointer_kind(ptr_ty)?;
		let refs = self.ptr_refs(kind)?;

		if kind.is_wide() {
			self.cb.dup2_x2()?;                 // [value, ptr, index, value]
		} else {
			self.cb.dup_x2()?;
		}
		self.cb.pop_value()?;                   // [value, ptr, index]
		self.cb.swap()?;                        // [value, index, ptr]
		self.cb.dup()?;                         // [value, index, ptr, ptr]
		self.cb.getfield(refs.base_field, VerificationType::object(refs.base_descriptor))?;
		self.cb.dup_x2()?;                      // [value, base, index, ptr, base]
		self.cb.pop()?;                         // [value, base, index, ptr]
		self.cb.getfield(refs.offset_field, VerificationType::Integer)?;
		self.cb.iadd()?;                        // [value, base, index+offset]
		if kind.is_wide() {
			self.cb.dup2_x2()?;                 // [base, index+offset, value, base, index+offset]
		} else {
			self.cb.dup2_x1()?;
		}
		self.cb.pop2()?;                        // [base, index+offset, value]
		self.emit_astore_for_kind(kind)
	}

	/// `[ptr]` → `[ptr.base]`. Used by null checks and comparisons.
	pub(crate) fn emit_ptr_get_base(&mut self, ptr_ty: &CType) -> Result<()> {
		let refs = self.ptr_refs(jvm_types::pointer_kind(ptr_ty)?)?;
		self.cb.getfield(refs.base_field, VerificationType::object(refs.base_descriptor))
	}

	/// `[ptr]` → `[ptr.offset]`.
	pub(crate) fn emit_ptr_get_offset(&mut self, ptr_ty: &CType) -> Result<()> {
		let refs = self.ptr_refs(jvm_types::pointer_kind(ptr_ty)?)?;
		self.cb.getfield(refs.offset_field, VerificationType::Integer)
	}

	/// `[src_ptr]` → `[new_ptr]` with the same base and offset.
	///
	/// C pointer assignment copies the pointer value; without the clone, two
	/// C pointers would alias one wrapper object and advancing one would
	/// advance the other.
	pub(crate) fn emit_ptr_clone(&mut self, ptr_ty: &CType) -> Result<()> {
		let refs = self.ptr_refs(jvm_types::pointer_kind(ptr_ty)?)?;

		self.cb.dup()?;                         // [src, src]
		self.cb.getfield(refs.base_field, VerificationType::object(refs.base_descriptor))?;
		self.cb.swap()?;                        // [base, src]
		self.cb.getfield(refs.offset_field, VerificationType::Integer)?;
		self.emit_ptr_wrap(&refs)
	}

	/// `checkcast` to the concrete runtime class of `ty` (a pointer wrapper
	/// class or an array class). The verifier would otherwise see `Object`
	/// after a generic `Object[]` element load.
	pub(crate) fn emit_checkcast_for_pointer_type(&mut self, ty: &CType) -> Result<()> {
		if ty.is_pointer() {
			if ty.is_void_pointer() {
				return Ok(());
			}
			let kind = jvm_types::pointer_kind(ty)?;
			let class_name = kind.class_name();
			let class_index = self.ctx.pool.put_class(class_name)?;
			self.cb.checkcast(class_index, class_name)?;
		} else if ty.is_array() {
			let class_name = jvm_types::internal_class_name(ty)?;
			let class_index = self.ctx.pool.put_class(&class_name)?;
			self.cb.checkcast(class_index, &class_name)?;
		}
		Ok(())
	}

	/// `checkcast` to a named class.
	pub(crate) fn emit_checkcast_class(&mut self, class_name: &str) -> Result<()> {
		let class_index = self.ctx.pool.put_class(class_name)?;
		self.cb.checkcast(class_index, class_name)
	}
}
