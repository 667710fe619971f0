//! The constant pool builder.

use std::collections::HashMap;
use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use crate::class_constants::pool;
use crate::{jstring, ClassWrite};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolEntry {
	Utf8 { string: String },
	Integer { bytes: i32 },
	Float { bytes: u32 },
	Long { bytes: i64 },
	Double { bytes: u64 },
	Class { name_index: u16 },
	String { string_index: u16 },
	FieldRef { class_index: u16, name_and_type_index: u16 },
	MethodRef { class_index: u16, name_and_type_index: u16 },
	NameAndType { name_index: u16, descriptor_index: u16 },
}

/// Metadata a front end may attach to a method reference, so that later call
/// sites can be resolved from the pool index alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalleeInfo {
	/// Argument count as the call site sees it (a packed varargs array counts
	/// as one argument).
	pub arg_count: u16,
}

/// An append-only, de-duplicating constant pool.
///
/// The first index given out is `1`; `Long` and `Double` entries take up two
/// pool slots. Structurally equal entries share their index.
#[derive(Debug, Default)]
pub struct ConstantPool {
	/// The value written as `constant_pool_count` in the class file.
	count: u16,
	/// Maps each entry to its index. Iteration order is insertion order,
	/// which is also ascending index order.
	map: IndexMap<PoolEntry, u16>,
	/// [`CalleeInfo`] per method-ref index, for entries added through
	/// [`ConstantPool::put_method_ref_typed`].
	callee_info: HashMap<u16, CalleeInfo>,
}

impl ConstantPool {
	/// Creates a pool in a ready-to-write state. The (unwritable) entry at
	/// index zero is accounted for.
	pub fn new() -> ConstantPool {
		ConstantPool {
			count: 1, // first index given out is 1
			map: IndexMap::new(),
			callee_info: HashMap::new(),
		}
	}

	fn put(&mut self, entry: PoolEntry) -> Result<u16> {
		if let Some(index) = self.map.get(&entry) {
			return Ok(*index);
		}

		let index = self.count;

		let inc = if matches!(entry, PoolEntry::Long { .. } | PoolEntry::Double { .. }) {
			2 // long and double take up two pool slots
		} else {
			1
		};
		self.count = self.count.checked_add(inc)
			.with_context(|| anyhow!("pool count overflowed while adding pool entry {entry:?} at index {index}"))?;

		self.map.insert(entry, index);

		Ok(index)
	}

	pub fn put_utf8(&mut self, value: &str) -> Result<u16> {
		self.put(PoolEntry::Utf8 { string: value.to_owned() })
	}

	/// Stores a `CONSTANT_String_info` entry. Embedded NUL bytes survive,
	/// thanks to the two-byte encoding of `\0` in Modified UTF-8.
	pub fn put_string(&mut self, value: &str) -> Result<u16> {
		let string_index = self.put_utf8(value)?;
		self.put(PoolEntry::String { string_index })
	}

	pub fn put_class(&mut self, internal_name: &str) -> Result<u16> {
		let name_index = self.put_utf8(internal_name)?;
		self.put(PoolEntry::Class { name_index })
	}

	pub fn put_integer(&mut self, value: i32) -> Result<u16> {
		self.put(PoolEntry::Integer { bytes: value })
	}

	pub fn put_long(&mut self, value: i64) -> Result<u16> {
		self.put(PoolEntry::Long { bytes: value })
	}

	pub fn put_float(&mut self, value: f32) -> Result<u16> {
		self.put(PoolEntry::Float { bytes: value.to_bits() })
	}

	pub fn put_double(&mut self, value: f64) -> Result<u16> {
		self.put(PoolEntry::Double { bytes: value.to_bits() })
	}

	pub fn put_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
		let name_index = self.put_utf8(name)?;
		let descriptor_index = self.put_utf8(descriptor)?;
		self.put(PoolEntry::NameAndType { name_index, descriptor_index })
	}

	pub fn put_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
		let class_index = self.put_class(class)?;
		let name_and_type_index = self.put_name_and_type(name, descriptor)?;
		self.put(PoolEntry::FieldRef { class_index, name_and_type_index })
	}

	pub fn put_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
		let class_index = self.put_class(class)?;
		let name_and_type_index = self.put_name_and_type(name, descriptor)?;
		self.put(PoolEntry::MethodRef { class_index, name_and_type_index })
	}

	/// Like [`ConstantPool::put_method_ref`], but additionally retains
	/// [`CalleeInfo`] for the returned index. The de-duplication key is the
	/// same as for the untyped variant.
	pub fn put_method_ref_typed(&mut self, class: &str, name: &str, descriptor: &str, info: CalleeInfo) -> Result<u16> {
		let index = self.put_method_ref(class, name, descriptor)?;
		self.callee_info.insert(index, info);
		Ok(index)
	}

	pub fn callee_info(&self, index: u16) -> Option<CalleeInfo> {
		self.callee_info.get(&index).copied()
	}

	/// The value to be written as `constant_pool_count`.
	pub fn count(&self) -> u16 {
		self.count
	}

	/// Writes the constant pool to the given writer, starting with the
	/// `constant_pool_count`.
	pub fn write(&self, writer: &mut impl ClassWrite) -> Result<()> {
		writer.write_u16(self.count)?;

		for entry in self.map.keys() {
			match entry {
				PoolEntry::Utf8 { string } => {
					writer.write_u8(pool::UTF8)?;
					let vec = jstring::from_str_to_vec(string);
					writer.write_usize_as_u16(vec.len()).context("failed to write length of string")?;
					writer.write_u8_slice(&vec)?;
				},
				PoolEntry::Integer { bytes } => {
					writer.write_u8(pool::INTEGER)?;
					writer.write_i32(*bytes)?;
				},
				PoolEntry::Float { bytes } => {
					writer.write_u8(pool::FLOAT)?;
					writer.write_u32(*bytes)?;
				},
				PoolEntry::Long { bytes } => {
					writer.write_u8(pool::LONG)?;
					writer.write_i64(*bytes)?;
				},
				PoolEntry::Double { bytes } => {
					writer.write_u8(pool::DOUBLE)?;
					writer.write_u64(*bytes)?;
				},
				PoolEntry::Class { name_index } => {
					writer.write_u8(pool::CLASS)?;
					writer.write_u16(*name_index)?;
				},
				PoolEntry::String { string_index } => {
					writer.write_u8(pool::STRING)?;
					writer.write_u16(*string_index)?;
				},
				PoolEntry::FieldRef { class_index, name_and_type_index } => {
					writer.write_u8(pool::FIELD_REF)?;
					writer.write_u16(*class_index)?;
					writer.write_u16(*name_and_type_index)?;
				},
				PoolEntry::MethodRef { class_index, name_and_type_index } => {
					writer.write_u8(pool::METHOD_REF)?;
					writer.write_u16(*class_index)?;
					writer.write_u16(*name_and_type_index)?;
				},
				PoolEntry::NameAndType { name_index, descriptor_index } => {
					writer.write_u8(pool::NAME_AND_TYPE)?;
					writer.write_u16(*name_index)?;
					writer.write_u16(*descriptor_index)?;
				},
			}
		}

		Ok(())
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use super::{CalleeInfo, ConstantPool};

	#[test]
	fn dedup() -> Result<()> {
		let mut pool = ConstantPool::new();

		let a = pool.put_utf8("base")?;
		let b = pool.put_utf8("base")?;
		assert_eq!(a, b);

		let c = pool.put_field_ref("__intPtr", "base", "[I")?;
		let d = pool.put_field_ref("__intPtr", "base", "[I")?;
		assert_eq!(c, d);

		let e = pool.put_field_ref("__intPtr", "offset", "I")?;
		assert_ne!(c, e);

		Ok(())
	}

	#[test]
	fn indices_are_sequential() -> Result<()> {
		let mut pool = ConstantPool::new();

		assert_eq!(pool.put_utf8("a")?, 1);
		assert_eq!(pool.put_utf8("b")?, 2);
		assert_eq!(pool.put_class("a")?, 3);
		Ok(())
	}

	#[test]
	fn long_and_double_take_two_slots() -> Result<()> {
		let mut pool = ConstantPool::new();

		assert_eq!(pool.put_long(42)?, 1);
		assert_eq!(pool.put_integer(42)?, 3);
		assert_eq!(pool.put_double(1.5)?, 4);
		assert_eq!(pool.put_integer(7)?, 6);
		assert_eq!(pool.count(), 7);
		Ok(())
	}

	#[test]
	fn typed_method_ref_shares_index() -> Result<()> {
		let mut pool = ConstantPool::new();

		let a = pool.put_method_ref("Main", "f", "(I)I")?;
		let b = pool.put_method_ref_typed("Main", "f", "(I)I", CalleeInfo { arg_count: 1 })?;
		assert_eq!(a, b);
		assert_eq!(pool.callee_info(b), Some(CalleeInfo { arg_count: 1 }));
		assert_eq!(pool.callee_info(9999), None);
		Ok(())
	}

	#[test]
	fn string_with_nul_is_interned() -> Result<()> {
		let mut pool = ConstantPool::new();

		let a = pool.put_string("hi\0")?;
		let b = pool.put_string("hi\0")?;
		assert_eq!(a, b);

		let mut out = Vec::new();
		pool.write(&mut out)?;
		// count 3 (utf8 + string), then Utf8 tag + len 4 + "hi" + encoded NUL
		assert_eq!(&out[..9], &[0, 3, 1, 0, 4, 0x68, 0x69, 0xc0, 0x80]);
		Ok(())
	}
}
