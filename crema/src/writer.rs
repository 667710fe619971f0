//! A thin class-file writer.
//!
//! Renders the in-memory output of code generation (method bodies from
//! [`crate::code::CodeBuilder`], the class-wide [`ConstantPool`]) into the
//! class-file byte layout. Only the attributes code generation produces are
//! supported: `Code` with `LineNumberTable` and `StackMapTable`, plus an
//! optional `SourceFile`.

use anyhow::{anyhow, Context, Result};
use crate::class_constants::{attribute, MAGIC};
use crate::code::MethodCode;
use crate::pool::ConstantPool;
use crate::stackmap;
use crate::ClassWrite;

#[derive(Debug, Clone)]
pub struct ClassFile {
	pub minor_version: u16,
	pub major_version: u16,
	pub access_flags: u16,
	pub this_class: String,
	pub super_class: String,
	pub source_file: Option<String>,
	pub fields: Vec<Field>,
	pub methods: Vec<Method>,
}

#[derive(Debug, Clone)]
pub struct Field {
	pub access_flags: u16,
	pub name: String,
	pub descriptor: String,
}

#[derive(Debug, Clone)]
pub struct Method {
	pub access_flags: u16,
	pub name: String,
	pub descriptor: String,
	pub code: Option<MethodCode>,
}

fn write_attribute<'a, F>(writer: &mut Vec<u8>, pool: &mut ConstantPool, name: &'a str, f: F) -> Result<()>
where
	F: FnOnce(&mut Vec<u8>, &mut ConstantPool) -> Result<()>,
{
	let mut buffer = Vec::new();
	f(&mut buffer, pool)?;
	writer.write_u16(pool.put_utf8(name)?)?;
	writer.write_usize_as_u32(buffer.len()).with_context(|| anyhow!("attribute {name:?} is too large"))?;
	writer.write_u8_slice(&buffer)
}

fn write_method(writer: &mut Vec<u8>, method: &Method, pool: &mut ConstantPool) -> Result<()> {
	writer.write_u16(method.access_flags)?;
	writer.write_u16(pool.put_utf8(&method.name)?)?;
	writer.write_u16(pool.put_utf8(&method.descriptor)?)?;

	if let Some(code) = &method.code {
		writer.write_u16(1)?; // one attribute
		write_attribute(writer, pool, attribute::CODE, |w, pool| {
			write_code(w, code, &method.descriptor, pool)
				.with_context(|| anyhow!("failed to write `Code` attribute of method {:?} {:?}", method.name, method.descriptor))
		})?;
	} else {
		writer.write_u16(0)?; // no attributes
	}

	Ok(())
}

fn write_code(writer: &mut Vec<u8>, code: &MethodCode, method_descriptor: &str, pool: &mut ConstantPool) -> Result<()> {
	writer.write_u16(code.max_stack)?;
	writer.write_u16(code.max_locals)?;
	writer.write_usize_as_u32(code.code.len()).context("code array is too large")?;
	writer.write_u8_slice(&code.code)?;
	writer.write_u16(0)?; // no exception table

	let mut attribute_count = 0;
	let mut buffer = Vec::new();

	if !code.line_numbers.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::LINE_NUMBER_TABLE, |w, _| {
			w.write_slice(
				&code.line_numbers,
				|w, len| w.write_usize_as_u16(len).context("too many line number entries"),
				|w, &(pc, line)| {
					w.write_u16(pc)?;
					w.write_u16(line)
				},
			)
		})?;
	}

	if !code.stack_map_frames.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::STACK_MAP_TABLE, |w, pool| {
			let initial_frame = stackmap::initial_frame_of_descriptor(method_descriptor)?;
			stackmap::write_stack_map_table(w, pool, &initial_frame, &code.stack_map_frames)
		})?;
	}

	writer.write_u16(attribute_count)?;
	writer.write_u8_slice(&buffer)?;

	Ok(())
}

/// Writes a whole class file.
///
/// The pool is taken by value: everything after the constant pool is buffered
/// first, because writing methods still interns attribute names and
/// `StackMapTable` class references.
pub fn write(class_writer: &mut impl ClassWrite, class: &ClassFile, mut pool: ConstantPool) -> Result<()> {
	class_writer.write_u32(MAGIC)?;
	class_writer.write_u16(class.minor_version)?;
	class_writer.write_u16(class.major_version)?;

	let pool = &mut pool;
	// The buffer for the rest of the class file.
	let mut writer = Vec::new();

	writer.write_u16(class.access_flags)?;
	writer.write_u16(pool.put_class(&class.this_class)?)?;
	writer.write_u16(pool.put_class(&class.super_class)?)?;
	writer.write_u16(0)?; // no interfaces

	writer.write_slice(
		&class.fields,
		|w, size| w.write_usize_as_u16(size).with_context(|| anyhow!("failed to write the number of fields of class {:?}", class.this_class)),
		|w, field| {
			w.write_u16(field.access_flags)?;
			w.write_u16(pool.put_utf8(&field.name)?)?;
			w.write_u16(pool.put_utf8(&field.descriptor)?)?;
			w.write_u16(0) // no attributes
		},
	)?;

	writer.write_slice(
		&class.methods,
		|w, size| w.write_usize_as_u16(size).with_context(|| anyhow!("failed to write the number of methods of class {:?}", class.this_class)),
		|w, method| write_method(w, method, pool)
			.with_context(|| anyhow!("failed to write method of class {:?}", class.this_class)),
	)?;

	let mut attribute_count = 0;
	let mut buffer = Vec::new();
	if let Some(source_file) = &class.source_file {
		attribute_count += 1;
		let index = pool.put_utf8(source_file)?;
		write_attribute(&mut buffer, pool, attribute::SOURCE_FILE, |w, _| {
			w.write_u16(index)
		})?;
	}
	writer.write_u16(attribute_count)?;
	writer.write_u8_slice(&buffer)?;

	// pool first, then everything buffered above
	pool.write(class_writer)?;
	class_writer.write_u8_slice(&writer)?;

	Ok(())
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::class_constants::{flags, version};
	use crate::code::CodeBuilder;
	use crate::pool::ConstantPool;
	use super::{ClassFile, Field, Method};

	#[test]
	fn minimal_class_round_trip() -> Result<()> {
		let mut pool = ConstantPool::new();

		let mut cb = CodeBuilder::new("answer");
		cb.iconst(&mut pool, 42)?;
		cb.ireturn()?;
		let code = cb.finish()?;

		let class = ClassFile {
			minor_version: version::MINOR,
			major_version: version::MAJOR_JAVA_8,
			access_flags: flags::ACC_PUBLIC | flags::ACC_SUPER,
			this_class: "Main".to_owned(),
			super_class: "java/lang/Object".to_owned(),
			source_file: None,
			fields: vec![Field {
				access_flags: flags::ACC_STATIC,
				name: "counter".to_owned(),
				descriptor: "I".to_owned(),
			}],
			methods: vec![Method {
				access_flags: flags::ACC_PUBLIC | flags::ACC_STATIC,
				name: "answer".to_owned(),
				descriptor: "()I".to_owned(),
				code: Some(code),
			}],
		};

		let mut out = Vec::new();
		super::write(&mut out, &class, pool)?;

		assert_eq!(&out[0..4], &[0xca, 0xfe, 0xba, 0xbe]);
		assert_eq!(&out[4..8], &[0, 0, 0, 52]);
		// the code array itself appears in the output
		let needle: &[u8] = &[0x10, 42, 0xac]; // bipush 42; ireturn
		assert!(out.windows(needle.len()).any(|w| w == needle));
		Ok(())
	}
}
