//! In-memory JVM class-file building blocks: constant pool, typed code
//! builder with verifier frames, and a thin class-file writer.
//!
//! This crate knows nothing about any source language. A front end lowers
//! its program onto [`code::CodeBuilder`] instruction by instruction, interning
//! names and constants through [`pool::ConstantPool`], and finally renders the
//! result with [`writer`].

use anyhow::{anyhow, Context, Result};

pub mod class_constants;
pub mod code;
pub mod descriptor;
pub mod frame;
pub(crate) mod jstring;
pub mod pool;
pub mod stackmap;
pub mod writer;

/// A sink for the big-endian integers the class-file format is made of.
///
/// See the [JVM Specification §4](https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html)
/// for the `u1`/`u2`/`u4` units this mirrors.
pub trait ClassWrite {
	fn write_u8_slice(&mut self, buf: &[u8]) -> Result<()>;

	fn write_u8(&mut self, value: u8) -> Result<()> {
		self.write_u8_slice(&[value])
	}
	fn write_i8(&mut self, value: i8) -> Result<()> {
		self.write_u8(value as u8)
	}
	fn write_u16(&mut self, value: u16) -> Result<()> {
		self.write_u8_slice(&value.to_be_bytes())
	}
	fn write_i16(&mut self, value: i16) -> Result<()> {
		self.write_u8_slice(&value.to_be_bytes())
	}
	fn write_u32(&mut self, value: u32) -> Result<()> {
		self.write_u8_slice(&value.to_be_bytes())
	}
	fn write_i32(&mut self, value: i32) -> Result<()> {
		self.write_u8_slice(&value.to_be_bytes())
	}
	fn write_i64(&mut self, value: i64) -> Result<()> {
		self.write_u8_slice(&value.to_be_bytes())
	}
	fn write_u64(&mut self, value: u64) -> Result<()> {
		self.write_u8_slice(&value.to_be_bytes())
	}

	fn write_usize_as_u16(&mut self, value: usize) -> Result<()> {
		let value: u16 = value.try_into()
			.map_err(|_| anyhow!("value {value} doesn't fit into an u16"))?;
		self.write_u16(value)
	}
	fn write_usize_as_u32(&mut self, value: usize) -> Result<()> {
		let value: u32 = value.try_into()
			.map_err(|_| anyhow!("value {value} doesn't fit into an u32"))?;
		self.write_u32(value)
	}

	/// Writes a length prefix with `len`, then each element with `one`.
	fn write_slice<T>(
		&mut self,
		slice: &[T],
		len: impl FnOnce(&mut Self, usize) -> Result<()>,
		mut one: impl FnMut(&mut Self, &T) -> Result<()>,
	) -> Result<()> where Self: Sized {
		len(self, slice.len())?;
		for item in slice {
			one(self, item)?;
		}
		Ok(())
	}
}

impl ClassWrite for Vec<u8> {
	fn write_u8_slice(&mut self, buf: &[u8]) -> Result<()> {
		self.extend_from_slice(buf);
		Ok(())
	}
}

impl<W: std::io::Write> ClassWrite for std::io::BufWriter<W> {
	fn write_u8_slice(&mut self, buf: &[u8]) -> Result<()> {
		std::io::Write::write_all(self, buf).context("failed to write to underlying writer")
	}
}
