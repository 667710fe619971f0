//! Methods for converting between rust strings and the Modified UTF-8 format
//! used by `CONSTANT_Utf8_info` entries.
//!
//! Modified UTF-8 encodes `\0` as the two bytes `0xC0 0x80` and supplementary
//! characters as surrogate pairs. See
//! <https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.4.7>.

use std::borrow::Cow;
use anyhow::{anyhow, Context, Result};
use java_string::{JavaStr, JavaString};

/// Takes in a vec of class-file bytes, tries to read it into a [`JavaString`].
pub(crate) fn from_vec_to_string(vec: Vec<u8>) -> Result<JavaString> {
	JavaString::from_modified_utf8(vec)
		.with_context(|| anyhow!("invalid java utf8 contents"))
}

/// Takes in a string and writes it out into the class-file byte form.
pub(crate) fn from_string_to_vec(string: &JavaStr) -> Cow<[u8]> {
	string.to_modified_utf8()
}

/// Convenience for plain rust strings, which are a subset of [`JavaStr`].
pub(crate) fn from_str_to_vec(string: &str) -> Cow<[u8]> {
	from_string_to_vec(JavaStr::from_str(string))
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::jstring::{from_str_to_vec, from_vec_to_string};

	#[test]
	fn embedded_nul() -> Result<()> {
		// a C string literal keeps its trailing NUL, which must not produce a raw 0x00
		assert_eq!(from_str_to_vec("ab\0").as_ref(), &[0x61, 0x62, 0xc0, 0x80]);
		assert_eq!(from_vec_to_string(vec![0x61, 0x62, 0xc0, 0x80])?, "ab\0");
		Ok(())
	}

	#[test]
	fn ascii_is_identity() -> Result<()> {
		assert_eq!(from_str_to_vec("java/lang/Object").as_ref(), b"java/lang/Object");
		Ok(())
	}
}
