//! Parsing and writing of field and method descriptors.

use std::iter::Peekable;
use std::str::Chars;
use anyhow::{anyhow, bail, Context, Result};

/// Represents a type as it appears in a descriptor.
///
/// In case of an array, use the [`Type::Array`] variant. Note that the array
/// dimension must never be zero.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Type {
	/// A `byte`. In rust, this is a `i8`.
	B,
	/// A `char`.
	C,
	/// A `double`. In rust, this is a `f64`.
	D,
	/// A `float`. In rust, this is a `f32`.
	F,
	/// An `int`. In rust, this is a `i32`.
	I,
	/// A `long`. In rust, this is a `i64`.
	J,
	/// A `short`. In rust, this is a `i16`.
	S,
	/// A `boolean`. In rust, this is a `bool`.
	Z,
	/// An instance of the class with the given internal name.
	Object(String),
	/// An array type, represented by the dimension and the element type.
	Array(u8, Box<Type>),
}

impl Type {
	/// `true` for `long` and `double`, which occupy two stack/local slots.
	pub fn is_wide(&self) -> bool {
		matches!(self, Type::D | Type::J)
	}

	/// The number of local variable slots a value of this type occupies.
	pub fn slot_size(&self) -> u16 {
		if self.is_wide() { 2 } else { 1 }
	}
}

// The grammar for descriptors is:
//   FieldDescriptor:
//     FieldType
//
//   MethodDescriptor:
//     "(" FieldType* ")" ReturnDescriptor
//
//   ReturnDescriptor:
//     FieldType | "V"
//
//   FieldType:
//     "B" | "C" | "D" | "F" | "I" | "J" | "S" | "Z" |
//     "L" ClassName ";" |
//     "[" FieldType
fn read_field_type(chars: &mut Peekable<Chars>) -> Result<Type> {
	let mut array_dimension: u8 = 0;
	while chars.next_if_eq(&'[').is_some() {
		array_dimension = array_dimension.checked_add(1)
			.ok_or_else(|| anyhow!("array dimension overflows an u8"))?;
	}

	let char = chars.next().ok_or_else(|| anyhow!("unexpected abrupt ending of descriptor"))?;
	let descriptor = match char {
		'B' => Type::B,
		'C' => Type::C,
		'D' => Type::D,
		'F' => Type::F,
		'I' => Type::I,
		'J' => Type::J,
		'S' => Type::S,
		'Z' => Type::Z,
		'L' => {
			let mut s = String::new();

			let mut char = chars.next().ok_or_else(|| anyhow!("unexpected abrupt ending of descriptor"))?;
			while char != ';' {
				s.push(char);

				char = chars.next().ok_or_else(|| anyhow!("unexpected abrupt ending of descriptor"))?;
			}

			Type::Object(s)
		},
		x => {
			bail!("unexpected char {x:?} in descriptor");
		},
	};

	Ok(if array_dimension == 0 {
		descriptor
	} else if let Type::Array(..) = descriptor {
		bail!("nested array made it through the reader");
	} else {
		Type::Array(array_dimension, Box::new(descriptor))
	})
}

fn write_field_type(t: &Type, string: &mut String) {
	match t {
		Type::B => string.push('B'),
		Type::C => string.push('C'),
		Type::D => string.push('D'),
		Type::F => string.push('F'),
		Type::I => string.push('I'),
		Type::J => string.push('J'),
		Type::S => string.push('S'),
		Type::Z => string.push('Z'),
		Type::Object(class_name) => {
			string.push('L');
			string.push_str(class_name);
			string.push(';');
		},
		Type::Array(array_dimension, element) => {
			for _ in 0..*array_dimension {
				string.push('[');
			}
			write_field_type(element, string);
		},
	}
}

/// Attempts to parse a field descriptor, e.g. `I` or `[Ljava/lang/Object;`.
///
/// A field descriptor is defined by the [grammar](https://docs.oracle.com/javase/specs/jvms/se21/html/jvms-4.html#jvms-4.3.2)
/// in the Java Virtual Machine Specification. The inverse of this function is
/// [`write_field_descriptor`].
pub fn parse_field_descriptor(descriptor: &str) -> Result<Type> {
	let mut chars = descriptor.chars().peekable();

	let parsed = read_field_type(&mut chars)
		.with_context(|| anyhow!("failed to read field descriptor {descriptor:?}"))?;

	if chars.peek().is_some() {
		bail!("expected end of field descriptor {descriptor:?}, got {:?} remaining", String::from_iter(chars));
	}

	Ok(parsed)
}

pub fn write_field_descriptor(t: &Type) -> String {
	let mut s = String::new();
	write_field_type(t, &mut s);
	s
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParsedMethodDescriptor {
	pub parameter_descriptors: Vec<Type>,
	/// `None` encodes a `V` return descriptor.
	pub return_descriptor: Option<Type>,
}

pub fn parse_method_descriptor(descriptor: &str) -> Result<ParsedMethodDescriptor> {
	let mut chars = descriptor.chars().peekable();

	if chars.next_if_eq(&'(').is_none() {
		bail!("method descriptor {descriptor:?} doesn't start with '('");
	}

	let mut parameter_descriptors = Vec::new();
	loop {
		if chars.next_if_eq(&')').is_some() {
			break;
		}

		let parsed = read_field_type(&mut chars)
			.with_context(|| anyhow!("failed to read parameter descriptor of {descriptor:?}"))?;
		parameter_descriptors.push(parsed);
	}

	let return_descriptor = if chars.next_if_eq(&'V').is_some() {
		None
	} else {
		let parsed = read_field_type(&mut chars)
			.with_context(|| anyhow!("failed to read return descriptor of {descriptor:?}"))?;

		Some(parsed)
	};

	if chars.peek().is_some() {
		bail!("expected end of method descriptor {descriptor:?}, got {} remaining", String::from_iter(chars));
	}

	Ok(ParsedMethodDescriptor {
		parameter_descriptors,
		return_descriptor,
	})
}

pub fn write_method_descriptor(parsed: &ParsedMethodDescriptor) -> String {
	let mut s = String::new();
	s.push('(');
	for parameter_descriptor in &parsed.parameter_descriptors {
		write_field_type(parameter_descriptor, &mut s);
	}
	s.push(')');
	if let Some(return_descriptor) = &parsed.return_descriptor {
		write_field_type(return_descriptor, &mut s);
	} else {
		s.push('V');
	}
	s
}

/// Returns the number of argument slots of a static method with this
/// descriptor. Doubles and longs count 2 instead of 1.
///
/// Does not look at the return descriptor.
pub fn argument_slots(descriptor: &str) -> Result<u16> {
	let parsed = parse_method_descriptor(descriptor)?;
	Ok(parsed.parameter_descriptors.iter().map(Type::slot_size).sum())
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use super::{argument_slots, parse_field_descriptor, parse_method_descriptor, write_field_descriptor, write_method_descriptor, ParsedMethodDescriptor, Type};

	#[test]
	fn field_parse() -> Result<()> {
		assert_eq!(parse_field_descriptor("I")?, Type::I);
		assert_eq!(parse_field_descriptor("D")?, Type::D);
		assert_eq!(
			parse_field_descriptor("Ljava/lang/Object;")?,
			Type::Object("java/lang/Object".to_owned()),
		);
		assert_eq!(
			parse_field_descriptor("[[[D")?,
			Type::Array(3, Box::new(Type::D)),
		);
		assert_eq!(
			parse_field_descriptor("[L__intPtr;")?,
			Type::Array(1, Box::new(Type::Object("__intPtr".to_owned()))),
		);
		Ok(())
	}

	#[test]
	fn field_write() {
		assert_eq!(write_field_descriptor(&Type::I), "I");
		assert_eq!(write_field_descriptor(&Type::Object("__charPtr".to_owned())), "L__charPtr;");
		assert_eq!(write_field_descriptor(&Type::Array(2, Box::new(Type::J))), "[[J");
	}

	#[test]
	fn field_parse_err() {
		assert!(parse_field_descriptor("").is_err());
		assert!(parse_field_descriptor("V").is_err());
		assert!(parse_field_descriptor("(").is_err());
		assert!(parse_field_descriptor("()V").is_err());
		assert!(parse_field_descriptor("[V").is_err());
		assert!(parse_field_descriptor("II").is_err());
		assert!(parse_field_descriptor("L;DV").is_err());
	}

	#[test]
	fn method_parse() -> Result<()> {
		assert_eq!(
			parse_method_descriptor("(IDLjava/lang/Thread;)Ljava/lang/Object;")?,
			ParsedMethodDescriptor {
				parameter_descriptors: vec![
					Type::I,
					Type::D,
					Type::Object("java/lang/Thread".to_owned()),
				],
				return_descriptor: Some(Type::Object("java/lang/Object".to_owned())),
			},
		);
		assert_eq!(
			parse_method_descriptor("(I[L__charPtr;)I")?,
			ParsedMethodDescriptor {
				parameter_descriptors: vec![
					Type::I,
					Type::Array(1, Box::new(Type::Object("__charPtr".to_owned()))),
				],
				return_descriptor: Some(Type::I),
			},
		);
		assert_eq!(
			parse_method_descriptor("()V")?,
			ParsedMethodDescriptor {
				parameter_descriptors: Vec::new(),
				return_descriptor: None,
			},
		);
		Ok(())
	}

	#[test]
	fn method_round_trip() -> Result<()> {
		for descriptor in ["()V", "(I)I", "(JDI)J", "([Ljava/lang/Object;)V", "(L__intPtr;I)L__intPtr;"] {
			assert_eq!(write_method_descriptor(&parse_method_descriptor(descriptor)?), descriptor);
		}
		Ok(())
	}

	#[test]
	fn method_parse_err() {
		assert!(parse_method_descriptor("").is_err());
		assert!(parse_method_descriptor("(").is_err());
		assert!(parse_method_descriptor("(V)D").is_err());
		assert!(parse_method_descriptor("(I)").is_err());
		assert!(parse_method_descriptor("(D)[").is_err());
		assert!(parse_method_descriptor("[(D)V").is_err());
	}

	#[test]
	fn method_argument_slots() -> Result<()> {
		assert_eq!(argument_slots("()V")?, 0);
		assert_eq!(argument_slots("(I)V")?, 1);
		assert_eq!(argument_slots("(D)V")?, 2);
		assert_eq!(argument_slots("(JJJ)V")?, 6);
		assert_eq!(argument_slots("(IDLjava/lang/Thread;)Ljava/lang/Object;")?, 4);
		assert_eq!(argument_slots("(I[L__charPtr;)I")?, 2);
		Ok(())
	}
}
