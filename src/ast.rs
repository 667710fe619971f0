//! The resolved, type-checked AST that code generation consumes.
//!
//! Semantic analysis has already run: every expression carries its resolved
//! [`CType`], identifiers are bound to declarations / enum members /
//! functions, parameter slots are preassigned, and address-taken locals carry
//! their `needs_heap_lift` flag.
//!
//! The tree is stored in per-kind arenas with dense integer handles, so nodes
//! can reference each other freely without lifetime entanglement.

macro_rules! arena_id {
	($($name:ident),* $(,)?) => {
		$(
			#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
			pub struct $name(pub u32);

			impl $name {
				pub fn index(self) -> usize {
					self.0 as usize
				}
			}
		)*
	}
}

arena_id!(ExprId, StmtId, DeclId, FuncId, StructId);

/// A resolved C type.
#[derive(Debug, Clone, PartialEq)]
pub enum CType {
	Void,
	Char { unsigned: bool },
	Short { unsigned: bool },
	Int { unsigned: bool },
	Long { unsigned: bool },
	Bool,
	Float,
	Double,
	/// A named enum. Enum values are plain ints at runtime.
	Enum { name: String },
	/// A named struct or union. The member table lives in [`StructDef`].
	Struct { name: String },
	Pointer(Box<CType>),
	Array { element: Box<CType>, length: ArrayLength },
	/// A typedef alias that semantic analysis failed to resolve. Reaching
	/// code generation with one of these is a fatal diagnostic.
	Typedef { name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayLength {
	Fixed(i32),
	/// Variable-length array: the size expression is evaluated at the
	/// declaration site.
	Variable(ExprId),
	/// `[]` in a parameter or tentative definition.
	Unspecified,
}

impl CType {
	pub fn char(unsigned: bool) -> CType { CType::Char { unsigned } }
	pub fn int() -> CType { CType::Int { unsigned: false } }
	pub fn uint() -> CType { CType::Int { unsigned: true } }
	pub fn long() -> CType { CType::Long { unsigned: false } }
	pub fn pointer_to(pointee: CType) -> CType { CType::Pointer(Box::new(pointee)) }
	pub fn array_of(element: CType, length: i32) -> CType {
		CType::Array { element: Box::new(element), length: ArrayLength::Fixed(length) }
	}
	pub fn struct_named(name: &str) -> CType { CType::Struct { name: name.to_owned() } }

	pub fn is_void(&self) -> bool { matches!(self, CType::Void) }
	pub fn is_bool(&self) -> bool { matches!(self, CType::Bool) }
	pub fn is_char(&self) -> bool { matches!(self, CType::Char { .. }) }
	pub fn is_short(&self) -> bool { matches!(self, CType::Short { .. }) }
	pub fn is_int(&self) -> bool { matches!(self, CType::Int { .. }) }
	pub fn is_long(&self) -> bool { matches!(self, CType::Long { .. }) }
	pub fn is_float(&self) -> bool { matches!(self, CType::Float) }
	pub fn is_double(&self) -> bool { matches!(self, CType::Double) }
	pub fn is_enum(&self) -> bool { matches!(self, CType::Enum { .. }) }
	pub fn is_struct_or_union(&self) -> bool { matches!(self, CType::Struct { .. }) }
	pub fn is_pointer(&self) -> bool { matches!(self, CType::Pointer(_)) }
	pub fn is_array(&self) -> bool { matches!(self, CType::Array { .. }) }

	pub fn is_unsigned(&self) -> bool {
		matches!(self,
			CType::Char { unsigned: true }
			| CType::Short { unsigned: true }
			| CType::Int { unsigned: true }
			| CType::Long { unsigned: true })
	}

	pub fn is_integral(&self) -> bool {
		matches!(self,
			CType::Char { .. } | CType::Short { .. } | CType::Int { .. }
			| CType::Long { .. } | CType::Bool | CType::Enum { .. })
	}

	pub fn is_numeric(&self) -> bool {
		self.is_integral() || matches!(self, CType::Float | CType::Double)
	}

	pub fn is_primitive(&self) -> bool {
		self.is_numeric() && !self.is_enum()
	}

	pub fn is_void_pointer(&self) -> bool {
		matches!(self, CType::Pointer(pointee) if pointee.is_void())
	}

	/// The pointee of a pointer or the element of an array.
	pub fn child(&self) -> Option<&CType> {
		match self {
			CType::Pointer(pointee) => Some(pointee),
			CType::Array { element, .. } => Some(element),
			_ => None,
		}
	}

	/// The name of a named struct, union or enum type.
	pub fn user_type_name(&self) -> Option<&str> {
		match self {
			CType::Struct { name } | CType::Enum { name } | CType::Typedef { name } => Some(name),
			_ => None,
		}
	}

	pub fn array_length(&self) -> Option<&ArrayLength> {
		match self {
			CType::Array { length, .. } => Some(length),
			_ => None,
		}
	}

	/// The number of array dimensions, 0 for non-arrays.
	pub fn array_dimensions(&self) -> u32 {
		let mut dims = 0;
		let mut t = self;
		while let CType::Array { element, .. } = t {
			dims += 1;
			t = element.as_ref();
		}
		dims
	}
}

/// Implicit numeric conversions inserted by semantic analysis.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConvKind {
	CharToInt,
	ShortToInt,
	IntToLong,
	IntToFloat,
	IntToDouble,
	LongToFloat,
	LongToDouble,
	FloatToDouble,
	UcharToInt,
	UshortToInt,
	UintToUlong,
	IntToChar,
	IntToShort,
	LongToInt,
	FloatToInt,
	FloatToLong,
	DoubleToInt,
	DoubleToLong,
	DoubleToFloat,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinaryOp {
	Add, Sub, Mul, Div, Mod,
	BitAnd, BitOr, BitXor,
	Shl, Shr,
	Eq, Ne, Lt, Le, Gt, Ge,
}

impl BinaryOp {
	pub fn is_comparison(self) -> bool {
		matches!(self, BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge)
	}
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AssignOp {
	Assign,
	Add, Sub, Mul, Div, Mod,
	And, Or, Xor,
	Shl, Shr,
}

/// What an identifier resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentRef {
	Decl(DeclId),
	EnumConst { name: String, value: i32 },
	Function(FuncId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
	IntLit(i32),
	LongLit(i64),
	FloatLit(f32),
	DoubleLit(f64),
	BoolLit(bool),
	Null,
	/// The literal's bytes; the trailing NUL is not included here.
	StringLit(String),
	Ident(IdentRef),
	Binary { op: BinaryOp, left: ExprId, right: ExprId },
	Neg(ExprId),
	Plus(ExprId),
	LogicalNot(ExprId),
	BitNot(ExprId),
	LogicalAnd { left: ExprId, right: ExprId },
	LogicalOr { left: ExprId, right: ExprId },
	Comma { left: ExprId, right: ExprId },
	Assign { op: AssignOp, left: ExprId, right: ExprId },
	IncDec { target: ExprId, prefix: bool, decrement: bool },
	Call { function: ExprId, arguments: Vec<ExprId> },
	Index { array: ExprId, index: ExprId },
	Member { target: ExprId, member: String, via_pointer: bool },
	AddressOf(ExprId),
	Deref(ExprId),
	/// An implicit conversion inserted by semantic analysis.
	Conv { kind: ConvKind, operand: ExprId },
	/// An explicit C cast; the target type is the expression's own type.
	Cast(ExprId),
	/// Array-to-pointer decay.
	ArrayToPointer(ExprId),
	/// `sizeof(T)`. Produces no code on its own; `calloc` inspects the type.
	SizeOfType { ty: CType, size: i32 },
	/// `sizeof expr`, already folded to a constant.
	SizeOfValue { size: i32 },
	Conditional { condition: ExprId, then_value: ExprId, else_value: ExprId },
	InitList(Vec<ExprId>),
	DesignatedInit { field: String, value: ExprId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
	pub kind: ExprKind,
	pub ty: CType,
	pub line: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
	Expression(ExprId),
	Declaration(DeclId),
	Compound(Vec<StmtId>),
	If { condition: ExprId, then_stmt: StmtId, else_stmt: Option<StmtId> },
	While { condition: ExprId, body: Option<StmtId> },
	DoWhile { body: Option<StmtId>, condition: ExprId },
	For { init: Option<StmtId>, condition: Option<ExprId>, post: Option<ExprId>, body: Option<StmtId> },
	Switch { expression: ExprId, body: StmtId },
	Case { value: ExprId, stmt: Option<StmtId> },
	Default { stmt: Option<StmtId> },
	Label { name: String, stmt: Option<StmtId> },
	Goto { label: String },
	Break,
	Continue,
	Return(Option<ExprId>),
	Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
	pub kind: StmtKind,
	pub line: u16,
}

/// A variable declaration: a local, a parameter, or a file-scope variable
/// (which becomes a static field).
#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
	pub name: String,
	pub ty: CType,
	/// The address of this variable is taken somewhere; it is stored as a
	/// one-element array.
	pub needs_heap_lift: bool,
	/// File-scope variables become static fields of `class_name` (or of the
	/// class currently being generated when `None`).
	pub is_global: bool,
	pub class_name: Option<String>,
	pub is_extern: bool,
	/// Slot preassigned by semantic analysis; parameters only.
	pub param_slot: Option<u16>,
	pub initializer: Option<ExprId>,
}

impl Decl {
	pub fn local(name: &str, ty: CType) -> Decl {
		Decl {
			name: name.to_owned(),
			ty,
			needs_heap_lift: false,
			is_global: false,
			class_name: None,
			is_extern: false,
			param_slot: None,
			initializer: None,
		}
	}

	pub fn param(name: &str, ty: CType, slot: u16) -> Decl {
		Decl {
			param_slot: Some(slot),
			..Decl::local(name, ty)
		}
	}
}

/// JVM-intrinsic mappings that replace a call to the annotated function with
/// a single instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
	GetStatic { class: String, name: String, descriptor: String },
	GetField { class: String, name: String, descriptor: String },
	New { class: String },
	InvokeStatic { class: String, name: String, descriptor: String },
	InvokeVirtual { class: String, name: String, descriptor: String },
	InvokeSpecial { class: String, name: String, descriptor: String },
	ArrayLength,
	AaLoad,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
	pub name: String,
	pub return_type: CType,
	pub params: Vec<DeclId>,
	pub is_variadic: bool,
	/// `None` for prototypes and attribute-mapped intrinsics.
	pub body: Option<StmtId>,
	pub attributes: Vec<Attribute>,
	/// The class a call resolves to; `None` means the class currently being
	/// generated.
	pub class_name: Option<String>,
	pub line: u16,
}

impl Function {
	pub fn find_attribute<T>(&self, f: impl Fn(&Attribute) -> Option<T>) -> Option<T> {
		self.attributes.iter().find_map(f)
	}

	pub fn has_intrinsic_attribute(&self) -> bool {
		!self.attributes.is_empty()
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
	pub name: String,
	pub ty: CType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
	pub name: String,
	pub is_union: bool,
	pub fields: Vec<StructField>,
}

/// One translation unit, ready for code generation.
#[derive(Debug, Default)]
pub struct TranslationUnit {
	pub exprs: Vec<Expr>,
	pub stmts: Vec<Stmt>,
	pub decls: Vec<Decl>,
	pub functions: Vec<Function>,
	pub structs: Vec<StructDef>,
	/// File-scope declarations, in declaration order.
	pub globals: Vec<DeclId>,
	pub source_file: Option<String>,
}

impl TranslationUnit {
	pub fn new() -> TranslationUnit {
		TranslationUnit::default()
	}

	pub fn expr(&self, id: ExprId) -> &Expr {
		&self.exprs[id.index()]
	}

	pub fn stmt(&self, id: StmtId) -> &Stmt {
		&self.stmts[id.index()]
	}

	pub fn decl(&self, id: DeclId) -> &Decl {
		&self.decls[id.index()]
	}

	pub fn function(&self, id: FuncId) -> &Function {
		&self.functions[id.index()]
	}

	pub fn struct_def(&self, id: StructId) -> &StructDef {
		&self.structs[id.index()]
	}

	pub fn add_expr(&mut self, kind: ExprKind, ty: CType, line: u16) -> ExprId {
		let id = ExprId(self.exprs.len() as u32);
		self.exprs.push(Expr { kind, ty, line });
		id
	}

	pub fn add_stmt(&mut self, kind: StmtKind, line: u16) -> StmtId {
		let id = StmtId(self.stmts.len() as u32);
		self.stmts.push(Stmt { kind, line });
		id
	}

	pub fn add_decl(&mut self, decl: Decl) -> DeclId {
		let id = DeclId(self.decls.len() as u32);
		self.decls.push(decl);
		id
	}

	pub fn add_function(&mut self, function: Function) -> FuncId {
		let id = FuncId(self.functions.len() as u32);
		self.functions.push(function);
		id
	}

	pub fn add_struct(&mut self, def: StructDef) -> StructId {
		let id = StructId(self.structs.len() as u32);
		self.structs.push(def);
		id
	}

	pub fn find_function(&self, name: &str) -> Option<FuncId> {
		self.functions.iter().position(|f| f.name == name).map(|i| FuncId(i as u32))
	}

	pub fn find_struct(&self, name: &str) -> Option<&StructDef> {
		self.structs.iter().find(|s| s.name == name)
	}
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use super::{ArrayLength, CType};

	#[test]
	fn type_predicates() {
		assert!(CType::uint().is_unsigned());
		assert!(!CType::int().is_unsigned());
		assert!(CType::Enum { name: "Color".to_owned() }.is_integral());
		assert!(!CType::pointer_to(CType::int()).is_numeric());
		assert!(CType::pointer_to(CType::Void).is_void_pointer());
		assert!(!CType::pointer_to(CType::int()).is_void_pointer());
	}

	#[test]
	fn child_and_dimensions() {
		let t = CType::array_of(CType::array_of(CType::Double, 4), 3);
		assert_eq!(t.array_dimensions(), 2);
		assert_eq!(t.child(), Some(&CType::array_of(CType::Double, 4)));
		assert_eq!(t.array_length(), Some(&ArrayLength::Fixed(3)));
	}
}
