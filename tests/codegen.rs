//! End-to-end code generation tests: small programs are built as resolved
//! ASTs, run through the generator, and checked against the emitted
//! bytecode and class structure.

use anyhow::Result;
use pretty_assertions::assert_eq;
use crema::class_constants::opcode;
use crema::code::MethodCode;
use cminorc::ast::{
	AssignOp, Attribute, BinaryOp, CType, Decl, DeclId, ExprId, ExprKind, Function,
	IdentRef, StmtId, StmtKind, StructDef, StructField, TranslationUnit,
};
use cminorc::codegen::{Codegen, GeneratedClass};
use cminorc::jvm_types::PointerKind;

/// Thin sugar over [`TranslationUnit`] for building test programs.
struct UnitBuilder {
	unit: TranslationUnit,
}

impl UnitBuilder {
	fn new() -> UnitBuilder {
		UnitBuilder { unit: TranslationUnit::new() }
	}

	fn expr(&mut self, kind: ExprKind, ty: CType) -> ExprId {
		self.unit.add_expr(kind, ty, 1)
	}

	fn stmt(&mut self, kind: StmtKind) -> StmtId {
		self.unit.add_stmt(kind, 1)
	}

	fn int(&mut self, value: i32) -> ExprId {
		self.expr(ExprKind::IntLit(value), CType::int())
	}

	fn ident(&mut self, decl: DeclId) -> ExprId {
		let ty = self.unit.decl(decl).ty.clone();
		self.expr(ExprKind::Ident(IdentRef::Decl(decl)), ty)
	}

	fn assign_stmt(&mut self, op: AssignOp, left: ExprId, right: ExprId) -> StmtId {
		let ty = self.unit.expr(left).ty.clone();
		let assign = self.expr(ExprKind::Assign { op, left, right }, ty);
		self.stmt(StmtKind::Expression(assign))
	}

	fn void_function(&mut self, name: &str, body: Vec<StmtId>) {
		self.function(name, CType::Void, Vec::new(), body)
	}

	fn function(&mut self, name: &str, return_type: CType, params: Vec<DeclId>, body: Vec<StmtId>) {
		let body = self.stmt(StmtKind::Compound(body));
		self.unit.add_function(Function {
			name: name.to_owned(),
			return_type,
			params,
			is_variadic: false,
			body: Some(body),
			attributes: Vec::new(),
			class_name: None,
			line: 1,
		});
	}

	fn prototype(&mut self, name: &str, return_type: CType, params: Vec<DeclId>) -> ExprId {
		let func = self.unit.add_function(Function {
			name: name.to_owned(),
			return_type: return_type.clone(),
			params,
			is_variadic: false,
			body: None,
			attributes: Vec::new(),
			class_name: None,
			line: 1,
		});
		self.expr(ExprKind::Ident(IdentRef::Function(func)), return_type)
	}

	fn generate(self) -> Result<GeneratedClass> {
		Codegen::new(&self.unit, "Main")?.generate()
	}
}

fn method<'a>(class: &'a GeneratedClass, name: &str) -> &'a MethodCode {
	class.class_file.methods.iter()
		.find(|m| m.name == name)
		.and_then(|m| m.code.as_ref())
		.unwrap_or_else(|| panic!("method {name:?} missing"))
}

fn count_byte(code: &[u8], byte: u8) -> usize {
	code.iter().filter(|&&b| b == byte).count()
}

fn point_struct(b: &mut UnitBuilder) {
	b.unit.add_struct(StructDef {
		name: "S".to_owned(),
		is_union: false,
		fields: vec![
			StructField { name: "a".to_owned(), ty: CType::int() },
			StructField { name: "b".to_owned(), ty: CType::int() },
		],
	});
}

#[test]
fn struct_assignment_copies_deeply() -> Result<()> {
	let mut b = UnitBuilder::new();
	point_struct(&mut b);

	// S x = {1, 2};
	let one = b.int(1);
	let two = b.int(2);
	let init = b.expr(ExprKind::InitList(vec![one, two]), CType::struct_named("S"));
	let mut x = Decl::local("x", CType::struct_named("S"));
	x.initializer = Some(init);
	let x = b.unit.add_decl(x);
	let x_decl = b.stmt(StmtKind::Declaration(x));

	// S y = x;
	let x_ref = b.ident(x);
	let mut y = Decl::local("y", CType::struct_named("S"));
	y.initializer = Some(x_ref);
	let y = b.unit.add_decl(y);
	let y_decl = b.stmt(StmtKind::Declaration(y));

	// y.a = 42;
	let y_ref = b.ident(y);
	let member = b.expr(
		ExprKind::Member { target: y_ref, member: "a".to_owned(), via_pointer: false },
		CType::int(),
	);
	let forty_two = b.int(42);
	let store = b.assign_stmt(AssignOp::Assign, member, forty_two);

	b.void_function("f", vec![x_decl, y_decl, store]);
	let class = b.generate()?;
	let code = method(&class, "f");

	// one allocation for x, a second one for the copy that becomes y
	assert!(count_byte(&code.code, opcode::NEW) >= 2);
	// two fields copied into the fresh instance, plus the final store
	assert!(count_byte(&code.code, opcode::PUTFIELD) >= 3);
	assert_eq!(*code.code.last().expect("code is never empty"), opcode::RETURN);
	Ok(())
}

#[test]
fn pointer_arithmetic_on_int_array() -> Result<()> {
	let mut b = UnitBuilder::new();

	// int a[4] = {10, 20, 30, 40};
	let values: Vec<ExprId> = [10, 20, 30, 40].iter().map(|&v| b.int(v)).collect();
	let array_ty = CType::array_of(CType::int(), 4);
	let init = b.expr(ExprKind::InitList(values), array_ty.clone());
	let mut a = Decl::local("a", array_ty);
	a.initializer = Some(init);
	let a = b.unit.add_decl(a);
	let a_decl = b.stmt(StmtKind::Declaration(a));

	// int *p = a;
	let a_ref = b.ident(a);
	let ptr_ty = CType::pointer_to(CType::int());
	let decayed = b.expr(ExprKind::ArrayToPointer(a_ref), ptr_ty.clone());
	let mut p = Decl::local("p", ptr_ty.clone());
	p.initializer = Some(decayed);
	let p = b.unit.add_decl(p);
	let p_decl = b.stmt(StmtKind::Declaration(p));

	// int v = *(p + 2);
	let p_ref = b.ident(p);
	let two = b.int(2);
	let advanced = b.expr(ExprKind::Binary { op: BinaryOp::Add, left: p_ref, right: two }, ptr_ty.clone());
	let loaded = b.expr(ExprKind::Deref(advanced), CType::int());
	let mut v = Decl::local("v", CType::int());
	v.initializer = Some(loaded);
	let v = b.unit.add_decl(v);
	let v_decl = b.stmt(StmtKind::Declaration(v));

	// *(p + 2) = 99;
	let p_ref = b.ident(p);
	let two = b.int(2);
	let advanced = b.expr(ExprKind::Binary { op: BinaryOp::Add, left: p_ref, right: two }, ptr_ty);
	let target = b.expr(ExprKind::Deref(advanced), CType::int());
	let ninety_nine = b.int(99);
	let store = b.assign_stmt(AssignOp::Assign, target, ninety_nine);

	b.void_function("f", vec![a_decl, p_decl, v_decl, store]);
	let class = b.generate()?;
	let code = method(&class, "f");

	assert!(class.used_ptr_kinds.contains(&PointerKind::Int));
	// the wrapper fields are read on every pointer operation
	assert!(count_byte(&code.code, opcode::GETFIELD) >= 4);
	assert!(count_byte(&code.code, opcode::IALOAD) >= 1);
	assert!(count_byte(&code.code, opcode::IASTORE) >= 1);
	Ok(())
}

fn build_switch(values: &[i32]) -> Result<GeneratedClass> {
	let mut b = UnitBuilder::new();

	let r = b.unit.add_decl(Decl::local("r", CType::int()));
	let r_decl = b.stmt(StmtKind::Declaration(r));

	let x = b.unit.add_decl(Decl::param("x", CType::int(), 0));

	let mut body = Vec::new();
	for (i, &value) in values.iter().enumerate() {
		let value = b.int(value);
		let r_ref = b.ident(r);
		let result = b.int(i as i32 + 1);
		let assign = b.assign_stmt(AssignOp::Assign, r_ref, result);
		body.push(b.stmt(StmtKind::Case { value, stmt: Some(assign) }));
		body.push(b.stmt(StmtKind::Break));
	}
	let r_ref = b.ident(r);
	let zero = b.int(0);
	let default_assign = b.assign_stmt(AssignOp::Assign, r_ref, zero);
	body.push(b.stmt(StmtKind::Default { stmt: Some(default_assign) }));

	let switch_body = b.stmt(StmtKind::Compound(body));
	let x_ref = b.ident(x);
	let switch_stmt = b.stmt(StmtKind::Switch { expression: x_ref, body: switch_body });

	let r_ref = b.ident(r);
	let ret = b.stmt(StmtKind::Return(Some(r_ref)));

	b.function("f", CType::int(), vec![x], vec![r_decl, switch_stmt, ret]);
	b.generate()
}

#[test]
fn sparse_switch_uses_lookupswitch() -> Result<()> {
	let class = build_switch(&[0, 100, 10000])?;
	let code = method(&class, "f");
	assert!(count_byte(&code.code, opcode::LOOKUPSWITCH) >= 1);
	// every case, the default and the dispatch revival point carry a frame
	assert!(code.stack_map_frames.len() >= 5);
	Ok(())
}

#[test]
fn dense_switch_uses_tableswitch() -> Result<()> {
	let class = build_switch(&[1, 2, 3, 4])?;
	let code = method(&class, "f");
	assert!(count_byte(&code.code, opcode::TABLESWITCH) >= 1);
	Ok(())
}

#[test]
fn two_case_switch_compiles_to_if_chain() -> Result<()> {
	let class = build_switch(&[1, 9])?;
	let code = method(&class, "f");
	assert_eq!(count_byte(&code.code, opcode::TABLESWITCH), 0);
	assert_eq!(count_byte(&code.code, opcode::LOOKUPSWITCH), 0);
	assert!(count_byte(&code.code, opcode::IF_ICMPEQ) >= 2);
	Ok(())
}

#[test]
fn goto_revives_dead_code() -> Result<()> {
	let mut b = UnitBuilder::new();

	// int y = 0; goto L; y = 1; L: y = 2; return y;
	let zero = b.int(0);
	let mut y = Decl::local("y", CType::int());
	y.initializer = Some(zero);
	let y = b.unit.add_decl(y);
	let y_decl = b.stmt(StmtKind::Declaration(y));

	let goto = b.stmt(StmtKind::Goto { label: "L".to_owned() });

	let y_ref = b.ident(y);
	let one = b.int(1);
	let dead = b.assign_stmt(AssignOp::Assign, y_ref, one);

	let y_ref = b.ident(y);
	let two = b.int(2);
	let revived = b.assign_stmt(AssignOp::Assign, y_ref, two);
	let label = b.stmt(StmtKind::Label { name: "L".to_owned(), stmt: Some(revived) });

	let y_ref = b.ident(y);
	let ret = b.stmt(StmtKind::Return(Some(y_ref)));

	b.function("f", CType::int(), Vec::new(), vec![y_decl, goto, dead, label, ret]);
	let class = b.generate()?;
	let code = method(&class, "f");

	// `y = 1` contributes no bytecode at all
	assert_eq!(code.code, vec![
		opcode::ICONST_0, opcode::ISTORE_0,
		opcode::GOTO, 0, 3,
		opcode::ICONST_2, opcode::DUP, opcode::ISTORE_0, opcode::POP,
		opcode::ILOAD_0, opcode::IRETURN,
	]);
	// and the label carries a frame
	assert_eq!(code.stack_map_frames.len(), 1);
	assert_eq!(code.stack_map_frames[0].0, 5);
	Ok(())
}

#[test]
fn variadic_call_packs_boxed_array() -> Result<()> {
	let mut b = UnitBuilder::new();

	let n = b.unit.add_decl(Decl::param("n", CType::int(), 0));
	let sum = b.unit.add_function(Function {
		name: "sum".to_owned(),
		return_type: CType::int(),
		params: vec![n],
		is_variadic: true,
		body: None,
		attributes: Vec::new(),
		class_name: None,
		line: 1,
	});
	let sum_ref = b.expr(ExprKind::Ident(IdentRef::Function(sum)), CType::int());

	let arguments: Vec<ExprId> = [3, 7, 8, 9].iter().map(|&v| b.int(v)).collect();
	let call = b.expr(ExprKind::Call { function: sum_ref, arguments }, CType::int());
	let call_stmt = b.stmt(StmtKind::Expression(call));

	b.void_function("caller", vec![call_stmt]);
	let class = b.generate()?;
	let code = method(&class, "caller");

	assert!(count_byte(&code.code, opcode::ANEWARRAY) >= 1);
	// three Integer.valueOf boxes plus the call itself
	assert!(count_byte(&code.code, opcode::INVOKESTATIC) >= 4);
	assert!(count_byte(&code.code, opcode::AASTORE) >= 3);
	Ok(())
}

#[test]
fn va_arg_unboxes_through_the_varargs_slot() -> Result<()> {
	let mut b = UnitBuilder::new();

	let va_list_ty = CType::pointer_to(CType::pointer_to(CType::Void));
	let va_start_ref = b.prototype("va_start", CType::Void, Vec::new());
	let va_arg_ref = b.prototype("__builtin_va_arg", CType::int(), Vec::new());

	let n = b.unit.add_decl(Decl::param("n", CType::int(), 0));

	// va_list ap; va_start(ap); int s = 0; s += va_arg(ap, int); return s;
	let ap = b.unit.add_decl(Decl::local("ap", va_list_ty));
	let ap_decl = b.stmt(StmtKind::Declaration(ap));

	let ap_ref = b.ident(ap);
	let start = b.expr(ExprKind::Call { function: va_start_ref, arguments: vec![ap_ref] }, CType::Void);
	let start_stmt = b.stmt(StmtKind::Expression(start));

	let zero = b.int(0);
	let mut s = Decl::local("s", CType::int());
	s.initializer = Some(zero);
	let s = b.unit.add_decl(s);
	let s_decl = b.stmt(StmtKind::Declaration(s));

	let ap_ref = b.ident(ap);
	let next = b.expr(ExprKind::Call { function: va_arg_ref, arguments: vec![ap_ref] }, CType::int());
	let s_ref = b.ident(s);
	let add = b.assign_stmt(AssignOp::Add, s_ref, next);

	let s_ref = b.ident(s);
	let ret = b.stmt(StmtKind::Return(Some(s_ref)));

	let body = b.stmt(StmtKind::Compound(vec![ap_decl, start_stmt, s_decl, add, ret]));
	b.unit.add_function(Function {
		name: "sum".to_owned(),
		return_type: CType::int(),
		params: vec![n],
		is_variadic: true,
		body: Some(body),
		attributes: Vec::new(),
		class_name: None,
		line: 1,
	});

	let class = b.generate()?;
	let code = method(&class, "sum");
	let descriptor = &class.class_file.methods.iter().find(|m| m.name == "sum").expect("sum exists").descriptor;

	assert_eq!(descriptor, "(I[Ljava/lang/Object;)I");
	assert!(class.used_ptr_kinds.contains(&PointerKind::Object));
	// the unbox goes through Integer.intValue
	assert!(count_byte(&code.code, opcode::INVOKEVIRTUAL) >= 1);
	assert!(count_byte(&code.code, opcode::AALOAD) >= 1);
	Ok(())
}

#[test]
fn calloc_of_struct_expands_to_filled_array() -> Result<()> {
	let mut b = UnitBuilder::new();
	point_struct(&mut b);

	let n_param = b.unit.add_decl(Decl::param("n", CType::int(), 0));
	let size_param = b.unit.add_decl(Decl::param("size", CType::int(), 1));
	let ptr_ty = CType::pointer_to(CType::struct_named("S"));
	let calloc_ref = b.prototype("calloc", ptr_ty.clone(), vec![n_param, size_param]);

	// S *arr = calloc(2, sizeof(S));
	let two = b.int(2);
	let size = b.expr(
		ExprKind::SizeOfType { ty: CType::struct_named("S"), size: 8 },
		CType::int(),
	);
	let call = b.expr(ExprKind::Call { function: calloc_ref, arguments: vec![two, size] }, ptr_ty.clone());
	let mut arr = Decl::local("arr", ptr_ty);
	arr.initializer = Some(call);
	let arr = b.unit.add_decl(arr);
	let arr_decl = b.stmt(StmtKind::Declaration(arr));

	b.void_function("f", vec![arr_decl]);
	let class = b.generate()?;
	let code = method(&class, "f");

	assert!(class.used_ptr_kinds.contains(&PointerKind::Object));
	// the element array plus per-slot fresh instances in a loop
	assert!(count_byte(&code.code, opcode::ANEWARRAY) >= 1);
	assert!(count_byte(&code.code, opcode::NEW) >= 2);
	assert!(count_byte(&code.code, opcode::IINC) >= 1);
	// the loop header got a frame
	assert!(!code.stack_map_frames.is_empty());
	Ok(())
}

#[test]
fn unsigned_char_deref_masks_high_bits() -> Result<()> {
	let mut b = UnitBuilder::new();

	let ptr_ty = CType::pointer_to(CType::char(true));
	let p = b.unit.add_decl(Decl::param("p", ptr_ty, 0));

	let p_ref = b.ident(p);
	let loaded = b.expr(ExprKind::Deref(p_ref), CType::int());
	let ret = b.stmt(StmtKind::Return(Some(loaded)));

	b.function("f", CType::int(), vec![p], vec![ret]);
	let class = b.generate()?;
	let code = method(&class, "f");

	// sipush 255; iand after the baload
	let needle = [opcode::SIPUSH, 0, 255, opcode::IAND];
	assert!(code.code.windows(needle.len()).any(|w| w == needle));
	assert!(count_byte(&code.code, opcode::BALOAD) >= 1);
	Ok(())
}

#[test]
fn falling_off_a_non_void_function_synthesizes_a_return() -> Result<()> {
	let mut b = UnitBuilder::new();

	let x = b.unit.add_decl(Decl::local("x", CType::int()));
	let x_decl = b.stmt(StmtKind::Declaration(x));

	b.function("f", CType::int(), Vec::new(), vec![x_decl]);
	let class = b.generate()?;
	let code = method(&class, "f");

	assert_eq!(code.code.last(), Some(&opcode::IRETURN));
	assert_eq!(code.code.get(code.code.len() - 2), Some(&opcode::ICONST_0));
	Ok(())
}

#[test]
fn intrinsic_attribute_replaces_the_call() -> Result<()> {
	let mut b = UnitBuilder::new();

	let out = b.unit.add_function(Function {
		name: "get_out".to_owned(),
		return_type: CType::pointer_to(CType::Void),
		params: Vec::new(),
		is_variadic: false,
		body: None,
		attributes: vec![Attribute::GetStatic {
			class: "java/lang/System".to_owned(),
			name: "out".to_owned(),
			descriptor: "Ljava/io/PrintStream;".to_owned(),
		}],
		class_name: None,
		line: 1,
	});
	let out_ref = b.expr(ExprKind::Ident(IdentRef::Function(out)), CType::pointer_to(CType::Void));
	let call = b.expr(ExprKind::Call { function: out_ref, arguments: Vec::new() }, CType::pointer_to(CType::Void));
	let call_stmt = b.stmt(StmtKind::Expression(call));

	b.void_function("f", vec![call_stmt]);
	let class = b.generate()?;
	let code = method(&class, "f");

	assert!(count_byte(&code.code, opcode::GETSTATIC) >= 1);
	assert_eq!(count_byte(&code.code, opcode::INVOKESTATIC), 0);
	// intrinsics never become methods of the generated class
	assert!(!class.class_file.methods.iter().any(|m| m.name == "get_out"));
	Ok(())
}

#[test]
fn malloc_is_rejected() {
	let mut b = UnitBuilder::new();

	let size = b.unit.add_decl(Decl::param("size", CType::int(), 0));
	let malloc_ref = b.prototype("malloc", CType::pointer_to(CType::Void), vec![size]);
	let forty = b.int(40);
	let call = b.expr(ExprKind::Call { function: malloc_ref, arguments: vec![forty] }, CType::pointer_to(CType::Void));
	let call_stmt = b.stmt(StmtKind::Expression(call));

	b.void_function("f", vec![call_stmt]);
	let error = b.generate().expect_err("malloc must be rejected");
	assert!(format!("{error:#}").contains("malloc"));
}

#[test]
fn address_of_global_is_rejected() {
	let mut b = UnitBuilder::new();

	let mut g = Decl::local("g", CType::int());
	g.is_global = true;
	let g = b.unit.add_decl(g);
	b.unit.globals.push(g);

	let g_ref = b.ident(g);
	let address = b.expr(ExprKind::AddressOf(g_ref), CType::pointer_to(CType::int()));
	let stmt = b.stmt(StmtKind::Expression(address));

	b.void_function("f", vec![stmt]);
	let error = b.generate().expect_err("&global must be rejected");
	assert!(format!("{error:#}").contains("not supported"));
}

#[test]
fn argument_count_mismatch_is_rejected() {
	let mut b = UnitBuilder::new();

	let callee_ref = b.prototype("callee", CType::Void, Vec::new());
	let stray = b.int(1);
	let call = b.expr(ExprKind::Call { function: callee_ref, arguments: vec![stray] }, CType::Void);
	let call_stmt = b.stmt(StmtKind::Expression(call));

	b.void_function("f", vec![call_stmt]);
	let error = b.generate().expect_err("extra argument must be rejected");
	assert!(format!("{error:#}").contains("argument count"));
}

#[test]
fn string_literal_becomes_nul_terminated_char_ptr() -> Result<()> {
	let mut b = UnitBuilder::new();

	let literal = b.expr(
		ExprKind::StringLit("hi".to_owned()),
		CType::pointer_to(CType::char(false)),
	);
	let mut s = Decl::local("s", CType::pointer_to(CType::char(false)));
	s.initializer = Some(literal);
	let s = b.unit.add_decl(s);
	let s_decl = b.stmt(StmtKind::Declaration(s));

	b.void_function("f", vec![s_decl]);
	let class = b.generate()?;

	assert!(class.used_ptr_kinds.contains(&PointerKind::Char));
	let bytes = class.to_bytes()?;
	// the pool carries "hi" with an encoded trailing NUL
	let needle = [b'h', b'i', 0xc0, 0x80];
	assert!(bytes.windows(needle.len()).any(|w| w == needle));
	Ok(())
}

#[test]
fn while_loop_emits_header_frame_and_back_edge() -> Result<()> {
	let mut b = UnitBuilder::new();

	// int i = 0; while (i < 10) { i = i + 1; }
	let zero = b.int(0);
	let mut i = Decl::local("i", CType::int());
	i.initializer = Some(zero);
	let i = b.unit.add_decl(i);
	let i_decl = b.stmt(StmtKind::Declaration(i));

	let i_ref = b.ident(i);
	let ten = b.int(10);
	let cond = b.expr(ExprKind::Binary { op: BinaryOp::Lt, left: i_ref, right: ten }, CType::int());

	let i_ref = b.ident(i);
	let one = b.int(1);
	let sum = b.expr(ExprKind::Binary { op: BinaryOp::Add, left: i_ref, right: one }, CType::int());
	let i_ref = b.ident(i);
	let step = b.assign_stmt(AssignOp::Assign, i_ref, sum);
	let body = b.stmt(StmtKind::Compound(vec![step]));

	let while_stmt = b.stmt(StmtKind::While { condition: cond, body: Some(body) });

	b.void_function("f", vec![i_decl, while_stmt]);
	let class = b.generate()?;
	let code = method(&class, "f");

	// loop header and loop exit both need frames
	assert!(code.stack_map_frames.len() >= 2);
	assert!(count_byte(&code.code, opcode::GOTO) >= 1);
	assert_eq!(*code.code.last().expect("code is never empty"), opcode::RETURN);
	Ok(())
}

#[test]
fn globals_become_static_fields() -> Result<()> {
	let mut b = UnitBuilder::new();

	let mut counter = Decl::local("counter", CType::int());
	counter.is_global = true;
	let counter = b.unit.add_decl(counter);
	b.unit.globals.push(counter);

	// counter = 7; in some function
	let counter_ref = b.ident(counter);
	let seven = b.int(7);
	let assign = b.assign_stmt(AssignOp::Assign, counter_ref, seven);
	b.void_function("f", vec![assign]);

	let class = b.generate()?;
	assert_eq!(class.class_file.fields.len(), 1);
	assert_eq!(class.class_file.fields[0].name, "counter");
	assert_eq!(class.class_file.fields[0].descriptor, "I");

	let code = method(&class, "f");
	assert!(count_byte(&code.code, opcode::PUTSTATIC) >= 1);
	Ok(())
}

#[test]
fn ternary_and_short_circuit_lower_to_branches() -> Result<()> {
	let mut b = UnitBuilder::new();

	let a = b.unit.add_decl(Decl::param("a", CType::int(), 0));
	let bb = b.unit.add_decl(Decl::param("b", CType::int(), 1));

	// return (a && b) ? a : b;
	let a_ref = b.ident(a);
	let b_ref = b.ident(bb);
	let both = b.expr(ExprKind::LogicalAnd { left: a_ref, right: b_ref }, CType::int());
	let a_ref = b.ident(a);
	let b_ref = b.ident(bb);
	let pick = b.expr(
		ExprKind::Conditional { condition: both, then_value: a_ref, else_value: b_ref },
		CType::int(),
	);
	let ret = b.stmt(StmtKind::Return(Some(pick)));

	b.function("f", CType::int(), vec![a, bb], vec![ret]);
	let class = b.generate()?;
	let code = method(&class, "f");

	// two short-circuit exits plus the ternary branch
	assert!(count_byte(&code.code, opcode::IFEQ) >= 3);
	assert!(count_byte(&code.code, opcode::GOTO) >= 2);
	assert!(code.stack_map_frames.len() >= 3);
	Ok(())
}

#[test]
fn compound_member_assignment_and_member_increment() -> Result<()> {
	let mut b = UnitBuilder::new();
	point_struct(&mut b);

	let s = b.unit.add_decl(Decl::local("s", CType::struct_named("S")));
	let s_decl = b.stmt(StmtKind::Declaration(s));

	// s.a += 5;
	let s_ref = b.ident(s);
	let member_a = b.expr(
		ExprKind::Member { target: s_ref, member: "a".to_owned(), via_pointer: false },
		CType::int(),
	);
	let five = b.int(5);
	let add = b.assign_stmt(AssignOp::Add, member_a, five);

	// s.b++;
	let s_ref = b.ident(s);
	let member_b = b.expr(
		ExprKind::Member { target: s_ref, member: "b".to_owned(), via_pointer: false },
		CType::int(),
	);
	let bump = b.expr(
		ExprKind::IncDec { target: member_b, prefix: false, decrement: false },
		CType::int(),
	);
	let bump_stmt = b.stmt(StmtKind::Expression(bump));

	b.void_function("f", vec![s_decl, add, bump_stmt]);
	let class = b.generate()?;
	let code = method(&class, "f");

	assert!(count_byte(&code.code, opcode::GETFIELD) >= 2);
	assert!(count_byte(&code.code, opcode::PUTFIELD) >= 2);
	Ok(())
}

#[test]
fn do_while_with_continue_targets_the_condition() -> Result<()> {
	let mut b = UnitBuilder::new();

	// int i = 0; do { i++; if (i < 3) continue; } while (i < 5); return i;
	let zero = b.int(0);
	let mut i = Decl::local("i", CType::int());
	i.initializer = Some(zero);
	let i = b.unit.add_decl(i);
	let i_decl = b.stmt(StmtKind::Declaration(i));

	let i_ref = b.ident(i);
	let bump = b.expr(ExprKind::IncDec { target: i_ref, prefix: false, decrement: false }, CType::int());
	let bump_stmt = b.stmt(StmtKind::Expression(bump));

	let i_ref = b.ident(i);
	let three = b.int(3);
	let early = b.expr(ExprKind::Binary { op: BinaryOp::Lt, left: i_ref, right: three }, CType::int());
	let continue_stmt = b.stmt(StmtKind::Continue);
	let if_stmt = b.stmt(StmtKind::If { condition: early, then_stmt: continue_stmt, else_stmt: None });

	let body = b.stmt(StmtKind::Compound(vec![bump_stmt, if_stmt]));

	let i_ref = b.ident(i);
	let five = b.int(5);
	let cond = b.expr(ExprKind::Binary { op: BinaryOp::Lt, left: i_ref, right: five }, CType::int());
	let loop_stmt = b.stmt(StmtKind::DoWhile { body: Some(body), condition: cond });

	let i_ref = b.ident(i);
	let ret = b.stmt(StmtKind::Return(Some(i_ref)));

	b.function("f", CType::int(), Vec::new(), vec![i_decl, loop_stmt, ret]);
	let class = b.generate()?;
	let code = method(&class, "f");

	// the loop header, the continue target and the if merge all need frames
	assert!(code.stack_map_frames.len() >= 3);
	assert!(count_byte(&code.code, opcode::IFNE) >= 1);
	Ok(())
}

#[test]
fn int_float_union_puns_through_bits() -> Result<()> {
	let mut b = UnitBuilder::new();
	b.unit.add_struct(StructDef {
		name: "Bits".to_owned(),
		is_union: true,
		fields: vec![
			StructField { name: "i".to_owned(), ty: CType::int() },
			StructField { name: "f".to_owned(), ty: CType::Float },
		],
	});

	let u = b.unit.add_decl(Decl::local("u", CType::struct_named("Bits")));
	let u_decl = b.stmt(StmtKind::Declaration(u));

	// u.f = 1.5;
	let u_ref = b.ident(u);
	let member_f = b.expr(
		ExprKind::Member { target: u_ref, member: "f".to_owned(), via_pointer: false },
		CType::Float,
	);
	let value = b.expr(ExprKind::FloatLit(1.5), CType::Float);
	let store = b.assign_stmt(AssignOp::Assign, member_f, value);

	// return u.i;
	let u_ref = b.ident(u);
	let member_i = b.expr(
		ExprKind::Member { target: u_ref, member: "i".to_owned(), via_pointer: false },
		CType::int(),
	);
	let ret = b.stmt(StmtKind::Return(Some(member_i)));

	b.function("f", CType::int(), Vec::new(), vec![u_decl, store, ret]);
	let class = b.generate()?;
	let code = method(&class, "f");

	// the float member goes through Float.floatToRawIntBits
	assert!(count_byte(&code.code, opcode::INVOKESTATIC) >= 1);
	let bytes = class.to_bytes()?;
	assert!(bytes.windows(5).any(|w| w == b"_bits"));
	assert!(bytes.windows(17).any(|w| w == b"floatToRawIntBits"));
	Ok(())
}

#[test]
fn address_of_heap_lifted_local_writes_through() -> Result<()> {
	let mut b = UnitBuilder::new();

	// int x = 1; (address taken, so heap-lifted)
	let one = b.int(1);
	let mut x = Decl::local("x", CType::int());
	x.needs_heap_lift = true;
	x.initializer = Some(one);
	let x = b.unit.add_decl(x);
	let x_decl = b.stmt(StmtKind::Declaration(x));

	// int *p = &x;
	let ptr_ty = CType::pointer_to(CType::int());
	let x_ref = b.ident(x);
	let address = b.expr(ExprKind::AddressOf(x_ref), ptr_ty.clone());
	let mut p = Decl::local("p", ptr_ty.clone());
	p.initializer = Some(address);
	let p = b.unit.add_decl(p);
	let p_decl = b.stmt(StmtKind::Declaration(p));

	// *p = 7;
	let p_ref = b.ident(p);
	let target = b.expr(ExprKind::Deref(p_ref), CType::int());
	let seven = b.int(7);
	let store = b.assign_stmt(AssignOp::Assign, target, seven);

	// return x;
	let x_ref = b.ident(x);
	let ret = b.stmt(StmtKind::Return(Some(x_ref)));

	b.function("f", CType::int(), Vec::new(), vec![x_decl, p_decl, store, ret]);
	let class = b.generate()?;
	let code = method(&class, "f");

	assert!(class.used_ptr_kinds.contains(&PointerKind::Int));
	// the one-element box plus the write through the wrapper
	assert!(count_byte(&code.code, opcode::NEWARRAY) >= 1);
	assert!(count_byte(&code.code, opcode::IASTORE) >= 2);
	assert!(count_byte(&code.code, opcode::IALOAD) >= 1);
	Ok(())
}

#[test]
fn struct_arguments_are_copied_at_the_call() -> Result<()> {
	let mut b = UnitBuilder::new();
	point_struct(&mut b);

	let v = b.unit.add_decl(Decl::param("v", CType::struct_named("S"), 0));
	let callee_ref = b.prototype("g", CType::Void, vec![v]);

	let s = b.unit.add_decl(Decl::local("s", CType::struct_named("S")));
	let s_decl = b.stmt(StmtKind::Declaration(s));

	let s_ref = b.ident(s);
	let call = b.expr(ExprKind::Call { function: callee_ref, arguments: vec![s_ref] }, CType::Void);
	let call_stmt = b.stmt(StmtKind::Expression(call));

	b.void_function("f", vec![s_decl, call_stmt]);
	let class = b.generate()?;
	let code = method(&class, "f");

	// one allocation for s itself, another for the copy passed to g
	assert!(count_byte(&code.code, opcode::NEW) >= 2);
	assert!(count_byte(&code.code, opcode::INVOKESTATIC) >= 1);
	// the call interned g's descriptor
	let bytes = class.to_bytes()?;
	assert!(bytes.windows(6).any(|w| w == b"(LS;)V"));
	Ok(())
}
