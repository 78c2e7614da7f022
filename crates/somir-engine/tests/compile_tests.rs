//! End-to-end compile tests: source text through the full pipeline,
//! asserting emitted opcode sequences via the disassembler.

use somir_engine::bytecode::disasm::decode_function;
use somir_engine::bytecode::Opcode;
use somir_engine::compiler::Compiler;
use somir_engine::gc::Heap;
use somir_engine::parser::parse_program;
use somir_engine::{Chunk, Value};

fn compile(source: &str) -> Chunk {
    let mut program = parse_program(source).expect("parse");
    let chunk = Compiler::new(Heap::new())
        .compile_program(&mut program)
        .expect("compile");
    verify_chunk(&chunk);
    chunk
}

fn compile_err(source: &str) -> String {
    let mut program = parse_program(source).expect("parse");
    match Compiler::new(Heap::new()).compile_program(&mut program) {
        Ok(_) => panic!("expected compile error for {source:?}"),
        Err(err) => err.to_string(),
    }
}

fn ops(chunk: &Chunk, func: usize) -> Vec<(Opcode, Vec<i32>)> {
    decode_function(&chunk.functions[func].code)
        .expect("decode")
        .into_iter()
        .map(|inst| (inst.opcode, inst.operands))
        .collect()
}

/// Static well-formedness of every prototype: local slots are live when
/// read, upvalue slots are in range, and jumps land on instruction
/// boundaries inside the buffer.
fn verify_chunk(chunk: &Chunk) {
    for (index, func) in chunk.functions.iter().enumerate() {
        let instructions = decode_function(&func.code).expect("decode");
        let mut starts: Vec<usize> = instructions.iter().map(|i| i.offset).collect();
        starts.push(func.code.len());

        let mut live = func.arity as i32;
        for inst in &instructions {
            match inst.opcode {
                Opcode::Let => live += 1,
                Opcode::Pop => live -= inst.operands[0],
                Opcode::Local | Opcode::SetLocal => {
                    let slot = inst.operands[0];
                    if slot >= 0 {
                        assert!(
                            slot < live,
                            "fn {index}: slot {slot} not live at {:04}",
                            inst.offset
                        );
                    } else {
                        assert!(
                            (-slot) as usize <= func.upvalues.len(),
                            "fn {index}: upvalue {slot} out of range"
                        );
                    }
                }
                Opcode::Jump | Opcode::JumpIfNot => {
                    let target = inst.end() as i32 + inst.operands[0];
                    assert!(
                        target >= 0 && (target as usize) <= func.code.len(),
                        "fn {index}: jump to {target} escapes the buffer"
                    );
                    assert!(
                        starts.contains(&(target as usize)),
                        "fn {index}: jump to {target} lands mid-instruction"
                    );
                }
                _ => {}
            }
        }
    }
}

#[test]
fn arithmetic_let_emits_stack_code() {
    let chunk = compile("let x = 2 + 3 * 4");
    assert_eq!(
        ops(&chunk, 0),
        vec![
            (Opcode::Constant, vec![0]),
            (Opcode::Constant, vec![1]),
            (Opcode::Constant, vec![2]),
            (Opcode::Multiply, vec![]),
            (Opcode::BinPlus, vec![]),
            (Opcode::Let, vec![]),
            (Opcode::Constant, vec![3]),
            (Opcode::Return, vec![]),
        ]
    );
    assert_eq!(
        chunk.constants(),
        &[Value::Int(2), Value::Int(3), Value::Int(4), Value::Nil]
    );
}

#[test]
fn booleans_and_branch() {
    let chunk = compile("let b = true and false\nif b: print(1)");
    let main = ops(&chunk, 0);
    assert_eq!(main[0], (Opcode::Constant, vec![0]));
    assert_eq!(main[1], (Opcode::Constant, vec![1]));
    assert_eq!(main[2], (Opcode::And, vec![]));
    assert_eq!(main[3], (Opcode::Let, vec![]));
    assert_eq!(main[4], (Opcode::Local, vec![0]));
    assert!(matches!(&main[5], (Opcode::JumpIfNot, _)));
    assert_eq!(chunk.constants()[0], Value::Bool(true));
    assert_eq!(chunk.constants()[1], Value::Bool(false));
}

#[test]
fn if_then_only_in_int_function_is_rejected() {
    let message = compile_err("let f = fn(b: bool) -> int:\n    if b: return 1");
    assert!(
        message.contains("implicit nil return in function with return type int"),
        "unexpected message: {message}"
    );
}

#[test]
fn if_else_where_both_branches_return() {
    let chunk = compile("let f = fn(b: bool) -> int:\n    if b: return 1 else: return 2");
    assert_eq!(
        ops(&chunk, 1),
        vec![
            (Opcode::Local, vec![0]),
            (Opcode::JumpIfNot, vec![7]),
            (Opcode::Constant, vec![0]),
            (Opcode::Return, vec![]),
            (Opcode::Jump, vec![4]),
            (Opcode::Constant, vec![1]),
            (Opcode::Return, vec![]),
        ]
    );
    // Both branches return, so the function body gets no implicit nil.
    assert_eq!(chunk.functions[1].arity, 1);
}

#[test]
fn while_loop_jumps_back_to_head() {
    let chunk = compile("let r = 1.0\nwhile r < 10.0: r = r + 1.0");
    assert_eq!(
        ops(&chunk, 0),
        vec![
            (Opcode::Constant, vec![0]),
            (Opcode::Let, vec![]),
            (Opcode::Local, vec![0]),
            (Opcode::Constant, vec![1]),
            (Opcode::Less, vec![]),
            (Opcode::JumpIfNot, vec![13]),
            (Opcode::Local, vec![0]),
            (Opcode::Constant, vec![2]),
            (Opcode::BinPlus, vec![]),
            (Opcode::SetLocal, vec![0]),
            (Opcode::Jump, vec![-23]),
            (Opcode::Constant, vec![3]),
            (Opcode::Return, vec![]),
        ]
    );
    assert_eq!(chunk.constants()[1], Value::Real(10.0));
}

#[test]
fn nested_block_pops_its_locals() {
    let chunk = compile("if true:\n    let a = 1\n    print(a)");
    let main = ops(&chunk, 0);
    assert!(
        main.contains(&(Opcode::Pop, vec![1])),
        "block exit must pop its local: {main:?}"
    );
}

#[test]
fn self_recursive_function_captures_itself_as_upvalue() {
    let chunk = compile(concat!(
        "let f = fn(n: int) -> int:\n",
        "    if n <= 0:\n",
        "        return 0\n",
        "    else:\n",
        "        return f(n - 1) + n\n",
    ));
    assert_eq!(chunk.functions.len(), 2);
    // The closure captures `f` from slot 0 of the enclosing context.
    assert_eq!(chunk.functions[1].upvalues, vec![0]);
    let main = ops(&chunk, 0);
    assert_eq!(main[0], (Opcode::MakeFunc, vec![1, 1, 1, 0]));
    let body = ops(&chunk, 1);
    assert!(
        body.contains(&(Opcode::Local, vec![-1])),
        "recursive reference must read upvalue -1: {body:?}"
    );
    assert!(body.contains(&(Opcode::Call, vec![1])));
}

#[test]
fn closures_chain_through_two_function_tops() {
    let chunk = compile(concat!(
        "let x = 1\n",
        "let outer = fn() -> int:\n",
        "    let inner = fn() -> int: return x\n",
        "    return inner()\n",
    ));
    assert_eq!(chunk.functions.len(), 3);
    // outer captures x from main's slot 0...
    assert_eq!(chunk.functions[1].upvalues, vec![0]);
    // ...and inner captures it from outer's upvalue -1.
    assert_eq!(chunk.functions[2].upvalues, vec![-1]);
}

#[test]
fn list_literal_least_upper_bound_is_real() {
    let chunk = compile("let xs = [1, 2.0]");
    assert_eq!(
        ops(&chunk, 0),
        vec![
            (Opcode::Constant, vec![0]),
            (Opcode::Constant, vec![1]),
            (Opcode::MakeList, vec![2]),
            (Opcode::Let, vec![]),
            (Opcode::Constant, vec![2]),
            (Opcode::Return, vec![]),
        ]
    );
    // The element type is real: storing a string into an element-typed
    // variable trips the assignment check with the widened type.
    let message = compile_err("let xs = [1, 2.0]\nlet y = xs[0]\ny = 'a'");
    assert!(
        message.contains("variable of type real"),
        "unexpected message: {message}"
    );
}

#[test]
fn list_literal_order_reversed_still_real() {
    let message = compile_err("let xs = [1.0, 2]\nlet y = xs[0]\ny = 'a'");
    assert!(
        message.contains("variable of type real"),
        "unexpected message: {message}"
    );
}

#[test]
fn mixed_list_is_rejected() {
    let message = compile_err("let xs = [1, 'a']");
    assert!(
        message.contains("Cannot mix int and string in list literal"),
        "unexpected message: {message}"
    );
}

#[test]
fn empty_list_cannot_be_indexed() {
    let message = compile_err("let xs = []\nxs[0]");
    assert!(
        message.contains("Trying to index list[?]"),
        "unexpected message: {message}"
    );
}

#[test]
fn method_access_emits_make_method() {
    let chunk = compile("let s = 'hi'\ns.length");
    assert_eq!(
        ops(&chunk, 0),
        vec![
            (Opcode::Constant, vec![0]),
            (Opcode::Let, vec![]),
            (Opcode::Local, vec![0]),
            (Opcode::MakeMethod, vec![1, 2]),
            (Opcode::Ignore, vec![]),
            (Opcode::Constant, vec![3]),
            (Opcode::Return, vec![]),
        ]
    );
    assert_eq!(chunk.constants()[0].as_str(), Some("hi"));
    assert_eq!(chunk.constants()[1].as_str(), Some("string"));
    assert_eq!(chunk.constants()[2].as_str(), Some("length"));
}

#[test]
fn calling_a_method_type_checks() {
    let chunk = compile("let s = 'hi'\nlet n = s.length()");
    // n is int afterwards: assigning a string to it must fail.
    let message = compile_err("let s = 'hi'\nlet n = s.length()\nn = 'x'");
    assert!(message.contains("variable of type int"));
    let main = ops(&chunk, 0);
    assert!(main.contains(&(Opcode::Call, vec![0])));
}

#[test]
fn globals_load_through_string_constants() {
    let chunk = compile("print(1)");
    assert_eq!(
        ops(&chunk, 0),
        vec![
            (Opcode::Constant, vec![0]),
            (Opcode::Global, vec![1]),
            (Opcode::Call, vec![1]),
            (Opcode::Ignore, vec![]),
            (Opcode::Constant, vec![2]),
            (Opcode::Return, vec![]),
        ]
    );
    assert_eq!(chunk.constants()[1].as_str(), Some("print"));
}

#[test]
fn macro_calls_skip_arity_checking() {
    compile("print(1, 2, 3)");
    compile("print()");
}

#[test]
fn desugared_comparisons_append_not() {
    let chunk = compile("1 != 2\n1 > 2\n1 >= 2");
    let main = ops(&chunk, 0);
    let sequence: Vec<Opcode> = main.iter().map(|(op, _)| *op).collect();
    let mut pairs = sequence.windows(2).filter(|w| w[1] == Opcode::Not);
    assert_eq!(pairs.next().map(|w| w[0]), Some(Opcode::Equals));
    assert_eq!(pairs.next().map(|w| w[0]), Some(Opcode::LessOrEq));
    assert_eq!(pairs.next().map(|w| w[0]), Some(Opcode::Less));
}

#[test]
fn unary_operators() {
    let chunk = compile("let x = -2\nlet b = not true");
    let main = ops(&chunk, 0);
    assert!(main.contains(&(Opcode::UniMinus, vec![])));
    assert!(main.contains(&(Opcode::Not, vec![])));
}

#[test]
fn int_widens_to_real_at_call_sites() {
    compile("let g = fn(x: real) -> real: return x\ng(1)");
}

#[test]
fn compile_is_idempotent_over_the_same_ast() {
    let mut program = parse_program(concat!(
        "let f = fn(n: int) -> int:\n",
        "    if n <= 0:\n",
        "        return 0\n",
        "    else:\n",
        "        return f(n - 1) + n\n",
        "let xs = [1, 2.0]\n",
        "print(f(3))\n",
    ))
    .expect("parse");
    let first = Compiler::new(Heap::new())
        .compile_program(&mut program)
        .expect("first compile");
    let second = Compiler::new(Heap::new())
        .compile_program(&mut program)
        .expect("second compile");
    assert_eq!(first.encode(), second.encode());
}

// ── error triggers ──────────────────────────────────────────────────

#[test]
fn unknown_identifier() {
    let message = compile_err("ghost");
    assert!(message.contains("Trying to access unknown variable: ghost"));
}

#[test]
fn unknown_type_name() {
    let message = compile_err("let f = fn(x: wat) -> int: return 1");
    assert!(message.contains("Unknown type wat"));
}

#[test]
fn globals_are_read_only() {
    let message = compile_err("print = 1");
    assert!(message.contains("Trying to set global or undefined variable print"));
}

#[test]
fn set_type_mismatch() {
    let message = compile_err("let x = 1\nx = 'a'");
    assert!(message.contains("Trying to set variable of type int to value of type string"));
}

#[test]
fn return_type_mismatch() {
    let message = compile_err("let f = fn() -> int: return 'a'");
    assert!(message.contains("Returning string in function with return type int"));
}

#[test]
fn argument_type_mismatch() {
    let message = compile_err("let f = fn(n: int) -> int: return n\nf('a')");
    assert!(message.contains("Cannot assign string to int argument"));
}

#[test]
fn arity_mismatch() {
    let message = compile_err("clock(1)");
    assert!(message.contains("Expected 0 arguments in function call, got 1"));
}

#[test]
fn calling_a_non_callable() {
    let message = compile_err("let x = 1\nx()");
    assert!(message.contains("Trying to call int"));
}

#[test]
fn indexing_a_non_list() {
    let message = compile_err("let x = 1\nlet y = x[0]");
    assert!(message.contains("Trying to index int with int"));
}

#[test]
fn comparison_type_error() {
    let message = compile_err("1 < 'a'");
    assert!(message.contains("Trying to compare int and string"));
}

#[test]
fn arithmetic_type_error() {
    let message = compile_err("1 + 'a'");
    assert!(message.contains("Trying to perform arithmetic on int and string"));
}

#[test]
fn boolean_op_type_error() {
    let message = compile_err("1 and true");
    assert!(message.contains("Trying to perform boolean operations on int and bool"));
}

#[test]
fn division_requires_reals() {
    let message = compile_err("'a' / 2.0");
    assert!(message.contains("Trying to perform real operations on string and real"));
}

#[test]
fn condition_must_be_boolean() {
    let message = compile_err("if 1: print(1)");
    assert!(message.contains("Expecting boolean in condition, got value of type int"));
}

#[test]
fn while_condition_must_be_boolean() {
    let message = compile_err("while 1: print(1)");
    assert!(message.contains("Expecting boolean in while loop"));
}

#[test]
fn unknown_method() {
    let message = compile_err("let s = 'hi'\ns.reverse");
    assert!(message.contains("Type string does not have a method named reverse"));
}
